use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Official classification of a benchmark point. Persisted as the Japanese label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PointType {
    #[serde(rename = "電子基準点", alias = "EL0", alias = "electronic-reference")]
    ElectronicReference,
    #[serde(rename = "一等三角点", alias = "TR1", alias = "first-order-triangulation")]
    FirstOrder,
    #[serde(rename = "二等三角点", alias = "TR2", alias = "second-order-triangulation")]
    SecondOrder,
    #[serde(rename = "三等三角点", alias = "TR3", alias = "third-order-triangulation")]
    ThirdOrder,
    #[serde(
        rename = "四等三角点",
        alias = "TR4",
        alias = "EK0",
        alias = "fourth-order-triangulation"
    )]
    FourthOrder,
}

impl PointType {
    pub const ALL: [PointType; 5] = [
        PointType::ElectronicReference,
        PointType::FirstOrder,
        PointType::SecondOrder,
        PointType::ThirdOrder,
        PointType::FourthOrder,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PointType::ElectronicReference => "電子基準点",
            PointType::FirstOrder => "一等三角点",
            PointType::SecondOrder => "二等三角点",
            PointType::ThirdOrder => "三等三角点",
            PointType::FourthOrder => "四等三角点",
        }
    }

    pub fn rank_id(&self) -> &'static str {
        match self {
            PointType::ElectronicReference => "EL0",
            PointType::FirstOrder => "TR1",
            PointType::SecondOrder => "TR2",
            PointType::ThirdOrder => "TR3",
            PointType::FourthOrder => "TR4",
        }
    }

    fn slug(&self) -> &'static str {
        match self {
            PointType::ElectronicReference => "electronic-reference",
            PointType::FirstOrder => "first-order-triangulation",
            PointType::SecondOrder => "second-order-triangulation",
            PointType::ThirdOrder => "third-order-triangulation",
            PointType::FourthOrder => "fourth-order-triangulation",
        }
    }
}

impl fmt::Display for PointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PointType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "EK0" {
            return Ok(PointType::FourthOrder);
        }
        PointType::ALL
            .into_iter()
            .find(|t| t.label() == s || t.rank_id() == s || t.slug() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown point type: {s}")))
    }
}

/// Benchmark master record as delivered by the dataset feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Point {
    pub code: String,
    pub name: String,
    #[serde(default, alias = "hiragana", alias = "name_kana", alias = "nameKana")]
    pub kana: String,
    #[serde(rename = "type")]
    pub point_type: PointType,
    #[serde(default, alias = "pref")]
    pub prefecture: String,
    #[serde(default)]
    pub city: String,
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lon", alias = "lng")]
    pub longitude: f64,
    #[serde(default)]
    pub elevation: Option<f64>,
    #[serde(default)]
    pub accuracy: Option<String>,
    #[serde(default, alias = "mark_type")]
    pub mark_type: Option<String>,
    #[serde(default, alias = "install_date")]
    pub install_date: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
}

/// A surveyor's record of looking for a point. At most one per point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub point_code: String,
    pub visit_date: NaiveDate,
    pub found: bool,
    pub weather: Option<String>,
    pub notes: Option<String>,
    pub location: Option<GpsFix>,
    pub created_at: DateTime<Utc>,
}

impl Visit {
    pub fn new(point_code: impl Into<String>, visit_date: NaiveDate, found: bool) -> Self {
        Self {
            point_code: point_code.into(),
            visit_date,
            found,
            weather: None,
            notes: None,
            location: None,
            created_at: now_millis(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoKind {
    #[serde(alias = "c")]
    Near,
    #[serde(alias = "f")]
    Far,
}

impl PhotoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoKind::Near => "near",
            PhotoKind::Far => "far",
        }
    }
}

impl FromStr for PhotoKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "near" | "c" => Ok(PhotoKind::Near),
            "far" | "f" => Ok(PhotoKind::Far),
            other => Err(Error::InvalidArgument(format!("unknown photo kind: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: i64,
    pub point_code: String,
    pub kind: PhotoKind,
    #[serde(skip_serializing, default)]
    pub blob: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Version marker written by the bulk loader after a committed load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaMarker {
    pub key: String,
    pub version: String,
    pub count: u64,
    pub batch_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Version token and expected size of an external dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(alias = "pointsVersion", deserialize_with = "version_token")]
    pub version: String,
    #[serde(default, alias = "total")]
    pub count: Option<u64>,
}

impl Manifest {
    pub fn new(version: impl Into<String>, count: Option<u64>) -> Self {
        Self {
            version: version.into(),
            count,
        }
    }
}

fn version_token<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "manifest version must be a string or number, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointFilter {
    pub name_contains: Option<String>,
    pub kana_contains: Option<String>,
    #[serde(rename = "type")]
    pub point_type: Option<PointType>,
    pub prefecture: Option<String>,
}

impl PointFilter {
    /// AND across the supplied fields; the text fields form one OR clause over name and kana.
    pub fn matches(&self, point: &Point) -> bool {
        if let Some(point_type) = self.point_type {
            if point.point_type != point_type {
                return false;
            }
        }
        if let Some(prefecture) = non_empty(&self.prefecture) {
            if point.prefecture != prefecture {
                return false;
            }
        }

        let name_query = non_empty(&self.name_contains).map(str::to_lowercase);
        let kana_query = non_empty(&self.kana_contains).map(str::to_lowercase);
        if name_query.is_none() && kana_query.is_none() {
            return true;
        }
        let name = point.name.to_lowercase();
        let kana = point.kana.to_lowercase();
        let by_name = name_query
            .as_deref()
            .map(|q| name.contains(q) || kana.contains(q))
            .unwrap_or(false);
        let by_kana = kana_query
            .as_deref()
            .map(|q| kana.contains(q))
            .unwrap_or(false);
        by_name || by_kana
    }

    pub(crate) fn prefecture(&self) -> Option<&str> {
        non_empty(&self.prefecture)
    }
}

/// The 47 prefectures in JIS X 0401 code order.
pub const PREFECTURES: [&str; 47] = [
    "北海道", "青森県", "岩手県", "宮城県", "秋田県", "山形県", "福島県",
    "茨城県", "栃木県", "群馬県", "埼玉県", "千葉県", "東京都", "神奈川県",
    "新潟県", "富山県", "石川県", "福井県", "山梨県", "長野県", "岐阜県",
    "静岡県", "愛知県", "三重県", "滋賀県", "京都府", "大阪府", "兵庫県",
    "奈良県", "和歌山県", "鳥取県", "島根県", "岡山県", "広島県", "山口県",
    "徳島県", "香川県", "愛媛県", "高知県", "福岡県", "佐賀県", "長崎県",
    "熊本県", "大分県", "宮崎県", "鹿児島県", "沖縄県",
];

/// Position in [`PREFECTURES`]; unknown names sort after all of them.
pub(crate) fn prefecture_rank(name: &str) -> usize {
    PREFECTURES
        .iter()
        .position(|p| *p == name)
        .unwrap_or(PREFECTURES.len())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page_index: usize,
    pub page_size: usize,
}

impl PageRequest {
    pub fn new(page_index: usize, page_size: usize) -> Self {
        Self {
            page_index,
            page_size,
        }
    }

    pub fn offset(&self) -> usize {
        self.page_index.saturating_mul(self.page_size)
    }
}

/// One page of a filtered listing plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page_index: usize,
    pub page_size: usize,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> usize {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(self.page_size)
    }

    pub fn prev_enabled(&self) -> bool {
        self.page_index > 0
    }

    pub fn next_enabled(&self) -> bool {
        self.page_index.saturating_add(1) < self.total_pages()
    }

    /// One-based page number for display.
    pub fn page_number(&self) -> usize {
        self.page_index.saturating_add(1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisitSort {
    #[default]
    #[serde(rename = "date-desc", alias = "date")]
    DateDesc,
    #[serde(rename = "date-asc", alias = "date-old")]
    DateAsc,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryFilter {
    pub found: Option<bool>,
    #[serde(default, rename = "type")]
    pub point_type: Option<PointType>,
    pub keyword: Option<String>,
}

impl HistoryFilter {
    pub(crate) fn keyword(&self) -> Option<String> {
        non_empty(&self.keyword).map(str::to_lowercase)
    }
}

/// A visit joined with its point; `point` is `None` once the point left the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub visit: Visit,
    pub point: Option<Point>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadProgress {
    pub loaded: u64,
    pub total: Option<u64>,
    pub finished: bool,
}

pub(crate) fn now_millis() -> DateTime<Utc> {
    from_millis(Utc::now().timestamp_millis())
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
