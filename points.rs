use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Statement, Transaction};

use crate::db::StoreHandle;
use crate::error::{Error, Result};
use crate::models::{prefecture_rank, Page, PageRequest, Point, PointFilter, PointType};
use crate::query;

pub(crate) const POINT_COLUMNS: &str = "code, name, kana, point_type, prefecture, city, latitude, longitude, elevation, accuracy, mark_type, install_date, remarks";

pub(crate) const UPSERT_POINT: &str = "INSERT OR REPLACE INTO points (
    code, name, kana, point_type, prefecture, city, latitude, longitude, elevation,
    accuracy, mark_type, install_date, remarks
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)";

impl ToSql for PointType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.label()))
    }
}

impl FromSql for PointType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|_| FromSqlError::InvalidType)
    }
}

pub(crate) fn point_from_row(row: &Row<'_>) -> rusqlite::Result<Point> {
    point_at(row, 0)
}

/// Reads a point whose `POINT_COLUMNS` start at column `base`.
pub(crate) fn point_at(row: &Row<'_>, base: usize) -> rusqlite::Result<Point> {
    Ok(Point {
        code: row.get(base)?,
        name: row.get(base + 1)?,
        kana: row.get(base + 2)?,
        point_type: row.get(base + 3)?,
        prefecture: row.get(base + 4)?,
        city: row.get(base + 5)?,
        latitude: row.get(base + 6)?,
        longitude: row.get(base + 7)?,
        elevation: row.get(base + 8)?,
        accuracy: row.get(base + 9)?,
        mark_type: row.get(base + 10)?,
        install_date: row.get(base + 11)?,
        remarks: row.get(base + 12)?,
    })
}

pub(crate) fn upsert_prepared(stmt: &mut Statement<'_>, point: &Point) -> Result<()> {
    if point.code.trim().is_empty() {
        return Err(Error::InvalidArgument(format!(
            "point '{}' has an empty code",
            point.name
        )));
    }
    stmt.execute(params![
        point.code,
        point.name,
        point.kana,
        point.point_type,
        point.prefecture,
        point.city,
        point.latitude,
        point.longitude,
        point.elevation,
        point.accuracy,
        point.mark_type,
        point.install_date,
        point.remarks
    ])?;
    Ok(())
}

pub fn get_point(conn: &Connection, code: &str) -> Result<Option<Point>> {
    let point = conn
        .query_row(
            &format!("SELECT {POINT_COLUMNS} FROM points WHERE code = ?1"),
            params![code],
            point_from_row,
        )
        .optional()?;
    Ok(point)
}

pub fn upsert_point(conn: &Connection, point: &Point) -> Result<()> {
    let mut stmt = conn.prepare_cached(UPSERT_POINT)?;
    upsert_prepared(&mut stmt, point)
}

/// Writes all points inside the caller's transaction; returns how many were written.
pub fn upsert_points(tx: &Transaction<'_>, points: &[Point]) -> Result<usize> {
    let mut stmt = tx.prepare(UPSERT_POINT)?;
    for point in points {
        upsert_prepared(&mut stmt, point)?;
    }
    Ok(points.len())
}

pub fn count_points(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM points", [], |row| row.get(0))?;
    Ok(count.max(0) as u64)
}

/// Scans the collection in code order and keeps the records matching `filter`.
///
/// Type and prefecture are exact matches, so they narrow the cursor through their
/// indexes; the text clause is evaluated per record.
pub fn search_points(conn: &Connection, filter: &PointFilter, request: PageRequest) -> Result<Page<Point>> {
    let mut clauses = Vec::new();
    let mut args: Vec<String> = Vec::new();
    if let Some(point_type) = filter.point_type {
        clauses.push("point_type = ?");
        args.push(point_type.label().to_string());
    }
    if let Some(prefecture) = filter.prefecture() {
        clauses.push("prefecture = ?");
        args.push(prefecture.to_string());
    }

    let mut sql = format!("SELECT {POINT_COLUMNS} FROM points");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY code");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), point_from_row)?
        .map(|row| row.map_err(Error::from));
    let page = query::paginate(rows, |point| filter.matches(point), None, request)?;
    Ok(page)
}

/// Distinct prefectures in JIS code order; names outside the JIS list follow, by name.
pub fn list_prefectures(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT DISTINCT prefecture FROM points WHERE prefecture <> ''")?;
    let mut prefectures = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    prefectures.sort_by(|a, b| {
        prefecture_rank(a)
            .cmp(&prefecture_rank(b))
            .then_with(|| a.cmp(b))
    });
    Ok(prefectures)
}

#[derive(Clone)]
pub struct PointStore {
    handle: StoreHandle,
}

impl PointStore {
    pub fn new(handle: StoreHandle) -> Self {
        Self { handle }
    }

    pub async fn get(&self, code: &str) -> Result<Option<Point>> {
        let code = code.to_string();
        self.handle.run(move |conn| get_point(conn, &code)).await
    }

    /// Single-record write. Dataset refreshes go through the bulk loader.
    pub async fn upsert(&self, point: Point) -> Result<()> {
        self.handle.run(move |conn| upsert_point(conn, &point)).await
    }

    pub async fn upsert_many(&self, points: Vec<Point>) -> Result<usize> {
        self.handle
            .transaction(move |tx| upsert_points(tx, &points))
            .await
    }

    pub async fn search(&self, filter: PointFilter, request: PageRequest) -> Result<Page<Point>> {
        self.handle
            .run(move |conn| search_points(conn, &filter, request))
            .await
    }

    pub async fn count(&self) -> Result<u64> {
        self.handle.run(|conn| count_points(conn)).await
    }

    pub async fn prefectures(&self) -> Result<Vec<String>> {
        self.handle.run(|conn| list_prefectures(conn)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::db::run_migrations;

    fn store() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        conn
    }

    fn insert_all(conn: &mut Connection, points: &[Point]) {
        let tx = conn.transaction().unwrap();
        upsert_points(&tx, points).unwrap();
        tx.commit().unwrap();
    }

    fn point(code: &str, name: &str, kana: &str, point_type: PointType, prefecture: &str) -> Point {
        Point {
            code: code.into(),
            name: name.into(),
            kana: kana.into(),
            point_type,
            prefecture: prefecture.into(),
            city: String::new(),
            latitude: 35.0,
            longitude: 139.0,
            elevation: None,
            accuracy: Some("0.01".into()),
            mark_type: Some("金属標".into()),
            install_date: Some("1983-11-01".into()),
            remarks: None,
        }
    }

    #[test]
    fn get_returns_none_for_unknown_code() {
        let conn = store();
        assert_eq!(get_point(&conn, "missing").unwrap(), None);
    }

    #[test]
    fn upsert_then_get_round_trips_all_fields() {
        let conn = store();
        let original = point("TR1", "中央", "ちゅうおう", PointType::ThirdOrder, "東京都");
        upsert_point(&conn, &original).unwrap();
        assert_eq!(get_point(&conn, "TR1").unwrap(), Some(original));
    }

    #[test]
    fn empty_code_is_rejected() {
        let conn = store();
        let bad = point(" ", "名無し", "", PointType::FirstOrder, "");
        assert!(matches!(upsert_point(&conn, &bad), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn search_ands_fields_and_ors_name_with_kana() {
        let mut conn = store();
        insert_all(
            &mut conn,
            &[
                point("A", "中央", "ちゅうおう", PointType::ThirdOrder, "東京都"),
                point("B", "中央台", "ちゅうおうだい", PointType::SecondOrder, "東京都"),
                point("C", "本町", "ほんちょう", PointType::ThirdOrder, "東京都"),
                point("D", "センター", "ちゅうおう", PointType::ThirdOrder, "大阪府"),
            ],
        );

        let filter = PointFilter {
            name_contains: Some("央".into()),
            point_type: Some(PointType::ThirdOrder),
            ..Default::default()
        };
        let page = search_points(&conn, &filter, PageRequest::new(0, 20)).unwrap();
        let codes: Vec<&str> = page.items.iter().map(|p| p.code.as_str()).collect();
        assert_eq!(codes, vec!["A"]);

        let filter = PointFilter {
            name_contains: Some("ちゅうおう".into()),
            point_type: Some(PointType::ThirdOrder),
            ..Default::default()
        };
        let page = search_points(&conn, &filter, PageRequest::new(0, 20)).unwrap();
        let codes: Vec<&str> = page.items.iter().map(|p| p.code.as_str()).collect();
        assert_eq!(codes, vec!["A", "D"]);

        let filter = PointFilter {
            kana_contains: Some("ちゅう".into()),
            prefecture: Some("大阪府".into()),
            ..Default::default()
        };
        let page = search_points(&conn, &filter, PageRequest::new(0, 20)).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].code, "D");
    }

    #[test]
    fn search_pages_through_matches() {
        let mut conn = store();
        let points: Vec<Point> = (0..60)
            .map(|i| {
                let kind = if i % 4 == 0 { PointType::FirstOrder } else { PointType::FourthOrder };
                point(&format!("P{i:03}"), "点", "てん", kind, "北海道")
            })
            .collect();
        insert_all(&mut conn, &points);

        let filter = PointFilter {
            point_type: Some(PointType::FourthOrder),
            ..Default::default()
        };
        let page = search_points(&conn, &filter, PageRequest::new(2, 20)).unwrap();
        assert_eq!(page.total, 45);
        assert_eq!(page.items.len(), 5);
        assert!(!page.next_enabled());

        let page = search_points(&conn, &filter, PageRequest::new(3, 20)).unwrap();
        assert!(page.items.is_empty());
        assert!(page.prev_enabled());
        assert!(!page.next_enabled());
    }

    #[test]
    fn prefectures_are_distinct_in_jis_order() {
        let mut conn = store();
        insert_all(
            &mut conn,
            &[
                point("A", "a", "", PointType::FirstOrder, "沖縄県"),
                point("B", "b", "", PointType::FirstOrder, "東京都"),
                point("C", "c", "", PointType::FirstOrder, "青森県"),
                point("D", "d", "", PointType::FirstOrder, "東京都"),
                point("E", "e", "", PointType::FirstOrder, "北海道"),
                point("F", "f", "", PointType::FirstOrder, "南極"),
                point("G", "g", "", PointType::FirstOrder, ""),
            ],
        );
        assert_eq!(
            list_prefectures(&conn).unwrap(),
            vec!["北海道", "青森県", "東京都", "沖縄県", "南極"]
        );
    }

    #[tokio::test]
    async fn failed_bulk_upsert_leaves_nothing_behind() {
        let store = PointStore::new(StoreHandle::new(StoreConfig::in_memory()));
        let batch = vec![
            point("OK1", "一", "いち", PointType::FourthOrder, "千葉県"),
            point("", "名無し", "", PointType::FourthOrder, "千葉県"),
        ];
        let err = store.upsert_many(batch).await.unwrap_err();
        assert!(matches!(err, Error::TransactionAborted(_)));
        assert_eq!(store.count().await.unwrap(), 0);

        let written = store
            .upsert_many(vec![point("OK1", "一", "いち", PointType::FourthOrder, "千葉県")])
            .await
            .unwrap();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn async_store_shares_one_memory_database() {
        let store = PointStore::new(StoreHandle::new(StoreConfig::in_memory()));
        store
            .upsert(point("EL1", "電子", "でんし", PointType::ElectronicReference, "沖縄県"))
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        let found = store.get("EL1").await.unwrap().unwrap();
        assert_eq!(found.point_type, PointType::ElectronicReference);
        assert!(store.get("nope").await.unwrap().is_none());
    }
}
