use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::StoreHandle;
use crate::error::Result;
use crate::models::PointType;
use crate::photos::count_photos;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveySummary {
    pub total_visits: u64,
    pub found: u64,
    pub not_found: u64,
    pub total_photos: u64,
    pub visit_days: u64,
    /// Visits per point type, most visited first.
    pub by_type: Vec<(PointType, u64)>,
    /// Visits per prefecture, most visited first.
    pub by_prefecture: Vec<(String, u64)>,
}

fn grouped<K: rusqlite::types::FromSql>(conn: &Connection, column: &str) -> Result<Vec<(K, u64)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT p.{column}, COUNT(*) AS n
         FROM visits v JOIN points p ON p.code = v.point_code
         GROUP BY p.{column}
         ORDER BY n DESC, p.{column} ASC"
    ))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)?.max(0) as u64)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn summary(conn: &Connection) -> Result<SurveySummary> {
    let (total_visits, found, visit_days): (i64, i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(found), 0), COUNT(DISTINCT visit_date) FROM visits",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    let total_visits = total_visits.max(0) as u64;
    let found = found.max(0) as u64;

    Ok(SurveySummary {
        total_visits,
        found,
        not_found: total_visits - found,
        total_photos: count_photos(conn)?,
        visit_days: visit_days.max(0) as u64,
        by_type: grouped(conn, "point_type")?,
        by_prefecture: grouped(conn, "prefecture")?,
    })
}

#[derive(Clone)]
pub struct SurveyStats {
    handle: StoreHandle,
}

impl SurveyStats {
    pub fn new(handle: StoreHandle) -> Self {
        Self { handle }
    }

    pub async fn summary(&self) -> Result<SurveySummary> {
        self.handle.run(|conn| summary(conn)).await
    }
}
