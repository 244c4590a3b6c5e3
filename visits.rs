use chrono::NaiveDate;
use rusqlite::types::{Type, Value};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::cmp::Ordering;

use crate::db::StoreHandle;
use crate::error::{Error, Result};
use crate::models::{
    from_millis, GpsFix, HistoryEntry, HistoryFilter, Page, PageRequest, Visit, VisitSort,
};
use crate::points::{point_at, POINT_COLUMNS};
use crate::query::{self, Comparator};

const VISIT_COLUMNS: &str =
    "point_code, visit_date, found, weather, notes, latitude, longitude, gps_accuracy, created_at";
const VISIT_COLUMN_COUNT: usize = 9;

fn visit_at(row: &Row<'_>, base: usize) -> rusqlite::Result<Visit> {
    let date: String = row.get(base + 1)?;
    let visit_date = date
        .parse::<NaiveDate>()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(base + 1, Type::Text, Box::new(err)))?;
    let latitude: Option<f64> = row.get(base + 5)?;
    let longitude: Option<f64> = row.get(base + 6)?;
    let location = match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(GpsFix {
            latitude,
            longitude,
            accuracy: row.get(base + 7)?,
        }),
        _ => None,
    };
    Ok(Visit {
        point_code: row.get(base)?,
        visit_date,
        found: row.get(base + 2)?,
        weather: row.get(base + 3)?,
        notes: row.get(base + 4)?,
        location,
        created_at: from_millis(row.get(base + 8)?),
    })
}

fn visit_from_row(row: &Row<'_>) -> rusqlite::Result<Visit> {
    visit_at(row, 0)
}

fn compare(sort: VisitSort) -> impl Fn(&Visit, &Visit) -> Ordering {
    move |a, b| {
        let by_date = match sort {
            VisitSort::DateDesc => b.visit_date.cmp(&a.visit_date),
            VisitSort::DateAsc => a.visit_date.cmp(&b.visit_date),
        };
        by_date.then_with(|| a.point_code.cmp(&b.point_code))
    }
}

/// Inserts or overwrites the single visit kept for `visit.point_code`.
pub fn upsert_visit(conn: &Connection, visit: &Visit) -> Result<()> {
    if visit.point_code.trim().is_empty() {
        return Err(Error::InvalidArgument("visit needs a point code".into()));
    }
    let (latitude, longitude, accuracy) = match visit.location {
        Some(fix) => (Some(fix.latitude), Some(fix.longitude), fix.accuracy),
        None => (None, None, None),
    };
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO visits ({VISIT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        ),
        params![
            visit.point_code,
            visit.visit_date.to_string(),
            visit.found,
            visit.weather,
            visit.notes,
            latitude,
            longitude,
            accuracy,
            visit.created_at.timestamp_millis()
        ],
    )?;
    Ok(())
}

pub fn get_visit(conn: &Connection, point_code: &str) -> Result<Option<Visit>> {
    let visit = conn
        .query_row(
            &format!("SELECT {VISIT_COLUMNS} FROM visits WHERE point_code = ?1"),
            params![point_code],
            visit_from_row,
        )
        .optional()?;
    Ok(visit)
}

pub fn list_visits(conn: &Connection, sort: VisitSort) -> Result<Vec<Visit>> {
    let mut stmt = conn.prepare(&format!("SELECT {VISIT_COLUMNS} FROM visits"))?;
    let rows = stmt
        .query_map([], visit_from_row)?
        .map(|row| row.map_err(Error::from));
    let order = compare(sort);
    let visits = query::collect(rows, |_| true, Some(&order as Comparator<'_, Visit>))?;
    Ok(visits)
}

/// Visits with the given outcome, newest first.
pub fn visits_by_found(conn: &Connection, found: bool) -> Result<Vec<Visit>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VISIT_COLUMNS} FROM visits WHERE found = ?1"
    ))?;
    let rows = stmt
        .query_map(params![found], visit_from_row)?
        .map(|row| row.map_err(Error::from));
    let order = compare(VisitSort::DateDesc);
    let visits = query::collect(rows, |_| true, Some(&order as Comparator<'_, Visit>))?;
    Ok(visits)
}

pub fn delete_visit(conn: &Connection, point_code: &str) -> Result<bool> {
    let removed = conn.execute("DELETE FROM visits WHERE point_code = ?1", params![point_code])?;
    Ok(removed > 0)
}

/// Removes every visit and every photo. Both deletes land in the caller's transaction.
pub fn clear_visits(tx: &Transaction<'_>) -> Result<()> {
    tx.execute_batch("DELETE FROM visits; DELETE FROM photos;")?;
    log::info!("Cleared visit history and photos");
    Ok(())
}

pub fn count_visits(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM visits", [], |row| row.get(0))?;
    Ok(count.max(0) as u64)
}

/// History listing: visits joined with their points, streamed in date order and
/// paged by the query engine. Outcome and point type narrow the cursor; the keyword
/// matches point name, kana or code.
pub fn history_page(
    conn: &Connection,
    filter: &HistoryFilter,
    sort: VisitSort,
    request: PageRequest,
) -> Result<Page<HistoryEntry>> {
    let visit_columns = VISIT_COLUMNS
        .split(", ")
        .map(|c| format!("v.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let point_columns = POINT_COLUMNS
        .split(", ")
        .map(|c| format!("p.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let direction = match sort {
        VisitSort::DateDesc => "DESC",
        VisitSort::DateAsc => "ASC",
    };
    let mut sql = format!(
        "SELECT {visit_columns}, {point_columns}
         FROM visits v LEFT JOIN points p ON p.code = v.point_code"
    );
    let mut clauses = Vec::new();
    let mut args: Vec<Value> = Vec::new();
    if let Some(found) = filter.found {
        clauses.push("v.found = ?");
        args.push(Value::Integer(i64::from(found)));
    }
    if let Some(point_type) = filter.point_type {
        clauses.push("p.point_type = ?");
        args.push(Value::Text(point_type.label().to_string()));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(&format!(" ORDER BY v.visit_date {direction}, v.point_code ASC"));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), |row| {
            let visit = visit_at(row, 0)?;
            let code: Option<String> = row.get(VISIT_COLUMN_COUNT)?;
            let point = match code {
                Some(_) => Some(point_at(row, VISIT_COLUMN_COUNT)?),
                None => None,
            };
            Ok(HistoryEntry { visit, point })
        })?
        .map(|row| row.map_err(Error::from));

    let keyword = filter.keyword();
    let page = query::paginate(
        rows,
        |entry| match keyword.as_deref() {
            None => true,
            Some(keyword) => {
                entry.visit.point_code.to_lowercase().contains(keyword)
                    || entry.point.as_ref().is_some_and(|p| {
                        p.name.to_lowercase().contains(keyword) || p.kana.to_lowercase().contains(keyword)
                    })
            }
        },
        None,
        request,
    )?;
    Ok(page)
}

#[derive(Clone)]
pub struct VisitStore {
    handle: StoreHandle,
}

impl VisitStore {
    pub fn new(handle: StoreHandle) -> Self {
        Self { handle }
    }

    pub async fn upsert(&self, visit: Visit) -> Result<()> {
        self.handle.run(move |conn| upsert_visit(conn, &visit)).await
    }

    pub async fn get(&self, point_code: &str) -> Result<Option<Visit>> {
        let point_code = point_code.to_string();
        self.handle.run(move |conn| get_visit(conn, &point_code)).await
    }

    pub async fn get_all(&self, sort: VisitSort) -> Result<Vec<Visit>> {
        self.handle.run(move |conn| list_visits(conn, sort)).await
    }

    pub async fn filter_by_found(&self, found: bool) -> Result<Vec<Visit>> {
        self.handle.run(move |conn| visits_by_found(conn, found)).await
    }

    pub async fn delete(&self, point_code: &str) -> Result<bool> {
        let point_code = point_code.to_string();
        self.handle.run(move |conn| delete_visit(conn, &point_code)).await
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.handle.transaction(|tx| clear_visits(tx)).await
    }

    pub async fn count(&self) -> Result<u64> {
        self.handle.run(|conn| count_visits(conn)).await
    }

    pub async fn history(
        &self,
        filter: HistoryFilter,
        sort: VisitSort,
        request: PageRequest,
    ) -> Result<Page<HistoryEntry>> {
        self.handle
            .run(move |conn| history_page(conn, &filter, sort, request))
            .await
    }
}
