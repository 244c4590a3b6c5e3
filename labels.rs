//! Reference label dictionaries: code tables that turn the `_id` fields of a point
//! record into display text. Loaded once from JSON files, then served from the store.

use rusqlite::{params, Connection, Transaction};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::db::StoreHandle;
use crate::error::{Error, Result};

pub const QUALITY_IDS: &str = "quality_ids";
pub const ATTACHMENT_IDS: &str = "attachment_ids";
pub const RESULT_STATUS_IDS: &str = "result_status_ids";
pub const RESULT_DIVISION_IDS: &str = "result_division_ids";
pub const RECONSTRUCTION_STATUS_IDS: &str = "reconstruction_status_ids";
pub const ATTR_STATUS_IDS: &str = "attr_status_ids";
pub const LAND_TYPE_IDS: &str = "land_type_ids";

/// Dictionaries read from `<dir>/<key>.json` on first start.
pub const LABEL_SETS: [&str; 7] = [
    QUALITY_IDS,
    ATTACHMENT_IDS,
    RESULT_STATUS_IDS,
    RESULT_DIVISION_IDS,
    RECONSTRUCTION_STATUS_IDS,
    ATTR_STATUS_IDS,
    LAND_TYPE_IDS,
];

pub type LabelMap = BTreeMap<String, String>;

/// Replaces the whole dictionary stored under `key`.
pub fn set_labels(tx: &Transaction<'_>, key: &str, labels: &LabelMap) -> Result<usize> {
    tx.execute("DELETE FROM labels WHERE set_key = ?1", params![key])?;
    let mut stmt = tx.prepare_cached("INSERT INTO labels (set_key, id, label) VALUES (?1, ?2, ?3)")?;
    for (id, label) in labels {
        stmt.execute(params![key, id, label])?;
    }
    Ok(labels.len())
}

pub fn labels(conn: &Connection, key: &str) -> Result<LabelMap> {
    let mut stmt = conn.prepare_cached("SELECT id, label FROM labels WHERE set_key = ?1")?;
    let rows = stmt.query_map(params![key], |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut map = LabelMap::new();
    for row in rows {
        let (id, label) = row?;
        map.insert(id, label);
    }
    Ok(map)
}

/// Display text for `id`, or the id itself when the dictionary has no entry.
pub fn label(conn: &Connection, key: &str, id: &str) -> Result<String> {
    let mut stmt = conn.prepare_cached("SELECT label FROM labels WHERE set_key = ?1 AND id = ?2")?;
    let mut rows = stmt.query(params![key, id])?;
    match rows.next()? {
        Some(row) => Ok(row.get(0)?),
        None => {
            log::warn!("No label for {key}:{id}");
            Ok(id.to_string())
        }
    }
}

/// True once any known dictionary holds at least one entry.
pub fn has_labels(conn: &Connection) -> Result<bool> {
    let placeholders = vec!["?"; LABEL_SETS.len()].join(", ");
    let sql = format!("SELECT EXISTS (SELECT 1 FROM labels WHERE set_key IN ({placeholders}))");
    let exists: bool = conn.query_row(&sql, rusqlite::params_from_iter(LABEL_SETS), |row| {
        row.get(0)
    })?;
    Ok(exists)
}

/// Reads one dictionary file: a JSON object of id to label. Numeric labels are
/// kept as their decimal text.
pub fn read_label_file(path: &Path) -> Result<LabelMap> {
    let bytes = std::fs::read(path)
        .map_err(|err| Error::FeedFetch(format!("{}: {err}", path.display())))?;
    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_slice(&bytes)
        .map_err(|err| Error::FeedFetch(format!("{}: {err}", path.display())))?;
    raw.into_iter()
        .map(|(id, value)| match value {
            serde_json::Value::String(s) => Ok((id, s)),
            serde_json::Value::Number(n) => Ok((id, n.to_string())),
            other => Err(Error::FeedFetch(format!(
                "{}: label for {id} is not text: {other}",
                path.display()
            ))),
        })
        .collect()
}

pub fn label_file(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

/// Fills the dictionaries from `dir` unless the store already holds some.
///
/// A missing or unreadable file is logged and skipped; the others still load.
/// Returns the number of dictionaries written, zero when the stored copy was used.
pub fn ensure_labels(conn: &mut Connection, dir: &Path) -> Result<usize> {
    if has_labels(conn)? {
        log::debug!("Label dictionaries already stored");
        return Ok(0);
    }

    let mut loaded = Vec::new();
    for key in LABEL_SETS {
        let path = label_file(dir, key);
        match read_label_file(&path) {
            Ok(map) => loaded.push((key, map)),
            Err(err) => log::warn!("Skipping label dictionary {key}: {err}"),
        }
    }

    let tx = conn.transaction()?;
    for (key, map) in &loaded {
        let n = set_labels(&tx, key, map).map_err(Error::aborted)?;
        log::info!("Loaded {n} labels for {key}");
    }
    tx.commit().map_err(|err| Error::aborted(err.into()))?;
    Ok(loaded.len())
}

#[derive(Clone)]
pub struct LabelStore {
    handle: StoreHandle,
}

impl LabelStore {
    pub fn new(handle: StoreHandle) -> Self {
        Self { handle }
    }

    pub async fn set(&self, key: &str, labels: LabelMap) -> Result<usize> {
        let key = key.to_string();
        self.handle
            .transaction(move |tx| set_labels(tx, &key, &labels))
            .await
    }

    pub async fn labels(&self, key: &str) -> Result<LabelMap> {
        let key = key.to_string();
        self.handle.run(move |conn| labels(conn, &key)).await
    }

    pub async fn label(&self, key: &str, id: &str) -> Result<String> {
        let (key, id) = (key.to_string(), id.to_string());
        self.handle.run(move |conn| label(conn, &key, &id)).await
    }

    pub async fn ensure_loaded(&self, dir: PathBuf) -> Result<usize> {
        self.handle.run(move |conn| ensure_labels(conn, &dir)).await
    }
}
