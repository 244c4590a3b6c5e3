use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{from_millis, Manifest, MetaMarker};

/// Meta key under which the points dataset marker is kept.
pub const POINTS_MARKER_KEY: &str = "points_version";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResyncReason {
    NoMarker,
    VersionChanged { local: String, remote: String },
    CountMismatch { expected: u64, actual: u64 },
    /// Feed without a manifest and nothing stored yet.
    EmptyCollection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncDecision {
    UpToDate,
    Resync(ResyncReason),
}

impl SyncDecision {
    pub fn needs_resync(&self) -> bool {
        matches!(self, SyncDecision::Resync(_))
    }
}

/// True when the local marker is absent, names another version, or disagrees with
/// the number of rows actually stored (an interrupted earlier load).
pub fn should_resync(local: Option<&MetaMarker>, remote: &Manifest, stored_count: u64) -> bool {
    decide(local, Some(remote), stored_count).needs_resync()
}

/// Pure decision. Without a manifest the dataset is loaded once and never reloaded.
pub fn decide(local: Option<&MetaMarker>, remote: Option<&Manifest>, stored_count: u64) -> SyncDecision {
    let Some(remote) = remote else {
        return if stored_count == 0 {
            SyncDecision::Resync(ResyncReason::EmptyCollection)
        } else {
            SyncDecision::UpToDate
        };
    };
    let Some(local) = local else {
        return SyncDecision::Resync(ResyncReason::NoMarker);
    };
    if local.version != remote.version {
        return SyncDecision::Resync(ResyncReason::VersionChanged {
            local: local.version.clone(),
            remote: remote.version.clone(),
        });
    }
    if local.count != stored_count {
        return SyncDecision::Resync(ResyncReason::CountMismatch {
            expected: local.count,
            actual: stored_count,
        });
    }
    SyncDecision::UpToDate
}

pub fn read_marker(conn: &Connection, key: &str) -> Result<Option<MetaMarker>> {
    let marker = conn
        .query_row(
            "SELECT key, version, count, batch_id, updated_at FROM meta WHERE key = ?1",
            params![key],
            |row| {
                Ok(MetaMarker {
                    key: row.get(0)?,
                    version: row.get(1)?,
                    count: row.get::<_, i64>(2)?.max(0) as u64,
                    batch_id: row.get(3)?,
                    updated_at: from_millis(row.get(4)?),
                })
            },
        )
        .optional()?;
    Ok(marker)
}

pub fn write_marker(conn: &Connection, marker: &MetaMarker) -> Result<()> {
    conn.execute(
        "INSERT INTO meta (key, version, count, batch_id, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(key) DO UPDATE SET
            version = excluded.version,
            count = excluded.count,
            batch_id = excluded.batch_id,
            updated_at = excluded.updated_at",
        params![
            marker.key,
            marker.version,
            marker.count as i64,
            marker.batch_id,
            marker.updated_at.timestamp_millis()
        ],
    )?;
    Ok(())
}
