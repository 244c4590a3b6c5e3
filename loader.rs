use crossbeam_channel::{bounded, Receiver, Sender};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{now_millis, LoadProgress, Manifest, MetaMarker, Point};
use crate::points;
use crate::version_gate::{write_marker, POINTS_MARKER_KEY};

const PROGRESS_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Clear the collection, then insert every record.
    #[default]
    Replace,
    /// Insert or overwrite by code, keeping rows the feed no longer carries.
    Upsert,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    pub version: String,
    /// Rows stored after the load; also the count written to the marker.
    pub count: u64,
    /// Records read from the feed, duplicates included.
    pub received: u64,
    pub batch_id: String,
    pub mode: LoadMode,
}

/// Channel for load progress. Chunk notifications are dropped rather than blocking
/// the loader when nobody drains the receiver; the last slot is kept free for the
/// final `finished` event, so that one always arrives while the receiver lives.
pub fn progress_channel() -> (Sender<LoadProgress>, Receiver<LoadProgress>) {
    bounded(PROGRESS_BUFFER)
}

#[derive(Debug, Clone)]
pub struct BulkLoader {
    chunk_size: usize,
    mode: LoadMode,
    progress: Option<Sender<LoadProgress>>,
}

impl BulkLoader {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            mode: LoadMode::Replace,
            progress: None,
        }
    }

    pub fn mode(mut self, mode: LoadMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_progress(mut self, progress: Sender<LoadProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Loads `records` and writes the version marker, all in one transaction.
    ///
    /// A failing record or statement rolls everything back: the previous points and
    /// marker stay exactly as they were.
    pub fn load<I>(&self, conn: &mut Connection, manifest: &Manifest, records: I) -> Result<LoadReport>
    where
        I: IntoIterator<Item = Result<Point>>,
    {
        let records = records.into_iter();
        let total = manifest.count.or_else(|| match records.size_hint() {
            (lower, Some(upper)) if lower == upper => Some(upper as u64),
            _ => None,
        });
        let batch_id = Uuid::new_v4().to_string();
        log::info!(
            "Loading points dataset {} ({:?}, batch {batch_id}, expected {:?})",
            manifest.version,
            self.mode,
            total
        );

        let tx = conn.transaction()?;
        let report = match self.load_within(&tx, manifest, records, total, &batch_id) {
            Ok(report) => report,
            Err(err) => {
                log::warn!("Points load aborted, previous dataset kept: {err}");
                return Err(Error::aborted(err));
            }
        };
        tx.commit().map_err(|err| Error::aborted(err.into()))?;

        self.emit_finished(LoadProgress {
            loaded: report.received,
            total,
            finished: true,
        });
        log::info!(
            "Loaded {} points for dataset {} ({} records received)",
            report.count,
            report.version,
            report.received
        );
        Ok(report)
    }

    fn load_within<I>(
        &self,
        conn: &Connection,
        manifest: &Manifest,
        records: I,
        total: Option<u64>,
        batch_id: &str,
    ) -> Result<LoadReport>
    where
        I: Iterator<Item = Result<Point>>,
    {
        if self.mode == LoadMode::Replace {
            conn.execute("DELETE FROM points", [])?;
        }

        let mut received = 0u64;
        {
            let mut stmt = conn.prepare(points::UPSERT_POINT)?;
            for record in records {
                let point = record?;
                points::upsert_prepared(&mut stmt, &point)?;
                received += 1;
                if received % self.chunk_size as u64 == 0 {
                    self.emit(LoadProgress {
                        loaded: received,
                        total,
                        finished: false,
                    });
                }
            }
        }

        let count = points::count_points(conn)?;
        if self.mode == LoadMode::Replace && count < received {
            log::warn!(
                "Dataset {} repeats {} point codes; later records won",
                manifest.version,
                received - count
            );
        }
        if let Some(expected) = manifest.count {
            if expected != received {
                log::warn!(
                    "Dataset {} announced {expected} records but delivered {received}",
                    manifest.version
                );
            }
        }

        write_marker(
            conn,
            &MetaMarker {
                key: POINTS_MARKER_KEY.to_string(),
                version: manifest.version.clone(),
                count,
                batch_id: Some(batch_id.to_string()),
                updated_at: now_millis(),
            },
        )?;

        Ok(LoadReport {
            version: manifest.version.clone(),
            count,
            received,
            batch_id: batch_id.to_string(),
            mode: self.mode,
        })
    }

    fn emit(&self, progress: LoadProgress) {
        if let Some(tx) = &self.progress {
            let reserved = tx.capacity().map_or(false, |cap| tx.len() + 1 >= cap);
            if !reserved {
                let _ = tx.try_send(progress);
            }
        }
    }

    fn emit_finished(&self, progress: LoadProgress) {
        if let Some(tx) = &self.progress {
            if let Err(err) = tx.try_send(progress) {
                log::debug!("Final load progress not delivered: {err}");
            }
        }
    }
}
