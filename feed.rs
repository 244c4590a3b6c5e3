//! External dataset feed: either a bare list of points or `{ manifest, points }`.
//!
//! Records stay as raw JSON until the loader pulls them, so one malformed entry
//! fails the load at that record and the transaction rolls back.

use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::{Manifest, Point};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFeed {
    Manifested {
        #[serde(default, alias = "meta")]
        manifest: Option<Manifest>,
        points: Vec<Value>,
    },
    Flat(Vec<Value>),
}

#[derive(Debug, Clone)]
pub struct Feed {
    pub manifest: Option<Manifest>,
    records: Vec<Value>,
}

impl Feed {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let raw: RawFeed = serde_json::from_slice(bytes)
            .map_err(|err| Error::FeedFetch(format!("unreadable dataset: {err}")))?;
        let (manifest, records) = match raw {
            RawFeed::Manifested { manifest, points } => (manifest, points),
            RawFeed::Flat(points) => (None, points),
        };
        Ok(Self { manifest, records })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|err| Error::FeedFetch(format!("{}: {err}", path.display())))?;
        Self::parse(&bytes)
    }

    pub fn from_points(manifest: Option<Manifest>, points: &[Point]) -> Result<Self> {
        let records = points
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { manifest, records })
    }

    /// Attaches a manifest delivered as a separate document, replacing any inline one.
    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_parts(self) -> (Option<Manifest>, FeedRecords) {
        (
            self.manifest,
            FeedRecords {
                inner: self.records.into_iter().enumerate(),
            },
        )
    }
}

/// Reads a manifest document such as `{ "pointsVersion": "2024-04", "count": 109000 }`.
pub fn read_manifest(path: &Path) -> Result<Manifest> {
    let bytes = std::fs::read(path)
        .map_err(|err| Error::FeedFetch(format!("{}: {err}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| Error::FeedFetch(format!("unreadable manifest {}: {err}", path.display())))
}

/// Lazily decoded feed records.
pub struct FeedRecords {
    inner: std::iter::Enumerate<std::vec::IntoIter<Value>>,
}

impl Iterator for FeedRecords {
    type Item = Result<Point>;

    fn next(&mut self) -> Option<Self::Item> {
        let (idx, value) = self.inner.next()?;
        Some(
            serde_json::from_value(value)
                .map_err(|err| Error::FeedFetch(format!("record {idx}: {err}"))),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for FeedRecords {}

#[cfg(test)]
mod tests {
    use super::*;

    const POINT: &str = r#"{"code":"A1","name":"中央","kana":"ちゅうおう","type":"三等三角点","prefecture":"東京都","city":"中央区","latitude":35.67,"longitude":139.77}"#;

    #[test]
    fn parses_flat_list_without_manifest() {
        let feed = Feed::parse(format!("[{POINT}]").as_bytes()).unwrap();
        assert!(feed.manifest.is_none());
        let (_, records) = feed.into_parts();
        let points: Vec<Point> = records.collect::<Result<_>>().unwrap();
        assert_eq!(points[0].code, "A1");
    }

    #[test]
    fn parses_manifested_document() {
        let json = format!(r#"{{"manifest":{{"version":"2024-04","count":1}},"points":[{POINT}]}}"#);
        let feed = Feed::parse(json.as_bytes()).unwrap();
        assert_eq!(feed.manifest, Some(Manifest::new("2024-04", Some(1))));
        assert_eq!(feed.len(), 1);
    }

    #[test]
    fn accepts_meta_total_spelling() {
        let json = format!(r#"{{"meta":{{"version":7,"total":1}},"points":[{POINT}]}}"#);
        let feed = Feed::parse(json.as_bytes()).unwrap();
        assert_eq!(feed.manifest, Some(Manifest::new("7", Some(1))));
    }

    #[test]
    fn malformed_document_is_feed_failure() {
        assert!(matches!(Feed::parse(b"{ not json"), Err(Error::FeedFetch(_))));
        assert!(matches!(
            Feed::read(Path::new("/definitely/missing/points.json")),
            Err(Error::FeedFetch(_))
        ));
    }

    #[test]
    fn bad_record_fails_only_when_reached() {
        let json = format!(r#"[{POINT}, {{"code":"B"}}]"#);
        let (_, mut records) = Feed::parse(json.as_bytes()).unwrap().into_parts();
        assert!(records.next().unwrap().is_ok());
        match records.next() {
            Some(Err(Error::FeedFetch(msg))) => assert!(msg.starts_with("record 1")),
            other => panic!("Expected record failure, got {other:?}"),
        }
    }
}
