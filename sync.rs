//! Boot sequence: consult the version gate and run the bulk loader when the stored
//! dataset is missing, stale or was left incomplete.

use crossbeam_channel::Sender;
use rusqlite::Connection;
use serde::Serialize;

use crate::db::StoreHandle;
use crate::error::Result;
use crate::feed::Feed;
use crate::loader::{BulkLoader, LoadReport};
use crate::models::{LoadProgress, Manifest};
use crate::points::count_points;
use crate::version_gate::{decide, read_marker, SyncDecision, POINTS_MARKER_KEY};

/// Version recorded for feeds that arrive without a manifest.
pub const UNVERSIONED: &str = "unversioned";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BootOutcome {
    pub decision: SyncDecision,
    pub report: Option<LoadReport>,
}

pub fn sync_points(conn: &mut Connection, feed: Feed, loader: &BulkLoader) -> Result<BootOutcome> {
    let marker = read_marker(conn, POINTS_MARKER_KEY)?;
    let stored = count_points(conn)?;
    let decision = decide(marker.as_ref(), feed.manifest.as_ref(), stored);

    if !decision.needs_resync() {
        log::info!("Points dataset is current ({stored} rows)");
        return Ok(BootOutcome {
            decision,
            report: None,
        });
    }

    log::info!("Points dataset needs a reload: {decision:?}");
    let len = feed.len() as u64;
    let (manifest, records) = feed.into_parts();
    let manifest = manifest.unwrap_or_else(|| Manifest::new(UNVERSIONED, Some(len)));
    let report = loader.load(conn, &manifest, records)?;
    Ok(BootOutcome {
        decision,
        report: Some(report),
    })
}

/// Runs the boot sync on the store's blocking pool. Progress, if wanted, arrives on
/// `progress` in chunks of the configured size.
pub async fn boot(
    handle: &StoreHandle,
    feed: Feed,
    progress: Option<Sender<LoadProgress>>,
) -> Result<BootOutcome> {
    let mut loader = BulkLoader::new(handle.config().progress_chunk);
    if let Some(progress) = progress {
        loader = loader.with_progress(progress);
    }
    handle
        .run(move |conn| sync_points(conn, feed, &loader))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::error::Error;
    use crate::loader::progress_channel;
    use crate::models::{Point, PointType};
    use crate::version_gate::ResyncReason;

    fn points(n: usize, tag: &str) -> Vec<Point> {
        (0..n)
            .map(|i| Point {
                code: format!("{tag}{i:04}"),
                name: format!("点{i}"),
                kana: "てん".into(),
                point_type: PointType::SecondOrder,
                prefecture: "青森県".into(),
                city: "弘前市".into(),
                latitude: 40.6,
                longitude: 140.5,
                elevation: None,
                accuracy: None,
                mark_type: None,
                install_date: None,
                remarks: None,
            })
            .collect()
    }

    fn feed(version: Option<&str>, n: usize) -> Feed {
        let manifest = version.map(|v| Manifest::new(v, Some(n as u64)));
        Feed::from_points(manifest, &points(n, "P")).unwrap()
    }

    #[tokio::test]
    async fn first_boot_loads_and_second_boot_skips() {
        let handle = StoreHandle::new(StoreConfig::in_memory());
        let (tx, rx) = progress_channel();

        let first = boot(&handle, feed(Some("2024-04"), 30), Some(tx)).await.unwrap();
        assert_eq!(first.decision, SyncDecision::Resync(ResyncReason::NoMarker));
        assert_eq!(first.report.as_ref().map(|r| r.count), Some(30));
        assert!(rx.try_iter().last().is_some_and(|p| p.finished));

        let second = boot(&handle, feed(Some("2024-04"), 30), None).await.unwrap();
        assert_eq!(second.decision, SyncDecision::UpToDate);
        assert!(second.report.is_none());
    }

    #[tokio::test]
    async fn new_version_replaces_dataset() {
        let handle = StoreHandle::new(StoreConfig::in_memory());
        boot(&handle, feed(Some("v1"), 10), None).await.unwrap();

        let next = Feed::from_points(Some(Manifest::new("v2", None)), &points(4, "Q")).unwrap();
        let outcome = boot(&handle, next, None).await.unwrap();
        assert!(matches!(
            outcome.decision,
            SyncDecision::Resync(ResyncReason::VersionChanged { .. })
        ));
        let stored = handle.run(|conn| count_points(conn)).await.unwrap();
        assert_eq!(stored, 4);
    }

    #[tokio::test]
    async fn unversioned_feed_loads_once() {
        let handle = StoreHandle::new(StoreConfig::in_memory());
        let first = boot(&handle, feed(None, 5), None).await.unwrap();
        assert_eq!(first.report.map(|r| r.version), Some(UNVERSIONED.to_string()));

        let second = boot(&handle, feed(None, 8), None).await.unwrap();
        assert_eq!(second.decision, SyncDecision::UpToDate);
        let stored = handle.run(|conn| count_points(conn)).await.unwrap();
        assert_eq!(stored, 5);
    }

    #[tokio::test]
    async fn broken_feed_keeps_previous_dataset_and_retries() {
        let handle = StoreHandle::new(StoreConfig::in_memory());
        boot(&handle, feed(Some("v1"), 10), None).await.unwrap();

        let broken = Feed::parse(
            r#"{"manifest":{"version":"v2"},"points":[{"code":"X","name":"x","type":"一等三角点","latitude":1,"longitude":2},{"code":"Y"}]}"#
                .as_bytes(),
        )
        .unwrap();
        let err = boot(&handle, broken, None).await.unwrap_err();
        assert!(matches!(err, Error::FeedFetch(_)));

        let stored = handle.run(|conn| count_points(conn)).await.unwrap();
        assert_eq!(stored, 10);
        let retry = boot(&handle, feed(Some("v2"), 12), None).await.unwrap();
        assert!(retry.decision.needs_resync());
    }
}
