//! Local store for geodetic benchmark points, field visits and their photos.

pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod labels;
pub mod loader;
pub mod models;
pub mod photos;
pub mod points;
pub mod query;
pub mod schema;
pub mod stats;
pub mod sync;
pub mod thumbnails;
pub mod version_gate;
pub mod visits;

pub use config::{PhotoDimensions, StorageLocation, StoreConfig};
pub use db::{shared_handle, StoreHandle};
pub use error::{Error, Result};
pub use feed::Feed;
pub use labels::{LabelMap, LabelStore};
pub use loader::{BulkLoader, LoadMode, LoadReport};
pub use models::{
    GpsFix, HistoryEntry, HistoryFilter, LoadProgress, Manifest, MetaMarker, Page, PageRequest,
    Photo, PhotoKind, Point, PointFilter, PointType, Visit, VisitSort,
};
pub use photos::PhotoStore;
pub use points::PointStore;
pub use stats::{SurveyStats, SurveySummary};
pub use sync::{boot, BootOutcome};
pub use version_gate::{should_resync, SyncDecision};
pub use visits::VisitStore;
