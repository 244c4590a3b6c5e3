/// Highest schema version this build knows how to open.
pub const SCHEMA_VERSION: i64 = 3;

/// MIGRATION 0001: Initial database schema.
pub const MIGRATION_0001: &str = r#"
-- Points Table: benchmark master data, replaced as a whole on re-sync.
CREATE TABLE IF NOT EXISTS points (
    code TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    kana TEXT NOT NULL DEFAULT '',
    point_type TEXT NOT NULL,
    prefecture TEXT NOT NULL DEFAULT '',
    city TEXT NOT NULL DEFAULT '',
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    elevation REAL,
    accuracy TEXT,
    mark_type TEXT,
    install_date TEXT,
    remarks TEXT
);

-- Visits Table: one row per point, keyed by the point code.
CREATE TABLE IF NOT EXISTS visits (
    point_code TEXT PRIMARY KEY NOT NULL,
    visit_date TEXT NOT NULL, -- ISO-8601 date
    found INTEGER NOT NULL,
    weather TEXT,
    notes TEXT,
    created_at INTEGER NOT NULL -- Unix timestamp (ms)
);

-- Photos Table: resized JPEG blobs per point and kind.
CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    point_code TEXT NOT NULL,
    kind TEXT NOT NULL, -- 'near' or 'far'
    blob BLOB NOT NULL,
    created_at INTEGER NOT NULL
);

-- Meta Table: dataset version markers.
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY NOT NULL,
    version TEXT NOT NULL,
    count INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_points_name ON points (name);
CREATE INDEX IF NOT EXISTS idx_points_type ON points (point_type);
CREATE INDEX IF NOT EXISTS idx_points_prefecture ON points (prefecture);
CREATE INDEX IF NOT EXISTS idx_visits_visit_date ON visits (visit_date);
CREATE INDEX IF NOT EXISTS idx_photos_point_code ON photos (point_code);
"#;

/// MIGRATION 0002: kana search, GPS fixes on visits, one photo per kind.
pub const MIGRATION_0002: &str = r#"
CREATE INDEX IF NOT EXISTS idx_points_kana ON points (kana);
CREATE INDEX IF NOT EXISTS idx_visits_found ON visits (found);

ALTER TABLE visits ADD COLUMN latitude REAL;
ALTER TABLE visits ADD COLUMN longitude REAL;
ALTER TABLE visits ADD COLUMN gps_accuracy REAL;

ALTER TABLE meta ADD COLUMN batch_id TEXT;

-- Keep the newest photo of every (point, kind) pair before enforcing uniqueness.
DELETE FROM photos
WHERE id NOT IN (SELECT MAX(id) FROM photos GROUP BY point_code, kind);

DROP INDEX IF EXISTS idx_photos_point_code;
CREATE UNIQUE INDEX IF NOT EXISTS idx_photos_point_kind ON photos (point_code, kind);
"#;

/// MIGRATION 0003: reference label dictionaries.
pub const MIGRATION_0003: &str = r#"
-- Labels Table: id -> display label, grouped by dictionary key.
CREATE TABLE IF NOT EXISTS labels (
    set_key TEXT NOT NULL,
    id TEXT NOT NULL,
    label TEXT NOT NULL,
    PRIMARY KEY (set_key, id)
);
"#;

/// Migrations in order; entry `i` upgrades the store from version `i` to `i + 1`.
pub const MIGRATIONS: [&str; SCHEMA_VERSION as usize] =
    [MIGRATION_0001, MIGRATION_0002, MIGRATION_0003];
