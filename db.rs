use lazy_static::lazy_static;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Transaction};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::{StorageLocation, StoreConfig};
use crate::error::{Error, Result};
use crate::schema::{MIGRATIONS, SCHEMA_VERSION};

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;

lazy_static! {
    static ref SHARED: Mutex<Option<StoreHandle>> = Mutex::new(None);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Opens the connection pool and brings the schema up to date.
///
/// Any failure to reach the backing file is reported as `StorageUnavailable` and is
/// not retried.
pub fn open_pool(config: &StoreConfig) -> Result<DbPool> {
    config.validate()?;
    let busy_timeout = Duration::from_millis(config.busy_timeout_ms);

    let (manager, builder, wal) = match &config.location {
        StorageLocation::File(path) => {
            log::info!("Database path: {}", path.display());
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|err| {
                    Error::StorageUnavailable(format!("{}: {err}", parent.display()))
                })?;
            }
            (SqliteConnectionManager::file(path), r2d2::Pool::builder(), true)
        }
        // every connection to ":memory:" is its own database, so keep exactly one alive
        StorageLocation::Memory => (
            SqliteConnectionManager::memory(),
            r2d2::Pool::builder()
                .max_size(1)
                .idle_timeout(None)
                .max_lifetime(None),
            false,
        ),
    };

    let manager = manager.with_init(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        if wal {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        Ok(())
    });
    let pool = builder
        .connection_timeout(Duration::from_secs(5))
        .build(manager)
        .map_err(|err| Error::StorageUnavailable(err.to_string()))?;

    let mut connection = pool.get()?;
    run_migrations(&mut *connection)?;

    Ok(pool)
}

/// Applies all pending database migrations, one transaction per version step.
pub fn run_migrations(connection: &mut Connection) -> Result<i64> {
    let current = schema_version(connection)?;
    if current > SCHEMA_VERSION {
        return Err(Error::SchemaMismatch {
            found: current,
            expected: SCHEMA_VERSION,
        });
    }
    if current == SCHEMA_VERSION {
        log::debug!("Schema already at version {current}");
        return Ok(current);
    }

    log::info!("Running database migrations from version {current}...");
    for (idx, migration) in MIGRATIONS.iter().enumerate().skip(current.max(0) as usize) {
        let target = idx as i64 + 1;
        let tx = connection.transaction()?;
        tx.execute_batch(migration).map_err(|err| Error::aborted(err.into()))?;
        tx.pragma_update(None, "user_version", target)?;
        tx.commit()?;
        log::info!("Applied migration {target:04}");
    }

    log::info!("Migrations applied successfully.");
    Ok(SCHEMA_VERSION)
}

pub fn schema_version(connection: &Connection) -> Result<i64> {
    Ok(connection.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// Wipes points, visits, photos and version markers in a single transaction.
pub fn clear_everything(connection: &mut Connection) -> Result<()> {
    let tx = connection.transaction()?;
    tx.execute_batch(
        "DELETE FROM points;
         DELETE FROM visits;
         DELETE FROM photos;
         DELETE FROM meta;
         DELETE FROM labels;",
    )
    .map_err(|err| Error::aborted(err.into()))?;
    tx.commit()?;
    log::info!("Cleared all stored data");
    Ok(())
}

/// Lifecycle owner of the connection pool. Cloning shares the same pool.
///
/// The pool is opened lazily on first use and reused until `close`.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    config: StoreConfig,
    pool: Mutex<Option<DbPool>>,
}

impl StoreHandle {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                config,
                pool: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn open(&self) -> Result<DbPool> {
        let mut pool = lock(&self.inner.pool);
        if let Some(existing) = pool.as_ref() {
            return Ok(existing.clone());
        }
        let opened = open_pool(&self.inner.config)?;
        *pool = Some(opened.clone());
        Ok(opened)
    }

    pub fn close(&self) {
        if lock(&self.inner.pool).take().is_some() {
            log::info!("Store closed");
        }
    }

    pub fn is_open(&self) -> bool {
        lock(&self.inner.pool).is_some()
    }

    /// Runs `f` against a pooled connection on the blocking thread pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.open()?;
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get()?;
            f(&mut *connection)
        })
        .await
        .map_err(|e| Error::Init(format!("Task join error: {e}")))?
    }

    /// Runs `f` inside one write transaction. Everything `f` writes commits together,
    /// or nothing does when it returns an error.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
    {
        self.run(move |connection| {
            let tx = connection.transaction()?;
            let value = f(&tx).map_err(Error::aborted)?;
            tx.commit().map_err(|err| Error::aborted(err.into()))?;
            Ok(value)
        })
        .await
    }

    /// Synchronous counterpart of [`StoreHandle::run`] for callers outside a runtime.
    pub fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let pool = self.open()?;
        let mut connection = pool.get()?;
        f(&mut *connection)
    }
}

/// Process-wide handle. Every caller must ask for the same storage location.
pub fn shared_handle(config: &StoreConfig) -> Result<StoreHandle> {
    let mut shared = lock(&SHARED);
    match shared.as_ref() {
        Some(handle) if handle.config().location == config.location => Ok(handle.clone()),
        Some(handle) => Err(Error::Init(format!(
            "store already bound to {:?}, refusing {:?}",
            handle.config().location,
            config.location
        ))),
        None => {
            let handle = StoreHandle::new(config.clone());
            *shared = Some(handle.clone());
            Ok(handle)
        }
    }
}
