//! Store sessions
//!
//! A [`DocumentStore`] owns the process-wide pool. Every logical operation
//! runs inside [`DocumentStore::with_session`], which hands the operation a
//! [`Collection`] handle once the pool has answered within the acquire
//! timeout, bounds it with the operation timeout and releases the session on
//! every exit path, including timeouts and cancellation.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{DatabaseConfig, DatabaseDriver};
use crate::db::collection::{Collection, CollectionSpec};
use crate::db::{create_pool, migrations, DynDatabasePool};

/// Failures surfaced by the persistence layer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The targeted document does not exist
    #[error("Document not found: {0}")]
    NotFound(String),

    /// The store could not be reached or the operation did not finish in time
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A write kept colliding with concurrent writers
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// A document with the same key already exists
    #[error("Duplicate document key: {0}")]
    Duplicate(String),

    /// The document handed to the store cannot be stored
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// A stored document no longer decodes into its entity
    #[error("Stored document is corrupt: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// How a driver error should be surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverFault {
    UniqueViolation,
    LockContention,
    ValueTooLong,
    Other,
}

/// Translate a driver error into the store taxonomy.
pub(crate) fn classify(context: &str, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => {
            let mysql_number = db
                .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                .map(|e| e.number());
            let code = db.code();
            let detail = format!("{}: {}", context, db.message());
            match fault_of(db.is_unique_violation(), mysql_number, code.as_deref()) {
                DriverFault::UniqueViolation => StoreError::Duplicate(detail),
                DriverFault::LockContention => StoreError::Conflict(detail),
                DriverFault::ValueTooLong => StoreError::InvalidDocument(detail),
                DriverFault::Other => StoreError::Unavailable(detail),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("{}: timed out waiting for a connection", context))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("{}: connection pool is closed", context))
        }
        _ => StoreError::Unavailable(format!("{}: {}", context, err)),
    }
}

fn fault_of(unique_violation: bool, mysql_number: Option<u16>, code: Option<&str>) -> DriverFault {
    if unique_violation {
        return DriverFault::UniqueViolation;
    }
    if let Some(number) = mysql_number {
        return match number {
            // ER_LOCK_WAIT_TIMEOUT, ER_LOCK_DEADLOCK
            1205 | 1213 => DriverFault::LockContention,
            // ER_DATA_TOO_LONG
            1406 => DriverFault::ValueTooLong,
            _ => DriverFault::Other,
        };
    }
    match code {
        // SQLITE_BUSY, SQLITE_LOCKED and their extended codes
        Some("5") | Some("6") | Some("261") | Some("262") | Some("517") => DriverFault::LockContention,
        _ => DriverFault::Other,
    }
}

/// Counts open sessions; decremented when dropped.
struct SessionGuard {
    active: Arc<AtomicUsize>,
}

impl SessionGuard {
    fn open(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self {
            active: Arc::clone(active),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Shared handle to the document store
#[derive(Clone)]
pub struct DocumentStore {
    pool: DynDatabasePool,
    acquire_timeout: Duration,
    operation_timeout: Duration,
    active: Arc<AtomicUsize>,
}

impl DocumentStore {
    pub fn new(pool: DynDatabasePool, acquire_timeout: Duration, operation_timeout: Duration) -> Self {
        Self {
            pool,
            acquire_timeout,
            operation_timeout,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Open the pool described by `config` and bring the schema up to date.
    pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = create_pool(config).await?;
        migrations::run_migrations(&pool).await?;
        Ok(Self::new(pool, config.acquire_timeout(), config.operation_timeout()))
    }

    /// Migrated in-memory SQLite store, for tests.
    pub async fn connect_in_memory() -> anyhow::Result<Self> {
        let config = DatabaseConfig {
            driver: DatabaseDriver::Sqlite,
            url: ":memory:".to_string(),
            ..DatabaseConfig::default()
        };
        Self::connect(&config).await
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Number of sessions currently open
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub async fn ping(&self) -> StoreResult<()> {
        self.pool
            .ping()
            .await
            .map_err(|e| StoreError::Unavailable(format!("{:#}", e)))
    }

    /// Close the pool; called once at shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Check out a connection and make sure the store answers on it.
    async fn acquire(&self, spec: &CollectionSpec) -> StoreResult<()> {
        match tokio::time::timeout(self.acquire_timeout, self.pool.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::warn!(collection = spec.name, error = %e, "Store session could not be opened");
                Err(StoreError::Unavailable(format!("acquire: {:#}", e)))
            }
            Err(_) => {
                tracing::warn!(collection = spec.name, "Timed out acquiring a store session");
                Err(StoreError::Unavailable(format!(
                    "acquire: no connection within {:?}",
                    self.acquire_timeout
                )))
            }
        }
    }

    /// Run `operation` against one collection.
    ///
    /// The operation only runs once the pool hands out a live connection
    /// within the acquire timeout; otherwise the session fails with
    /// [`StoreError::Unavailable`]. The session is released exactly once
    /// however the operation ends. An operation that outlives the configured
    /// timeout is dropped and reported as [`StoreError::Unavailable`].
    pub async fn with_session<T, F, Fut>(
        &self,
        spec: &'static CollectionSpec,
        operation: F,
    ) -> StoreResult<T>
    where
        F: FnOnce(Collection) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let _guard = SessionGuard::open(&self.active);
        self.acquire(spec).await?;
        let collection = Collection::new(self.pool.clone(), spec);

        match tokio::time::timeout(self.operation_timeout, operation(collection)).await {
            Ok(result) => {
                if let Err(ref e) = result {
                    tracing::debug!(collection = spec.name, error = %e, "Store operation failed");
                }
                result
            }
            Err(_) => {
                tracing::warn!(
                    collection = spec.name,
                    timeout_ms = self.operation_timeout.as_millis() as u64,
                    "Store operation timed out"
                );
                Err(StoreError::Unavailable(format!(
                    "operation on '{}' timed out after {:?}",
                    spec.name, self.operation_timeout
                )))
            }
        }
    }
}
