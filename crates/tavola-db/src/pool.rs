//! # Database Pool Management
//!
//! Connection pool, write gate and retry policy for SQLite.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Handle                                    │
//! │                                                                         │
//! │  DbConfig::new(path) ──► Database::new(config).await                    │
//! │                               │                                         │
//! │            ┌──────────────────┼───────────────────┐                     │
//! │            ▼                  ▼                   ▼                     │
//! │      SqlitePool          write gate           RetryPolicy               │
//! │   (WAL, FK on,        (async mutex; held    (exponential backoff        │
//! │    busy_timeout)       for a whole write     on Busy / sequence         │
//! │                        transaction)          collisions)                │
//! │                                                                         │
//! │  Readers ──► pool.acquire()        (never wait on the gate)             │
//! │  Writers ──► begin_write() ──► WriteTx { gate guard, Transaction }      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Why a Gate on Top of SQLite Locking?
//! SQLite allows one writer at a time, but a deferred transaction only takes
//! the write lock at its first write, after its reads. Two checkouts could
//! both read "not paid" and then race for the lock. Holding the gate from
//! BEGIN to COMMIT makes read-check-write one critical section in this
//! process; the busy timeout plus retry covers writers in other processes.

use backoff::ExponentialBackoff;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult, EngineError, EngineResult};
use crate::migrations;

// =============================================================================
// Configuration
// =============================================================================

/// Retry policy for transient write conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Give up after this much total time.
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            initial_interval: Duration::from_millis(20),
            max_interval: Duration::from_millis(500),
            max_elapsed: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            current_interval: self.initial_interval,
            max_interval: self.max_interval,
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        }
    }
}

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/tavola/pos.db")
///     .max_connections(8)
///     .busy_timeout(Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    pub min_connections: u32,

    /// Pool acquire timeout.
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection. `None` keeps connections forever.
    pub idle_timeout: Option<Duration>,

    /// How long SQLite itself waits on a locked database before SQLITE_BUSY.
    pub busy_timeout: Duration,

    /// Whether to run migrations on connect.
    pub run_migrations: bool,

    /// Retry policy for transient write conflicts.
    pub retry: RetryPolicy,

    in_memory: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    ///
    /// The file is created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
            retry: RetryPolicy::default(),
            in_memory: false,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Creates an isolated in-memory database configuration (for testing).
    ///
    /// A single connection that never idles out: closing it would drop the
    /// whole database.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: None,
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
            retry: RetryPolicy::default(),
            in_memory: true,
        }
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let base = if self.in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")
        } else {
            SqliteConnectOptions::from_str(&format!(
                "sqlite://{}",
                self.database_path.display()
            ))
        }
        .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        let options = base
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout)
            .create_if_missing(true);

        // WAL needs a file; in-memory databases keep their default journal.
        Ok(if self.in_memory {
            options
        } else {
            options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
        })
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle: pool, write gate and retry policy.
///
/// Cheap to clone; every clone shares the same gate.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    write_gate: Arc<Mutex<()>>,
    retry: RetryPolicy,
}

impl Database {
    /// Creates the pool, applies pragmas and runs migrations (if enabled).
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let connect_options = config.connect_options()?;

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(if config.in_memory {
                None
            } else {
                Some(Duration::from_secs(30 * 60))
            })
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database {
            pool,
            write_gate: Arc::new(Mutex::new(())),
            retry: config.retry,
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Applies all pending migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Opens a write transaction under the write gate.
    ///
    /// Dropping the returned [`WriteTx`] without committing rolls back and
    /// releases the gate.
    pub async fn begin_write(&self) -> DbResult<WriteTx> {
        let gate = self.write_gate.clone().lock_owned().await;
        let tx = self.pool.begin().await?;
        Ok(WriteTx { tx, _gate: gate })
    }

    /// Runs `unit` until it succeeds, fails permanently, or the retry
    /// budget runs out. Only transient errors are retried.
    ///
    /// `unit` must open its own transaction so each attempt starts clean.
    pub async fn with_retry<T, F, Fut>(&self, operation: &str, mut unit: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        backoff::future::retry_notify(
            self.retry.backoff(),
            || {
                let attempt = unit();
                async move {
                    attempt.await.map_err(|e| {
                        if e.is_retryable() {
                            backoff::Error::transient(e)
                        } else {
                            backoff::Error::permanent(e)
                        }
                    })
                }
            },
            |err: EngineError, wait: Duration| {
                warn!(operation = %operation, ?wait, error = %err, "Retrying after write conflict");
            },
        )
        .await
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database can execute queries.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Write Transaction
// =============================================================================

/// A transaction holding the process-wide write gate.
pub struct WriteTx {
    // Field order matters: the transaction rolls back before the gate opens.
    tx: Transaction<'static, Sqlite>,
    _gate: OwnedMutexGuard<()>,
}

impl WriteTx {
    /// The connection to run statements on.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> DbResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tavola_core::CoreError;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn test_config_builder() {
        let config = DbConfig::new("/tmp/test.db")
            .max_connections(10)
            .min_connections(2)
            .busy_timeout(Duration::from_millis(250));

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_rolled_back_write_leaves_no_trace() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut tx = db.begin_write().await.unwrap();
        sqlx::query("INSERT INTO stores (id, name) VALUES ('s1', 'Main')")
            .execute(tx.conn())
            .await
            .unwrap();
        drop(tx);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stores")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_with_retry_retries_transient_only() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut attempts = 0;
        let result: EngineResult<i32> = db
            .with_retry("flaky", || {
                attempts += 1;
                let n = attempts;
                async move {
                    if n < 3 {
                        Err(EngineError::from(DbError::Busy("database is locked".into())))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);

        let mut permanent_attempts = 0;
        let result: EngineResult<()> = db
            .with_retry("conflict", || {
                permanent_attempts += 1;
                async {
                    Err::<(), _>(EngineError::from(CoreError::AlreadyPaid {
                        bill: "s1".into(),
                    }))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(permanent_attempts, 1);
    }
}
