//! # Database Error Types
//!
//! Storage errors and the combined error returned by the services.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  sqlx::Error ──► DbError ──┐                                            │
//! │                            ├──► EngineError ──► ApiError (pos-server)   │
//! │  CoreError ────────────────┘        │                                   │
//! │                                     ▼                                   │
//! │                              is_retryable()?                            │
//! │                              ├── yes: Busy, ledger sequence collision   │
//! │                              └── no:  everything else                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tavola_core::CoreError;
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Second active session for a table
    /// - Second payment for a session
    /// - Two ledger postings from the same previous balance
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint violation (e.g. stock quantity below zero).
    #[error("Constraint violation: {0}")]
    CheckViolation(String),

    /// SQLITE_BUSY / SQLITE_LOCKED: another writer holds the lock.
    #[error("Database is busy: {0}")]
    Busy(String),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Stored data could not be decoded or serialized.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Lock contention or an optimistic sequence collision.
    ///
    /// Both happen before anything commits, so re-running the whole unit
    /// of work is safe.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::Busy(_) => true,
            DbError::UniqueViolation { field, .. } => field.contains("ledger_entries.sequence"),
            _ => false,
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → code / message decides constraint or busy
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                let code = db_err.code();
                // Primary result codes: 5 = SQLITE_BUSY, 6 = SQLITE_LOCKED.
                // Extended codes keep the primary code in the low byte.
                let primary = code
                    .as_deref()
                    .and_then(|c| c.parse::<i32>().ok())
                    .map(|c| c & 0xff);

                if matches!(primary, Some(5) | Some(6))
                    || msg.contains("database is locked")
                    || msg.contains("database table is locked")
                {
                    DbError::Busy(msg.to_string())
                } else if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("CHECK constraint failed") {
                    DbError::CheckViolation(msg.to_string())
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Internal(format!("snapshot serialization: {err}"))
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Engine Error
// =============================================================================

/// Error returned by the transactional services.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A domain rule rejected the request. Never retried.
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// Storage failed.
    #[error(transparent)]
    Db(#[from] DbError),
}

impl EngineError {
    /// Whether the whole unit of work may be re-run.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Domain(_) => false,
            EngineError::Db(db) => db.is_transient(),
        }
    }

    /// The domain error, if this is one.
    pub fn as_domain(&self) -> Option<&CoreError> {
        match self {
            EngineError::Domain(e) => Some(e),
            EngineError::Db(_) => None,
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Db(DbError::from(err))
    }
}

impl From<tavola_core::ValidationError> for EngineError {
    fn from(err: tavola_core::ValidationError) -> Self {
        EngineError::Domain(CoreError::Validation(err))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Db(DbError::from(err))
    }
}

/// Result type for service operations.
pub type EngineResult<T> = Result<T, EngineError>;
