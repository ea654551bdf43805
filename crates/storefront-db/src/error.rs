//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ├── DbError::Core(CartNotOpen / InsufficientStock / …)           │
//! │       │   Domain failures surfaced from inside transactions;           │
//! │       │   the transaction has already rolled back completely           │
//! │       │                                                                 │
//! │       └── DbError::Busy                                                 │
//! │           Lock wait exhausted after the bounded busy_timeout;           │
//! │           the one transient, retryable case                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use storefront_core::CoreError;

/// Database operation errors.
///
/// These errors wrap sqlx errors and carry domain failures out of
/// transactional code through one result type.
#[derive(Debug, Error)]
pub enum DbError {
    /// A business rule violation surfaced from inside a transaction.
    /// The transaction rolled back; no partial state is observable.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate (cart, variant) cart item → mapped to
    ///   `CoreError::DuplicateVariant` by the cart store
    /// - Duplicate idempotency key losing a race → resolved by the payment
    ///   ledger reading the winner's row
    /// - Second order for one cart (orders.cart_id UNIQUE)
    #[error("Duplicate {field}: already exists")]
    UniqueViolation { field: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Lock acquisition timed out after the bounded busy_timeout.
    /// Transient: callers may retry with backoff.
    #[error("Database busy: lock wait exhausted")]
    Busy,

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound domain error for a given entity type and id.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::Core(CoreError::not_found(entity, id))
    }

    /// Whether the error is a unique-constraint violation on the named
    /// column. Used to translate storage conflicts into domain errors
    /// (e.g. a duplicate (cart, variant) insert → DuplicateVariant).
    pub fn is_unique_violation_on(&self, column: &str) -> bool {
        matches!(self, DbError::UniqueViolation { field } if field.contains(column))
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound      → DbError::Core(NotFound)
/// sqlx::Error::Database(UNIQUE) → DbError::UniqueViolation
/// sqlx::Error::Database(FK)     → DbError::ForeignKeyViolation
/// sqlx::Error::Database(locked) → DbError::Busy
/// sqlx::Error::PoolTimedOut     → DbError::Busy
/// Other                         → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::Core(CoreError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            }),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite error messages for constraints:
                // UNIQUE: "UNIQUE constraint failed: <table>.<column>"
                // FK:     "FOREIGN KEY constraint failed"
                // Busy:   "database is locked"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation { field }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("database is locked") {
                    DbError::Busy
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::Busy,

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

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
