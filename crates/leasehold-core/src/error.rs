/// Low-level storage errors (database, schema, row decoding).
/// This is the error type for the `Storage` trait. Storage operations can only
/// fail with infrastructure errors, never domain errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The store could not be reached or the transaction did not commit.
    /// Nothing was mutated; the caller may retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("invalid storage configuration: {0}")]
    Config(String),
}

impl StorageError {
    /// Whether the failed operation can be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::Decode(_)
            | sqlx::Error::TypeNotFound { .. } => StorageError::Corrupt(err.to_string()),
            sqlx::Error::Configuration(_) => StorageError::Config(err.to_string()),
            other => StorageError::Unavailable(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::Migration(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Unavailable(err.to_string())
    }
}

/// Input rejected before the store is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("payload must not be blank")]
    EmptyPayload,

    #[error("payload is {len} bytes, limit is {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("consumer id must not be empty")]
    EmptyConsumerId,

    #[error("consumer id is {len} bytes, limit is {max}")]
    ConsumerIdTooLong { len: usize, max: usize },

    #[error("count must be at least 1")]
    ZeroCount,

    #[error("count {requested} exceeds the limit of {max}")]
    CountTooLarge { requested: u32, max: u32 },

    #[error("lease duration must be positive")]
    ZeroLease,

    #[error("lease of {requested_ms}ms exceeds the limit of {max_ms}ms")]
    LeaseTooLong { requested_ms: u64, max_ms: u64 },
}

/// A configuration file that parses but cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

// --- Per-operation error types ---

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, thiserror::Error)]
pub enum AckError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
