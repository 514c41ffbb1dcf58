mod postgres;
mod sqlite;
mod traits;

use std::sync::Arc;

use tracing::info;

use crate::broker::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::message::Lease;

pub use self::postgres::PostgresStorage;
pub use self::sqlite::SqliteStorage;
pub use traits::{ClaimBatch, Storage, StoreStats};

/// Open the backend named by the scheme of `config.url`.
///
/// - `sqlite::memory:`: private in-memory database
/// - `sqlite://path` or `sqlite:path`: database file, created if missing
/// - `postgres://…` or `postgresql://…`: PostgreSQL server
pub async fn open(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    let url = config.url.as_str();
    if url == "sqlite::memory:" {
        info!("opening in-memory sqlite store");
        return Ok(Arc::new(SqliteStorage::open_in_memory().await?));
    }
    if let Some(path) = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
    {
        return Ok(Arc::new(SqliteStorage::open_with(path, config).await?));
    }
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        return Ok(Arc::new(PostgresStorage::connect(url, config).await?));
    }
    Err(StorageError::Config(format!(
        "unsupported storage url {url:?}, expected sqlite: or postgres:"
    )))
}

// --- Row conversion shared by the SQL backends ---

/// Timestamps are unix milliseconds, stored as signed 64-bit integers.
pub(crate) fn to_sql_ms(ms: u64) -> StorageResult<i64> {
    i64::try_from(ms).map_err(|_| StorageError::Corrupt(format!("timestamp {ms} out of range")))
}

pub(crate) fn from_sql_ms(ms: i64) -> StorageResult<u64> {
    u64::try_from(ms).map_err(|_| StorageError::Corrupt(format!("negative timestamp {ms}")))
}

/// Rebuild the lease from its two nullable columns, rejecting rows where
/// only one is set.
pub(crate) fn lease_from_columns(
    assigned_to: Option<String>,
    lease_expires_at: Option<i64>,
) -> StorageResult<Option<Lease>> {
    match (assigned_to, lease_expires_at) {
        (None, None) => Ok(None),
        (Some(owner), Some(expires_at)) => Ok(Some(Lease {
            owner,
            expires_at: from_sql_ms(expires_at)?,
        })),
        (owner, expiry) => Err(StorageError::Corrupt(format!(
            "assigned_to={owner:?} and lease_expires_at={expiry:?} must be set together"
        ))),
    }
}
