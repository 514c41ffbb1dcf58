use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::Sqlite;
use tracing::{debug, info};
use uuid::Uuid;

use crate::broker::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::lease::{self, ClaimPriority};
use crate::message::{Lease, Message};
use crate::storage::traits::{ClaimBatch, Storage, StoreStats};
use crate::storage::{from_sql_ms, lease_from_columns, to_sql_ms};

/// Unclaimed rows first, then lapsed leases, each oldest first. Both halves are
/// limited separately so neither category can starve the sort.
const CANDIDATES_SQL: &str = r#"
SELECT id, payload, assigned_to, lease_expires_at, created_at FROM (
    SELECT id, payload, assigned_to, lease_expires_at, created_at, 0 AS priority
    FROM messages
    WHERE assigned_to IS NULL
    ORDER BY created_at, id
    LIMIT ?2
)
UNION ALL
SELECT id, payload, assigned_to, lease_expires_at, created_at FROM (
    SELECT id, payload, assigned_to, lease_expires_at, created_at, 1 AS priority
    FROM messages
    WHERE assigned_to IS NOT NULL AND lease_expires_at < ?1
    ORDER BY created_at, id
    LIMIT ?2
)
"#;

/// Compare-and-swap on one row: only succeeds if the row is still claimable.
const ASSIGN_SQL: &str = r#"
UPDATE messages
SET assigned_to = ?1, lease_expires_at = ?2
WHERE id = ?3 AND (assigned_to IS NULL OR lease_expires_at < ?4)
"#;

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: String,
    payload: String,
    assigned_to: Option<String>,
    lease_expires_at: Option<i64>,
    created_at: i64,
}

impl TryFrom<MessageRow> for Message {
    type Error = StorageError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| StorageError::Corrupt(format!("message id {:?}: {e}", row.id)))?;
        Ok(Message {
            id,
            payload: row.payload,
            lease: lease_from_columns(row.assigned_to, row.lease_expires_at)?,
            created_at: from_sql_ms(row.created_at)?,
        })
    }
}

/// SQLite-backed storage.
///
/// SQLite has neither row locks nor `SKIP LOCKED`, so claims use optimistic
/// compare-and-swap: candidates are read without a write lock, then each one
/// is taken with a conditional update whose affected-row count decides the
/// race. The first update of the batch takes SQLite's database write lock,
/// which makes the refill read for lost rows race-free. All updates of a batch
/// commit together.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open or create a database file with default pool settings.
    pub async fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with(path, &StorageConfig::default()).await
    }

    /// Open or create a database file.
    ///
    /// Creates missing parent directories, switches the journal to WAL so
    /// readers do not block the writer, and sets a busy timeout so concurrent
    /// claims wait for the write lock instead of failing.
    pub async fn open_with(path: impl AsRef<Path>, config: &StorageConfig) -> StorageResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!(path = %path.display(), "opening sqlite store");

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Open a private in-memory database (for testing).
    pub async fn open_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::new().filename(":memory:");

        // In-memory databases live and die with their connection, so the pool
        // holds exactly one and never recycles it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> StorageResult<()> {
        debug!("running sqlite migrations");
        sqlx::migrate!("./migrations/sqlite").run(pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Read claim candidates, dropping any row that is not claimable at `now_ms`.
async fn select_candidates<'e, E>(
    executor: E,
    now_ms: u64,
    limit: i64,
) -> StorageResult<Vec<(ClaimPriority, Message)>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows: Vec<MessageRow> = sqlx::query_as(CANDIDATES_SQL)
        .bind(to_sql_ms(now_ms)?)
        .bind(limit)
        .fetch_all(executor)
        .await?;

    let mut candidates = Vec::with_capacity(rows.len());
    for row in rows {
        let message = Message::try_from(row)?;
        if let Some(priority) = lease::claim_priority(&message, now_ms) {
            candidates.push((priority, message));
        }
    }
    candidates.sort_by(|(pa, a), (pb, b)| (pa, a.created_at, a.id).cmp(&(pb, b.created_at, b.id)));
    candidates.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    Ok(candidates)
}

/// Returns whether this call won the row.
async fn try_assign(
    conn: &mut SqliteConnection,
    id: &Uuid,
    batch: &ClaimBatch<'_>,
) -> StorageResult<bool> {
    let result = sqlx::query(ASSIGN_SQL)
        .bind(batch.consumer_id)
        .bind(to_sql_ms(batch.lease_expires_at)?)
        .bind(id.to_string())
        .bind(to_sql_ms(batch.now_ms)?)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn insert_message(&self, message: &Message) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO messages (id, payload, assigned_to, lease_expires_at, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(message.id.to_string())
        .bind(&message.payload)
        .bind(message.assigned_to())
        .bind(message.lease_expires_at().map(to_sql_ms).transpose()?)
        .bind(to_sql_ms(message.created_at)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_batch(&self, batch: &ClaimBatch<'_>) -> StorageResult<Vec<Message>> {
        let limit = i64::from(batch.limit);

        // Optimistic read, outside any write lock. Every row is re-checked by
        // the conditional update below.
        let candidates = select_candidates(&self.pool, batch.now_ms, limit).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let mut claimed = Vec::with_capacity(candidates.len());
        let mut lost = 0usize;

        for (priority, message) in candidates {
            if try_assign(&mut tx, &message.id, batch).await? {
                claimed.push((priority, message));
            } else {
                lost += 1;
            }
        }

        // Replace rows another claimer took between our read and our first
        // update. This transaction now holds the write lock, so these win.
        if lost > 0 && claimed.len() < batch.limit as usize {
            let remaining = limit - claimed.len() as i64;
            let refill = select_candidates(&mut *tx, batch.now_ms, remaining).await?;
            for (priority, message) in refill {
                if try_assign(&mut tx, &message.id, batch).await? {
                    claimed.push((priority, message));
                }
            }
            debug!(lost, refilled = claimed.len(), "replaced rows lost to a concurrent claim");
        }

        tx.commit().await?;

        claimed.sort_by(|(pa, a), (pb, b)| {
            (pa, a.created_at, a.id).cmp(&(pb, b.created_at, b.id))
        });
        Ok(claimed
            .into_iter()
            .map(|(_, mut message)| {
                message.lease = Some(Lease {
                    owner: batch.consumer_id.to_string(),
                    expires_at: batch.lease_expires_at,
                });
                message
            })
            .collect())
    }

    async fn delete_if_assigned(
        &self,
        id: &Uuid,
        consumer_id: &str,
    ) -> StorageResult<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(
            "DELETE FROM messages WHERE id = ?1 AND assigned_to = ?2 \
             RETURNING id, payload, assigned_to, lease_expires_at, created_at",
        )
        .bind(id.to_string())
        .bind(consumer_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Message::try_from).transpose()
    }

    async fn get_message(&self, id: &Uuid) -> StorageResult<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(
            "SELECT id, payload, assigned_to, lease_expires_at, created_at \
             FROM messages WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Message::try_from).transpose()
    }

    async fn stats(&self, now_ms: u64) -> StorageResult<StoreStats> {
        let (total, unclaimed, leased, expired): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(assigned_to IS NULL), 0),
                COALESCE(SUM(assigned_to IS NOT NULL AND lease_expires_at >= ?1), 0),
                COALESCE(SUM(assigned_to IS NOT NULL AND lease_expires_at < ?1), 0)
            FROM messages
            "#,
        )
        .bind(to_sql_ms(now_ms)?)
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats {
            total: from_sql_ms(total)?,
            unclaimed: from_sql_ms(unclaimed)?,
            leased: from_sql_ms(leased)?,
            expired: from_sql_ms(expired)?,
        })
    }

    async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
