use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};
use uuid::Uuid;

use crate::broker::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::message::Message;
use crate::storage::traits::{ClaimBatch, Storage, StoreStats};
use crate::storage::{from_sql_ms, lease_from_columns, to_sql_ms};

const LOCK_UNASSIGNED_SQL: &str = r#"
SELECT id FROM messages
WHERE assigned_to IS NULL
ORDER BY created_at, id
LIMIT $1
FOR UPDATE SKIP LOCKED
"#;

const LOCK_EXPIRED_SQL: &str = r#"
SELECT id FROM messages
WHERE assigned_to IS NOT NULL AND lease_expires_at < $1
ORDER BY created_at, id
LIMIT $2
FOR UPDATE SKIP LOCKED
"#;

const ASSIGN_LOCKED_SQL: &str = r#"
UPDATE messages
SET assigned_to = $1, lease_expires_at = $2
WHERE id = ANY($3)
RETURNING id, payload, assigned_to, lease_expires_at, created_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    payload: String,
    assigned_to: Option<String>,
    lease_expires_at: Option<i64>,
    created_at: i64,
}

impl TryFrom<MessageRow> for Message {
    type Error = StorageError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: row.id,
            payload: row.payload,
            lease: lease_from_columns(row.assigned_to, row.lease_expires_at)?,
            created_at: from_sql_ms(row.created_at)?,
        })
    }
}

/// PostgreSQL-backed storage.
///
/// Claims lock candidate rows with `FOR UPDATE SKIP LOCKED`, so concurrent
/// claimers never wait on, or return, each other's rows. Selection, assignment
/// and commit happen in one transaction.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub async fn connect(url: &str, config: &StorageConfig) -> StorageResult<Self> {
        info!("connecting to postgres store");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_millis(config.busy_timeout_ms))
            .connect(url)
            .await?;

        debug!("running postgres migrations");
        sqlx::migrate!("./migrations/postgres").run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn insert_message(&self, message: &Message) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO messages (id, payload, assigned_to, lease_expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(message.id)
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
        let now = to_sql_ms(batch.now_ms)?;

        let mut tx = self.pool.begin().await?;

        let mut ids: Vec<Uuid> = sqlx::query_scalar(LOCK_UNASSIGNED_SQL)
            .bind(limit)
            .fetch_all(&mut *tx)
            .await?;

        if (ids.len() as i64) < limit {
            let expired: Vec<Uuid> = sqlx::query_scalar(LOCK_EXPIRED_SQL)
                .bind(now)
                .bind(limit - ids.len() as i64)
                .fetch_all(&mut *tx)
                .await?;
            ids.extend(expired);
        }

        if ids.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let rows: Vec<MessageRow> = sqlx::query_as(ASSIGN_LOCKED_SQL)
            .bind(batch.consumer_id)
            .bind(to_sql_ms(batch.lease_expires_at)?)
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        // RETURNING order is unspecified; restore selection order.
        let position: HashMap<Uuid, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let mut claimed = rows
            .into_iter()
            .map(Message::try_from)
            .collect::<StorageResult<Vec<_>>>()?;
        claimed.sort_by_key(|m| position.get(&m.id).copied().unwrap_or(usize::MAX));
        Ok(claimed)
    }

    async fn delete_if_assigned(
        &self,
        id: &Uuid,
        consumer_id: &str,
    ) -> StorageResult<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(
            "DELETE FROM messages WHERE id = $1 AND assigned_to = $2 \
             RETURNING id, payload, assigned_to, lease_expires_at, created_at",
        )
        .bind(id)
        .bind(consumer_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Message::try_from).transpose()
    }

    async fn get_message(&self, id: &Uuid) -> StorageResult<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(
            "SELECT id, payload, assigned_to, lease_expires_at, created_at \
             FROM messages WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Message::try_from).transpose()
    }

    async fn stats(&self, now_ms: u64) -> StorageResult<StoreStats> {
        let (total, unclaimed, leased, expired): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE assigned_to IS NULL),
                COUNT(*) FILTER (WHERE assigned_to IS NOT NULL AND lease_expires_at >= $1),
                COUNT(*) FILTER (WHERE assigned_to IS NOT NULL AND lease_expires_at < $1)
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
