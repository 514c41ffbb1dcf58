use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StorageResult;
use crate::message::Message;

/// One lock-and-claim request against the store.
#[derive(Debug, Clone, Copy)]
pub struct ClaimBatch<'a> {
    pub consumer_id: &'a str,
    /// Upper bound on rows to claim. Always at least 1.
    pub limit: u32,
    /// Rows whose lease expires strictly before this instant are reclaimable.
    pub now_ms: u64,
    /// Expiry written to every claimed row.
    pub lease_expires_at: u64,
}

/// Row counts at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total: u64,
    pub unclaimed: u64,
    /// Assigned with a lease that has not yet lapsed.
    pub leased: u64,
    /// Assigned with a lapsed lease; claimable again.
    pub expired: u64,
}

/// Storage trait for all persistence operations. Implementations must be
/// thread-safe; every mutating call is one self-contained transaction.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert a new, unclaimed message.
    async fn insert_message(&self, message: &Message) -> StorageResult<()>;

    /// Atomically select up to `batch.limit` claimable rows and assign them to
    /// `batch.consumer_id` until `batch.lease_expires_at`.
    ///
    /// Rows held by a concurrent, uncommitted claim are never returned. Results
    /// come back in claim priority order (unclaimed first, then expired; oldest
    /// first within each) and already carry the new lease. On error no row is
    /// modified.
    async fn claim_batch(&self, batch: &ClaimBatch<'_>) -> StorageResult<Vec<Message>>;

    /// Delete the message only if it is assigned to `consumer_id`, returning
    /// the deleted row. Lease expiry is not re-checked.
    async fn delete_if_assigned(&self, id: &Uuid, consumer_id: &str)
        -> StorageResult<Option<Message>>;

    /// Read a message by id. Diagnostics only; claim and ack never read first.
    async fn get_message(&self, id: &Uuid) -> StorageResult<Option<Message>>;

    /// Row counts, classifying leases against `now_ms`.
    async fn stats(&self, now_ms: u64) -> StorageResult<StoreStats>;

    /// Round-trip to the store.
    async fn health_check(&self) -> StorageResult<()>;
}
