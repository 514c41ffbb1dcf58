pub mod config;
pub mod metrics;
pub mod stats;
mod validate;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::{AckError, ClaimError, EnqueueError, StorageResult};
use crate::lease;
use crate::message::{AckOutcome, ClaimedMessage, Message, MessageView};
use crate::storage::{ClaimBatch, Storage};

pub use config::{BrokerConfig, LeaseConfig, ServerConfig, StorageConfig, TelemetryConfig};
pub use metrics::Metrics;
pub use stats::QueueStats;
pub use validate::MAX_CONSUMER_ID_BYTES;

/// Parameters of one claim. Built with [`ClaimRequest::new`] and refined with
/// the chained setters; unset fields take the broker's defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    pub consumer_id: String,
    pub count: u32,
    pub lease: Option<Duration>,
}

impl ClaimRequest {
    pub fn new(consumer_id: impl Into<String>) -> Self {
        Self {
            consumer_id: consumer_id.into(),
            count: 1,
            lease: None,
        }
    }

    pub fn count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn lease(mut self, lease: Duration) -> Self {
        self.lease = Some(lease);
        self
    }
}

/// Entry point to the queue: producer, claim engine and acknowledger over a
/// shared store.
///
/// The broker holds no coordination state of its own. Every operation is one
/// storage transaction, so any number of brokers (in one process or many) can
/// share a store, and a `Broker` can be shared across tasks behind an `Arc`.
pub struct Broker {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    config: LeaseConfig,
    metrics: Metrics,
}

impl Broker {
    pub fn new(config: LeaseConfig, storage: Arc<dyn Storage>) -> Self {
        Self::with_clock(config, storage, Arc::new(SystemClock))
    }

    pub fn with_clock(config: LeaseConfig, storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        info!(
            default_lease_ms = config.default_lease_ms,
            max_claim_count = config.max_claim_count,
            "broker started"
        );
        Self {
            storage,
            clock,
            config,
            metrics: Metrics::new(),
        }
    }

    /// Replace the instruments, e.g. with ones bound to a test exporter.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn lease_config(&self) -> &LeaseConfig {
        &self.config
    }

    /// Persist a new, unclaimed message.
    #[tracing::instrument(skip_all)]
    pub async fn enqueue(&self, payload: impl Into<String>) -> Result<Message, EnqueueError> {
        let payload = payload.into();
        validate::payload(&payload, self.config.max_payload_bytes)?;

        let message = Message::new(payload, self.clock.now_ms());
        self.storage.insert_message(&message).await?;

        self.metrics.record_enqueue();
        debug!(message_id = %message.id, bytes = message.payload.len(), "message enqueued");
        Ok(message)
    }

    /// Lease up to `request.count` claimable messages to `request.consumer_id`.
    ///
    /// Unclaimed messages are taken before ones whose lease has lapsed, oldest
    /// first within each group. Fewer than `count` (possibly none) come back
    /// when fewer are claimable; an empty result is not an error. Concurrent
    /// claims never return the same message while its new lease runs.
    #[tracing::instrument(skip_all, fields(consumer_id = %request.consumer_id, count = request.count))]
    pub async fn claim(&self, request: ClaimRequest) -> Result<Vec<ClaimedMessage>, ClaimError> {
        validate::consumer_id(&request.consumer_id)?;
        validate::count(request.count, self.config.max_claim_count)?;
        let lease_duration = request.lease.unwrap_or_else(|| self.config.default_lease());
        validate::lease(lease_duration, self.config.max_lease_ms)?;

        let now = self.clock.now_ms();
        let batch = ClaimBatch {
            consumer_id: &request.consumer_id,
            limit: request.count,
            now_ms: now,
            lease_expires_at: lease::compute_expiry(now, lease_duration),
        };
        let claimed = self.storage.claim_batch(&batch).await?;
        debug_assert!(claimed.len() <= request.count as usize);
        debug_assert!(claimed
            .iter()
            .all(|m| lease::is_owned(m, &request.consumer_id, now)));

        debug!(
            claimed = claimed.len(),
            lease_expires_at = batch.lease_expires_at,
            "claim batch committed"
        );
        self.metrics.record_claim(claimed.len() as u64);

        claimed
            .into_iter()
            .map(ClaimedMessage::try_from)
            .collect::<StorageResult<Vec<_>>>()
            .map_err(ClaimError::from)
    }

    /// Delete the message if `consumer_id` is its current assignee.
    ///
    /// Expiry is not re-checked: an acknowledgement that arrives after the
    /// lease lapsed, but before anyone re-claimed the message, still deletes
    /// it. A missing message, or one assigned to someone else, yields
    /// [`AckOutcome::NotOwned`], so repeating an acknowledgement is harmless.
    #[tracing::instrument(skip_all, fields(message_id = %id, consumer_id = %consumer_id))]
    pub async fn acknowledge(&self, id: &Uuid, consumer_id: &str) -> Result<AckOutcome, AckError> {
        validate::consumer_id(consumer_id)?;

        match self.storage.delete_if_assigned(id, consumer_id).await? {
            Some(deleted) => {
                let late = !lease::is_owned(&deleted, consumer_id, self.clock.now_ms());
                if late {
                    warn!(
                        lease_expires_at = deleted.lease_expires_at(),
                        "message acknowledged after its lease expired"
                    );
                }
                self.metrics.record_ack(late);
                debug!("message acknowledged");
                Ok(AckOutcome::Deleted)
            }
            None => {
                self.metrics.record_ack_not_owned();
                debug!("acknowledgement rejected, not owned");
                Ok(AckOutcome::NotOwned)
            }
        }
    }

    /// Current state of a message, `None` once acknowledged (or never
    /// created).
    #[tracing::instrument(skip_all, fields(message_id = %id))]
    pub async fn inspect(&self, id: &Uuid) -> StorageResult<Option<MessageView>> {
        let now = self.clock.now_ms();
        Ok(self
            .storage
            .get_message(id)
            .await?
            .map(|message| MessageView {
                state: lease::state_at(&message, now),
                id: message.id,
                payload: message.payload,
                created_at: message.created_at,
            }))
    }

    /// Queue counts at this instant. Also refreshes the depth and lease gauges.
    #[tracing::instrument(skip_all)]
    pub async fn stats(&self) -> StorageResult<QueueStats> {
        let now = self.clock.now_ms();
        let stats = QueueStats::from_store(self.storage.stats(now).await?, now);
        self.metrics.set_queue_depth(stats.depth);
        self.metrics.set_leases_active(stats.in_flight);
        Ok(stats)
    }

    pub async fn health_check(&self) -> StorageResult<()> {
        self.storage.health_check().await
    }
}
