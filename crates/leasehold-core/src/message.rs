use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;

/// A time-boxed claim on a message. Owner and expiry are stored together so
/// a message can never carry one without the other.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Lease {
    pub owner: String,
    /// Unix milliseconds after which the lease no longer confers ownership.
    pub expires_at: u64,
}

/// Core message domain type. This is the row as persisted by the storage
/// layer, distinct from the JSON shapes used on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub payload: String,
    /// `None` while unclaimed.
    pub lease: Option<Lease>,
    /// Unix milliseconds. Diagnostics and ordering tie-break only.
    pub created_at: u64,
}

impl Message {
    /// Generate a new UUIDv7 message ID. v7 ids sort by creation time, which
    /// keeps the `(created_at, id)` tie-break close to insertion order.
    pub fn new_id() -> Uuid {
        Uuid::now_v7()
    }

    /// A fresh, unclaimed message.
    pub fn new(payload: String, created_at: u64) -> Self {
        Self {
            id: Self::new_id(),
            payload,
            lease: None,
            created_at,
        }
    }

    pub fn assigned_to(&self) -> Option<&str> {
        self.lease.as_ref().map(|l| l.owner.as_str())
    }

    pub fn lease_expires_at(&self) -> Option<u64> {
        self.lease.as_ref().map(|l| l.expires_at)
    }
}

/// A message handed to a consumer by a claim. Unlike [`Message`], the lease
/// is always present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaimedMessage {
    pub id: Uuid,
    pub payload: String,
    pub created_at: u64,
    pub lease: Lease,
}

impl TryFrom<Message> for ClaimedMessage {
    type Error = StorageError;

    fn try_from(message: Message) -> Result<Self, Self::Error> {
        let lease = message.lease.ok_or_else(|| {
            StorageError::Corrupt(format!("claimed message {} has no lease", message.id))
        })?;
        Ok(Self {
            id: message.id,
            payload: message.payload,
            created_at: message.created_at,
            lease,
        })
    }
}

/// Outcome of an acknowledgement. `NotOwned` is a normal result, not a fault:
/// the message is gone, or another consumer holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckOutcome {
    Deleted,
    NotOwned,
}

/// Where a message currently sits in its lifecycle, as seen at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MessageState {
    Unclaimed,
    Leased { owner: String, expires_at: u64 },
    /// The lease lapsed; any consumer may re-claim. `last_owner` can still
    /// acknowledge until that happens.
    Expired { last_owner: String, expired_at: u64 },
}

/// Diagnostic view of a stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: Uuid,
    pub payload: String,
    pub created_at: u64,
    pub state: MessageState,
}
