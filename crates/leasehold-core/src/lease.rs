//! Pure lease computations.
//!
//! Everything here is deterministic and side-effect free: time is passed in
//! explicitly and nothing touches storage. The storage backends express the
//! same predicates in SQL; these functions are the reference they are tested
//! against, and what the broker uses when it reasons about rows it already
//! holds.

use std::time::Duration;

use crate::message::{Message, MessageState};

/// Why a message is eligible for a claim. Ordering matters: unclaimed
/// messages are taken before lapsed ones when both compete for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClaimPriority {
    Unclaimed,
    Expired,
}

/// Classify a message for claiming at `now_ms`.
///
/// Returns `None` while another consumer's lease is still running. A lease
/// expiring exactly at `now_ms` is still valid (ownership holds through
/// `expires_at` inclusive).
#[inline]
pub fn claim_priority(message: &Message, now_ms: u64) -> Option<ClaimPriority> {
    match &message.lease {
        None => Some(ClaimPriority::Unclaimed),
        Some(lease) if lease.expires_at < now_ms => Some(ClaimPriority::Expired),
        Some(_) => None,
    }
}

/// A message is claimable when unassigned or its lease has lapsed.
#[inline]
pub fn is_claimable(message: &Message, now_ms: u64) -> bool {
    claim_priority(message, now_ms).is_some()
}

/// Lease deadline for a claim made at `now_ms`. Saturates instead of
/// overflowing.
#[inline]
pub fn compute_expiry(now_ms: u64, lease: Duration) -> u64 {
    let lease_ms = u64::try_from(lease.as_millis()).unwrap_or(u64::MAX);
    now_ms.saturating_add(lease_ms)
}

/// `consumer_id` owns the message only while its lease is unexpired.
#[inline]
pub fn is_owned(message: &Message, consumer_id: &str, now_ms: u64) -> bool {
    message
        .lease
        .as_ref()
        .is_some_and(|l| l.owner == consumer_id && l.expires_at >= now_ms)
}

/// Lifecycle state of a message at `now_ms`.
pub fn state_at(message: &Message, now_ms: u64) -> MessageState {
    match &message.lease {
        None => MessageState::Unclaimed,
        Some(lease) if is_owned(message, &lease.owner, now_ms) => MessageState::Leased {
            owner: lease.owner.clone(),
            expires_at: lease.expires_at,
        },
        Some(lease) => MessageState::Expired {
            last_owner: lease.owner.clone(),
            expired_at: lease.expires_at,
        },
    }
}
