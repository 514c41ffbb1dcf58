mod client;
mod error;

pub use client::{
    AckOutcome, ConnectOptions, ConsumeOptions, EnqueuedMessage, LeaseholdClient, LeasedMessage,
    MessageState, MessageStatus, QueueStats,
};
pub use error::{
    AckError, ClaimError, ConnectError, EnqueueError, InspectError, StatusError,
};
