pub mod broker;
pub mod clock;
pub mod error;
pub mod lease;
pub mod message;
pub mod storage;
pub mod telemetry;

pub use broker::{
    Broker, BrokerConfig, ClaimRequest, LeaseConfig, QueueStats, ServerConfig, StorageConfig,
    TelemetryConfig,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{
    AckError, ClaimError, ConfigError, EnqueueError, StorageError, StorageResult, ValidationError,
};
pub use message::{AckOutcome, ClaimedMessage, Lease, Message, MessageState, MessageView};
pub use storage::{PostgresStorage, SqliteStorage, Storage};
