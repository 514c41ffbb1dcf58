use reqwest::StatusCode;

/// Common HTTP errors shared across all operations.
///
/// Analogous to `StorageError` in leasehold-core: the "infra" error that every
/// per-operation type embeds via `#[from]`.
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("server unavailable: {0}")]
    Unavailable(String),

    #[error("internal server error: {0}")]
    Internal(String),

    #[error("unexpected HTTP status {status}: {message}")]
    Http { status: StatusCode, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl StatusError {
    /// Whether the same request may succeed if sent again.
    pub fn is_retryable(&self) -> bool {
        match self {
            StatusError::Unavailable(_) => true,
            StatusError::Transport(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

// --- Per-operation error types ---

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("connection failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server not healthy: {0}")]
    Unhealthy(StatusError),
}

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("payload rejected: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Status(#[from] StatusError),
}

#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    #[error("claim rejected: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Status(#[from] StatusError),
}

#[derive(Debug, thiserror::Error)]
pub enum AckError {
    #[error("ack rejected: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Status(#[from] StatusError),
}

#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error(transparent)]
    Status(#[from] StatusError),
}

// --- Mapping helpers ---

pub(crate) fn status_error(status: StatusCode, message: String) -> StatusError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            StatusError::InvalidArgument(message)
        }
        StatusCode::SERVICE_UNAVAILABLE => StatusError::Unavailable(message),
        StatusCode::INTERNAL_SERVER_ERROR => StatusError::Internal(message),
        status => StatusError::Http { status, message },
    }
}

pub(crate) fn enqueue_status_error(status: StatusCode, message: String) -> EnqueueError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            EnqueueError::InvalidPayload(message)
        }
        _ => EnqueueError::Status(status_error(status, message)),
    }
}

pub(crate) fn claim_status_error(status: StatusCode, message: String) -> ClaimError {
    match status {
        StatusCode::BAD_REQUEST => ClaimError::InvalidRequest(message),
        _ => ClaimError::Status(status_error(status, message)),
    }
}

pub(crate) fn ack_status_error(status: StatusCode, message: String) -> AckError {
    match status {
        StatusCode::BAD_REQUEST => AckError::InvalidRequest(message),
        _ => AckError::Status(status_error(status, message)),
    }
}
