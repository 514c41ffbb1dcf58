use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::debug;
use uuid::Uuid;

use crate::error::{
    ack_status_error, claim_status_error, enqueue_status_error, status_error, AckError,
    ClaimError, ConnectError, EnqueueError, InspectError, StatusError,
};

/// A message accepted by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueuedMessage {
    pub message_id: Uuid,
    pub message: String,
    /// Unix milliseconds.
    pub created_at: u64,
}

/// A message leased to this client. Acknowledge it with
/// [`LeaseholdClient::ack`] before `lease_expires_at`, or it becomes
/// claimable by others.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeasedMessage {
    pub message_id: Uuid,
    pub message: String,
    /// Unix milliseconds.
    pub lease_expires_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    Unclaimed,
    Leased,
    Expired,
}

/// Server-side view of one message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStatus {
    pub message_id: Uuid,
    pub message: String,
    pub created_at: u64,
    pub state: MessageState,
    /// Current or, once expired, last assignee.
    pub assigned_to: Option<String>,
    pub lease_expires_at: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub depth: u64,
    pub unclaimed: u64,
    pub in_flight: u64,
    pub expired: u64,
    pub as_of: u64,
}

/// Result of [`LeaseholdClient::ack`]. `NotOwned` means the message is gone
/// or leased to someone else; it is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Deleted,
    NotOwned,
}

#[derive(Serialize)]
struct EnqueueBody<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Options for connecting to a leasehold server.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub addr: String,
    pub timeout: Option<Duration>,
}

impl ConnectOptions {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Options for [`LeaseholdClient::consume`].
#[derive(Debug, Clone)]
pub struct ConsumeOptions {
    pub client_id: String,
    /// Messages claimed per request.
    pub batch_size: u32,
    /// Lease per claim. Sent in whole seconds, rounded up. `None` uses the
    /// server's default.
    pub lease: Option<Duration>,
    /// Wait between claims that come back empty or fail.
    pub poll_interval: Duration,
}

impl ConsumeOptions {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            batch_size: 1,
            lease: None,
            poll_interval: Duration::from_millis(500),
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// The lease is rounded up to whole seconds, so 500 ms leases for 1 s.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = Some(lease);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Idiomatic Rust client for the leasehold HTTP API.
///
/// Wraps enqueue, claim and ack plus the diagnostics endpoints. The client
/// is `Clone`, `Send`, and `Sync`; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct LeaseholdClient {
    http: reqwest::Client,
    base_url: String,
}

impl LeaseholdClient {
    /// Connect to a leasehold server at the given address.
    ///
    /// The address should include the scheme, e.g. `http://localhost:8080`.
    /// Fails unless the server answers its health check.
    pub async fn connect(addr: impl Into<String>) -> Result<Self, ConnectError> {
        Self::connect_with_options(ConnectOptions::new(addr)).await
    }

    /// Connect to a leasehold server with custom options.
    pub async fn connect_with_options(options: ConnectOptions) -> Result<Self, ConnectError> {
        let base_url = options.addr.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConnectError::InvalidAddress(format!(
                "{base_url:?} must start with http:// or https://"
            )));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let client = Self {
            http: builder.build()?,
            base_url,
        };

        let response = client.http.get(client.url("/healthz")).send().await?;
        if !response.status().is_success() {
            let (status, message) = error_parts(response).await;
            return Err(ConnectError::Unhealthy(status_error(status, message)));
        }
        Ok(client)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Enqueue a message. Returns the stored message with its server-assigned
    /// ID (UUIDv7).
    pub async fn enqueue(&self, payload: &str) -> Result<EnqueuedMessage, EnqueueError> {
        let response = self
            .http
            .post(self.url("/messages"))
            .json(&EnqueueBody { message: payload })
            .send()
            .await
            .map_err(StatusError::from)?;

        if !response.status().is_success() {
            let (status, message) = error_parts(response).await;
            return Err(enqueue_status_error(status, message));
        }
        Ok(response.json().await.map_err(StatusError::from)?)
    }

    /// Lease up to `count` messages to `client_id`.
    ///
    /// An empty result means nothing is claimable right now. `lease` is sent
    /// in whole seconds, rounded up so the lease is never shorter than asked;
    /// `None` uses the server's default.
    pub async fn claim(
        &self,
        client_id: &str,
        count: u32,
        lease: Option<Duration>,
    ) -> Result<Vec<LeasedMessage>, ClaimError> {
        let mut query = vec![
            ("clientId", client_id.to_string()),
            ("count", count.to_string()),
        ];
        if let Some(lease) = lease {
            query.push(("leaseSeconds", lease_seconds(lease).to_string()));
        }

        let response = self
            .http
            .get(self.url("/messages"))
            .query(&query)
            .send()
            .await
            .map_err(StatusError::from)?;

        if !response.status().is_success() {
            let (status, message) = error_parts(response).await;
            return Err(claim_status_error(status, message));
        }
        Ok(response.json().await.map_err(StatusError::from)?)
    }

    /// Acknowledge (delete) a message leased to `client_id`.
    pub async fn ack(&self, message_id: &Uuid, client_id: &str) -> Result<AckOutcome, AckError> {
        let response = self
            .http
            .delete(self.url("/messages"))
            .query(&[
                ("messageId", message_id.to_string()),
                ("clientId", client_id.to_string()),
            ])
            .send()
            .await
            .map_err(StatusError::from)?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(AckOutcome::Deleted),
            StatusCode::NOT_FOUND => Ok(AckOutcome::NotOwned),
            _ => {
                let (status, message) = error_parts(response).await;
                Err(ack_status_error(status, message))
            }
        }
    }

    /// Look up a message. `None` once it has been acknowledged.
    pub async fn inspect(&self, message_id: &Uuid) -> Result<Option<MessageStatus>, InspectError> {
        let response = self
            .http
            .get(self.url(&format!("/messages/{message_id}")))
            .send()
            .await
            .map_err(StatusError::from)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                Ok(Some(response.json().await.map_err(StatusError::from)?))
            }
            _ => {
                let (status, message) = error_parts(response).await;
                Err(status_error(status, message).into())
            }
        }
    }

    pub async fn stats(&self) -> Result<QueueStats, StatusError> {
        let response = self.http.get(self.url("/stats")).send().await?;
        if !response.status().is_success() {
            let (status, message) = error_parts(response).await;
            return Err(status_error(status, message));
        }
        Ok(response.json().await?)
    }

    /// Poll for messages as a stream.
    ///
    /// A background task claims `batch_size` messages at a time and yields
    /// them one by one, sleeping `poll_interval` whenever a claim comes back
    /// empty. Leases start at claim time, not when an item is read from the
    /// stream. Retryable failures (see [`StatusError::is_retryable`]) are
    /// yielded as `Err` items and polling continues. Any other failure, such
    /// as a rejected request or a server error, ends the stream after its
    /// error. The task stops once the stream is dropped.
    pub fn consume(
        &self,
        options: ConsumeOptions,
    ) -> impl Stream<Item = Result<LeasedMessage, StatusError>> {
        let (tx, rx) = mpsc::channel(options.batch_size.max(1) as usize);
        let client = self.clone();

        tokio::spawn(async move {
            loop {
                match client
                    .claim(&options.client_id, options.batch_size, options.lease)
                    .await
                {
                    Ok(batch) if batch.is_empty() => {
                        debug!(client_id = %options.client_id, "nothing to claim");
                    }
                    Ok(batch) => {
                        for message in batch {
                            if tx.send(Ok(message)).await.is_err() {
                                return;
                            }
                        }
                        continue;
                    }
                    Err(ClaimError::InvalidRequest(message)) => {
                        let _ = tx.send(Err(StatusError::InvalidArgument(message))).await;
                        return;
                    }
                    Err(ClaimError::Status(err)) if err.is_retryable() => {
                        debug!(client_id = %options.client_id, error = %err, "claim failed, retrying");
                        if tx.send(Err(err)).await.is_err() {
                            return;
                        }
                    }
                    Err(ClaimError::Status(err)) => {
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                }

                tokio::select! {
                    _ = tokio::time::sleep(options.poll_interval) => {}
                    _ = tx.closed() => return,
                }
            }
        });

        ReceiverStream::new(rx)
    }
}

/// Whole seconds for the `leaseSeconds` parameter. Rounds up, so a
/// sub-second lease is not sent as zero.
fn lease_seconds(lease: Duration) -> u64 {
    if lease.subsec_nanos() > 0 {
        lease.as_secs().saturating_add(1)
    } else {
        lease.as_secs()
    }
}

/// Status and message of a failed response, preferring the server's
/// `{"error": ...}` body.
async fn error_parts(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    };
    (status, message)
}
