use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use leasehold_core::{AckOutcome, Broker, ClaimRequest, MessageState, QueueStats};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ApiError, IntoApiError};

type BrokerState = State<Arc<Broker>>;

/// Build the HTTP routes over a shared broker.
pub fn router(broker: Arc<Broker>) -> Router {
    Router::new()
        .route(
            "/messages",
            get(claim_messages)
                .post(enqueue_message)
                .delete(acknowledge_message),
        )
        .route("/messages/{id}", get(inspect_message))
        .route("/stats", get(queue_stats))
        .route("/healthz", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(broker)
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
pub struct EnqueueBody {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueuedMessage {
    pub message_id: Uuid,
    pub message: String,
    pub created_at: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimQuery {
    pub client_id: String,
    pub count: Option<u32>,
    #[serde(alias = "leaseExpiredAtInSeconds")]
    pub lease_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeasedMessage {
    pub message_id: Uuid,
    pub message: String,
    pub lease_expires_at: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckQuery {
    pub message_id: Uuid,
    pub client_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStatus {
    pub message_id: Uuid,
    pub message: String,
    pub created_at: u64,
    /// `unclaimed`, `leased` or `expired`.
    pub state: &'static str,
    pub assigned_to: Option<String>,
    pub lease_expires_at: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsBody {
    pub depth: u64,
    pub unclaimed: u64,
    pub in_flight: u64,
    pub expired: u64,
    pub as_of: u64,
}

impl From<QueueStats> for StatsBody {
    fn from(stats: QueueStats) -> Self {
        Self {
            depth: stats.depth,
            unclaimed: stats.unclaimed,
            in_flight: stats.in_flight,
            expired: stats.expired,
            as_of: stats.as_of,
        }
    }
}

// --- Handlers ---

async fn enqueue_message(
    State(broker): BrokerState,
    body: Result<Json<EnqueueBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body?;
    let message = broker
        .enqueue(body.message)
        .await
        .map_err(IntoApiError::into_api_error)?;

    Ok((
        StatusCode::CREATED,
        Json(EnqueuedMessage {
            message_id: message.id,
            message: message.payload,
            created_at: message.created_at,
        }),
    ))
}

async fn claim_messages(
    State(broker): BrokerState,
    query: Result<Query<ClaimQuery>, QueryRejection>,
) -> Result<Json<Vec<LeasedMessage>>, ApiError> {
    let Query(query) = query?;

    let mut request = ClaimRequest::new(query.client_id);
    if let Some(count) = query.count {
        request = request.count(count);
    }
    if let Some(secs) = query.lease_seconds {
        request = request.lease(Duration::from_secs(secs));
    }

    let claimed = broker
        .claim(request)
        .await
        .map_err(IntoApiError::into_api_error)?;

    Ok(Json(
        claimed
            .into_iter()
            .map(|m| LeasedMessage {
                message_id: m.id,
                message: m.payload,
                lease_expires_at: m.lease.expires_at,
            })
            .collect(),
    ))
}

/// 204 when the message was deleted, 404 when the caller is not its
/// assignee (or it is already gone).
async fn acknowledge_message(
    State(broker): BrokerState,
    query: Result<Query<AckQuery>, QueryRejection>,
) -> Result<StatusCode, ApiError> {
    let Query(query) = query?;

    match broker
        .acknowledge(&query.message_id, &query.client_id)
        .await
        .map_err(IntoApiError::into_api_error)?
    {
        AckOutcome::Deleted => Ok(StatusCode::NO_CONTENT),
        AckOutcome::NotOwned => {
            debug!(message_id = %query.message_id, client_id = %query.client_id, "ack not owned");
            Err(ApiError::not_found(format!(
                "message {} is not assigned to {}",
                query.message_id, query.client_id
            )))
        }
    }
}

async fn inspect_message(
    State(broker): BrokerState,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<MessageStatus>, ApiError> {
    let Path(id) = id?;
    let view = broker
        .inspect(&id)
        .await
        .map_err(IntoApiError::into_api_error)?
        .ok_or_else(|| ApiError::not_found(format!("message {id} not found")))?;

    let (state, assigned_to, lease_expires_at) = match view.state {
        MessageState::Unclaimed => ("unclaimed", None, None),
        MessageState::Leased { owner, expires_at } => ("leased", Some(owner), Some(expires_at)),
        MessageState::Expired {
            last_owner,
            expired_at,
        } => ("expired", Some(last_owner), Some(expired_at)),
    };

    Ok(Json(MessageStatus {
        message_id: view.id,
        message: view.payload,
        created_at: view.created_at,
        state,
        assigned_to,
        lease_expires_at,
    }))
}

async fn queue_stats(State(broker): BrokerState) -> Result<Json<StatsBody>, ApiError> {
    let stats = broker
        .stats()
        .await
        .map_err(IntoApiError::into_api_error)?;
    Ok(Json(stats.into()))
}

async fn health(State(broker): BrokerState) -> Result<Json<serde_json::Value>, ApiError> {
    broker
        .health_check()
        .await
        .map_err(IntoApiError::into_api_error)?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
