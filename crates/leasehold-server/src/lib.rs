//! HTTP front end for the leasehold queue.
//!
//! The handlers are thin: they parse the request, call into
//! [`leasehold_core::Broker`] and shape the JSON response. All queue
//! semantics live in the core crate.

pub mod error;
pub mod service;

use std::future::Future;
use std::sync::Arc;

use leasehold_core::Broker;
use tokio::net::TcpListener;

pub use error::{ApiError, IntoApiError};
pub use service::router;

/// Serve the API on `listener` until `shutdown` resolves, then drain
/// in-flight requests.
pub async fn serve<F>(listener: TcpListener, broker: Arc<Broker>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(broker))
        .with_graceful_shutdown(shutdown)
        .await
}
