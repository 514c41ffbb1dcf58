use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use leasehold_core::{Broker, LeaseConfig, SqliteStorage};
use leasehold_sdk::{
    AckOutcome, ClaimError, ConnectError, ConsumeOptions, EnqueueError, LeaseholdClient,
    MessageState, StatusError,
};
use tokio::sync::oneshot;
use tokio_stream::StreamExt;

/// An in-process server on a free port, backed by in-memory SQLite.
struct TestServer {
    addr: String,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let storage = Arc::new(SqliteStorage::open_in_memory().await.unwrap());
        let broker = Arc::new(Broker::new(LeaseConfig::default(), storage));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            leasehold_server::serve(listener, broker, async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
        });

        Self {
            addr,
            shutdown: Some(shutdown_tx),
        }
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[tokio::test]
async fn enqueue_claim_ack_round_trip() {
    let server = TestServer::start().await;
    let client = LeaseholdClient::connect(&server.addr).await.unwrap();

    let enqueued = client.enqueue("hello").await.unwrap();
    assert_eq!(enqueued.message, "hello");

    let claimed = client
        .claim("worker-1", 5, Some(Duration::from_secs(30)))
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].message_id, enqueued.message_id);
    assert_eq!(claimed[0].message, "hello");

    let status = client.inspect(&enqueued.message_id).await.unwrap().unwrap();
    assert_eq!(status.state, MessageState::Leased);
    assert_eq!(status.assigned_to.as_deref(), Some("worker-1"));
    assert_eq!(status.lease_expires_at, Some(claimed[0].lease_expires_at));

    assert_eq!(
        client.ack(&enqueued.message_id, "worker-2").await.unwrap(),
        AckOutcome::NotOwned
    );
    assert_eq!(
        client.ack(&enqueued.message_id, "worker-1").await.unwrap(),
        AckOutcome::Deleted
    );
    assert_eq!(
        client.ack(&enqueued.message_id, "worker-1").await.unwrap(),
        AckOutcome::NotOwned
    );
    assert!(client.inspect(&enqueued.message_id).await.unwrap().is_none());

    server.stop().await;
}

#[tokio::test]
async fn validation_errors_are_operation_specific() {
    let server = TestServer::start().await;
    let client = LeaseholdClient::connect(&server.addr).await.unwrap();

    let err = client.enqueue("   ").await.unwrap_err();
    assert!(matches!(err, EnqueueError::InvalidPayload(_)), "got {err:?}");

    let err = client.claim("worker", 0, None).await.unwrap_err();
    assert!(matches!(err, ClaimError::InvalidRequest(_)), "got {err:?}");

    server.stop().await;
}

#[tokio::test]
async fn stats_reflect_queue() {
    let server = TestServer::start().await;
    let client = LeaseholdClient::connect(&server.addr).await.unwrap();

    for i in 0..3 {
        client.enqueue(&format!("m{i}")).await.unwrap();
    }
    client.claim("worker", 1, None).await.unwrap();

    let stats = client.stats().await.unwrap();
    assert_eq!(stats.depth, 3);
    assert_eq!(stats.unclaimed, 2);
    assert_eq!(stats.in_flight, 1);

    server.stop().await;
}

#[tokio::test]
async fn consume_streams_messages_as_they_arrive() {
    let server = TestServer::start().await;
    let client = LeaseholdClient::connect(&server.addr).await.unwrap();

    let stream = client.consume(
        ConsumeOptions::new("streamer")
            .with_batch_size(2)
            .with_poll_interval(Duration::from_millis(20)),
    );
    tokio::pin!(stream);

    // Enqueued after the stream starts polling.
    tokio::time::sleep(Duration::from_millis(50)).await;
    for payload in ["a", "b", "c"] {
        client.enqueue(payload).await.unwrap();
    }

    let mut received = Vec::new();
    while received.len() < 3 {
        let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .expect("stream error");
        assert_eq!(
            client.ack(&message.message_id, "streamer").await.unwrap(),
            AckOutcome::Deleted
        );
        received.push(message.message);
    }
    received.sort();
    assert_eq!(received, vec!["a", "b", "c"]);

    server.stop().await;
}

#[tokio::test]
async fn consume_ends_on_rejected_request() {
    let server = TestServer::start().await;
    let client = LeaseholdClient::connect(&server.addr).await.unwrap();

    let stream = client.consume(ConsumeOptions::new("streamer").with_batch_size(0));
    tokio::pin!(stream);

    let first = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .unwrap()
        .unwrap();
    assert!(first.is_err());
    assert!(stream.next().await.is_none());

    server.stop().await;
}

#[tokio::test]
async fn sub_second_lease_rounds_up_to_one_second() {
    let server = TestServer::start().await;
    let client = LeaseholdClient::connect(&server.addr).await.unwrap();

    let enqueued = client.enqueue("short").await.unwrap();
    let claimed = client
        .claim("worker", 1, Some(Duration::from_millis(500)))
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);

    let lease_ms = claimed[0].lease_expires_at - enqueued.created_at;
    assert!(
        (1_000..6_000).contains(&lease_ms),
        "lease of {lease_ms}ms should be one second plus request time"
    );

    server.stop().await;
}

/// A server that is healthy but answers every claim with `status`.
async fn failing_claim_server(status: StatusCode) -> String {
    let app = Router::new()
        .route("/healthz", get(|| async { "{\"status\":\"ok\"}" }))
        .route(
            "/messages",
            get(move || async move { (status, "{\"error\":\"claim failed\"}") }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn consume_ends_on_server_error() {
    let addr = failing_claim_server(StatusCode::INTERNAL_SERVER_ERROR).await;
    let client = LeaseholdClient::connect(&addr).await.unwrap();

    let stream = client.consume(
        ConsumeOptions::new("streamer").with_poll_interval(Duration::from_millis(10)),
    );
    tokio::pin!(stream);

    let first = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first, Err(StatusError::Internal(_))), "got {first:?}");

    let end = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .unwrap();
    assert!(end.is_none());
}

#[tokio::test]
async fn consume_keeps_polling_while_unavailable() {
    let addr = failing_claim_server(StatusCode::SERVICE_UNAVAILABLE).await;
    let client = LeaseholdClient::connect(&addr).await.unwrap();

    let stream = client.consume(
        ConsumeOptions::new("streamer").with_poll_interval(Duration::from_millis(10)),
    );
    tokio::pin!(stream);

    for _ in 0..3 {
        let item = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .expect("stream stays open");
        assert!(matches!(item, Err(StatusError::Unavailable(_))), "got {item:?}");
    }
}

#[tokio::test]
async fn connect_rejects_bad_address() {
    let err = LeaseholdClient::connect("localhost:8080").await.unwrap_err();
    assert!(matches!(err, ConnectError::InvalidAddress(_)), "got {err:?}");
}

#[tokio::test]
async fn connect_fails_when_nothing_listens() {
    // Bind and drop to get a port that is very likely closed.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let err = LeaseholdClient::connect(format!("http://127.0.0.1:{port}"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectError::Transport(_)), "got {err:?}");
}
