mod helpers;

use std::collections::HashSet;
use std::time::Duration;

use leasehold_sdk::AckOutcome;

/// Enqueue → claim → ack through the real server binary.
#[tokio::test]
async fn e2e_enqueue_claim_ack() {
    let server = helpers::TestServer::start();
    let client = helpers::sdk_client(server.addr()).await;

    let enqueued = client.enqueue("order-42").await.unwrap();

    let claimed = client
        .claim("worker", 1, Some(Duration::from_secs(30)))
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].message_id, enqueued.message_id);
    assert_eq!(claimed[0].message, "order-42");

    assert_eq!(
        client.ack(&enqueued.message_id, "worker").await.unwrap(),
        AckOutcome::Deleted
    );

    let stats = client.stats().await.unwrap();
    assert_eq!(stats.depth, 0);
    assert!(client.claim("worker", 1, None).await.unwrap().is_empty());
}

/// Competing consumers with their own connections never share a message.
#[tokio::test]
async fn e2e_competing_consumers_are_disjoint() {
    let server = helpers::TestServer::start();
    let producer = helpers::sdk_client(server.addr()).await;

    let mut enqueued = HashSet::new();
    for i in 0..40 {
        enqueued.insert(producer.enqueue(&format!("job-{i}")).await.unwrap().message_id);
    }

    let mut handles = Vec::new();
    for worker in 0..4 {
        let client = helpers::sdk_client(server.addr()).await;
        handles.push(tokio::spawn(async move {
            let client_id = format!("worker-{worker}");
            let mut seen = Vec::new();
            loop {
                let batch = client
                    .claim(&client_id, 3, Some(Duration::from_secs(60)))
                    .await
                    .unwrap();
                if batch.is_empty() {
                    break;
                }
                for message in batch {
                    let outcome = client.ack(&message.message_id, &client_id).await.unwrap();
                    assert_eq!(outcome, AckOutcome::Deleted);
                    seen.push(message.message_id);
                }
            }
            seen
        }));
    }

    let mut processed = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            assert!(processed.insert(id), "message {id} delivered twice");
        }
    }
    assert_eq!(processed, enqueued);
}
