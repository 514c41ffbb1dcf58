use super::*;

/// Fixed start instant so expiry arithmetic in assertions is readable.
pub(super) const T0: u64 = 1_700_000_000_000;

pub(super) struct TestBroker {
    pub broker: Broker,
    pub clock: Arc<ManualClock>,
    pub storage: Arc<SqliteStorage>,
}

pub(super) async fn test_setup() -> TestBroker {
    test_setup_with(LeaseConfig::default()).await
}

pub(super) async fn test_setup_with(config: LeaseConfig) -> TestBroker {
    let storage = Arc::new(SqliteStorage::open_in_memory().await.unwrap());
    broker_on(storage, config)
}

/// File-backed broker for tests that need more than one pooled connection.
pub(super) async fn test_setup_on_disk() -> (TestBroker, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(
        SqliteStorage::open(dir.path().join("broker.db"))
            .await
            .unwrap(),
    );
    (broker_on(storage, LeaseConfig::default()), dir)
}

/// Helper: a broker sharing an existing store and clock, as a second
/// process would.
pub(super) fn broker_on(storage: Arc<SqliteStorage>, config: LeaseConfig) -> TestBroker {
    let clock = Arc::new(ManualClock::new(T0));
    let broker = Broker::with_clock(config, storage.clone(), clock.clone());
    TestBroker {
        broker,
        clock,
        storage,
    }
}

pub(super) async fn enqueue_all(broker: &Broker, payloads: &[&str]) -> Vec<Uuid> {
    let mut ids = Vec::with_capacity(payloads.len());
    for payload in payloads {
        ids.push(broker.enqueue(*payload).await.unwrap().id);
    }
    ids
}

pub(super) async fn claim(
    broker: &Broker,
    consumer: &str,
    count: u32,
    lease: Duration,
) -> Vec<ClaimedMessage> {
    broker
        .claim(ClaimRequest::new(consumer).count(count).lease(lease))
        .await
        .unwrap()
}

pub(super) fn payloads(claimed: &[ClaimedMessage]) -> Vec<&str> {
    claimed.iter().map(|m| m.payload.as_str()).collect()
}
