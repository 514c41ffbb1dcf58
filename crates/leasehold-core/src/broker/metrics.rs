use opentelemetry::metrics::{Counter, Gauge, Meter};

/// Core OTel metrics for the broker. Created once with the broker and used to
/// record counters/gauges on each operation.
pub struct Metrics {
    pub messages_enqueued: Counter<u64>,
    pub messages_claimed: Counter<u64>,
    pub claims_empty: Counter<u64>,
    pub messages_acked: Counter<u64>,
    pub acks_not_owned: Counter<u64>,
    pub acks_late: Counter<u64>,
    pub queue_depth: Gauge<u64>,
    pub leases_active: Gauge<u64>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create metrics from the global meter provider. If no meter provider
    /// is configured, the instruments are no-op.
    pub fn new() -> Self {
        let meter = opentelemetry::global::meter("leasehold");
        Self::from_meter(&meter)
    }

    /// Create metrics from a specific meter (used in tests with in-memory exporter).
    pub fn from_meter(meter: &Meter) -> Self {
        Self {
            messages_enqueued: meter
                .u64_counter("leasehold.messages.enqueued")
                .with_description("Total messages enqueued")
                .build(),
            messages_claimed: meter
                .u64_counter("leasehold.messages.claimed")
                .with_description("Total messages leased to consumers")
                .build(),
            claims_empty: meter
                .u64_counter("leasehold.claims.empty")
                .with_description("Claims that found nothing claimable")
                .build(),
            messages_acked: meter
                .u64_counter("leasehold.messages.acked")
                .with_description("Total messages acknowledged and deleted")
                .build(),
            acks_not_owned: meter
                .u64_counter("leasehold.acks.not_owned")
                .with_description("Acknowledgements rejected because the caller was not the assignee")
                .build(),
            acks_late: meter
                .u64_counter("leasehold.acks.late")
                .with_description("Acknowledgements accepted after the lease had lapsed")
                .build(),
            queue_depth: meter
                .u64_gauge("leasehold.queue.depth")
                .with_description("Messages not yet acknowledged")
                .build(),
            leases_active: meter
                .u64_gauge("leasehold.leases.active")
                .with_description("Messages under a running lease")
                .build(),
        }
    }

    pub fn record_enqueue(&self) {
        self.messages_enqueued.add(1, &[]);
    }

    /// Record the outcome of one claim batch.
    pub fn record_claim(&self, claimed: u64) {
        if claimed == 0 {
            self.claims_empty.add(1, &[]);
        } else {
            self.messages_claimed.add(claimed, &[]);
        }
    }

    pub fn record_ack(&self, late: bool) {
        self.messages_acked.add(1, &[]);
        if late {
            self.acks_late.add(1, &[]);
        }
    }

    pub fn record_ack_not_owned(&self) {
        self.acks_not_owned.add(1, &[]);
    }

    pub fn set_queue_depth(&self, depth: u64) {
        self.queue_depth.record(depth, &[]);
    }

    pub fn set_leases_active(&self, count: u64) {
        self.leases_active.record(count, &[]);
    }
}
