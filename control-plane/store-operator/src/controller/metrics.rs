use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Histogram boundaries in seconds: 5s doubling up to 640s.
pub fn provisioning_buckets() -> Vec<f64> {
    (0..8).map(|k| 5.0 * f64::from(1u32 << k)).collect()
}

/// Store lifecycle instruments, registered on the global meter provider.
#[derive(Clone)]
pub struct StoreMetrics {
    created_total: Counter<u64>,
    deletion_total: Counter<u64>,
    provisioning_seconds: Histogram<f64>,
}

impl StoreMetrics {
    pub fn new() -> Self {
        let meter: Meter = opentelemetry::global::meter("store-operator");
        let created_total = meter
            .u64_counter("store_created_total")
            .with_description("Stores that entered provisioning")
            .build();
        let deletion_total = meter
            .u64_counter("store_deletion_total")
            .with_description("Stores whose teardown completed")
            .build();
        let provisioning_seconds = meter
            .f64_histogram("store_provisioning_seconds")
            .with_description("Time from Store creation to Ready")
            .with_unit("s")
            .with_boundaries(provisioning_buckets())
            .build();
        Self {
            created_total,
            deletion_total,
            provisioning_seconds,
        }
    }

    pub fn store_created(&self, engine: &str, plan: &str) {
        self.created_total.add(
            1,
            &[
                KeyValue::new("engine", engine.to_string()),
                KeyValue::new("plan", plan.to_string()),
            ],
        );
    }

    pub fn store_deleted(&self) {
        self.deletion_total.add(1, &[]);
    }

    pub fn provisioned_in(&self, elapsed: Duration, engine: &str) {
        self.provisioning_seconds.record(
            elapsed.as_secs_f64(),
            &[KeyValue::new("engine", engine.to_string())],
        );
    }
}

impl Default for StoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}
