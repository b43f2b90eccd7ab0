use std::time::Duration;

use async_trait::async_trait;
use kube::Client;
use kube::Resource;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use tracing::{debug, warn};

use super::metrics::StoreMetrics;
use crate::crd::Store;

pub const REASON_PROVISIONING: &str = "Provisioning";
pub const REASON_READY: &str = "Ready";
pub const REASON_FAILED: &str = "Failed";
pub const REASON_DELETE_FAILED: &str = "DeleteFailed";
pub const REASON_PLAN_DEFAULTED: &str = "PlanDefaulted";

/// Something worth telling operators about a Store.
#[derive(Clone, Debug, PartialEq)]
pub enum LifecycleEvent {
    ProvisioningStarted,
    PlanDefaulted { requested: String, applied: String },
    DeployFailed { message: String },
    /// `elapsed` is the time since the Store was created, when known.
    Ready { elapsed: Option<Duration> },
    DeleteFailed { message: String },
    Deleted,
}

impl LifecycleEvent {
    pub fn reason(&self) -> &'static str {
        match self {
            LifecycleEvent::ProvisioningStarted => REASON_PROVISIONING,
            LifecycleEvent::PlanDefaulted { .. } => REASON_PLAN_DEFAULTED,
            LifecycleEvent::DeployFailed { .. } => REASON_FAILED,
            LifecycleEvent::Ready { .. } => REASON_READY,
            LifecycleEvent::DeleteFailed { .. } => REASON_DELETE_FAILED,
            LifecycleEvent::Deleted => "Deleted",
        }
    }

    fn to_event(&self) -> Option<Event> {
        let (type_, action, note) = match self {
            LifecycleEvent::ProvisioningStarted => (
                EventType::Normal,
                "Provision",
                "Started provisioning store".to_string(),
            ),
            LifecycleEvent::PlanDefaulted { requested, applied } => (
                EventType::Warning,
                "ResolvePlan",
                format!("Unknown plan {requested:?}; applied {applied:?}"),
            ),
            LifecycleEvent::DeployFailed { message } => (
                EventType::Warning,
                "Deploy",
                format!("Deployment failed: {message}"),
            ),
            LifecycleEvent::Ready { .. } => {
                (EventType::Normal, "Deploy", "Store is ready".to_string())
            }
            LifecycleEvent::DeleteFailed { message } => (
                EventType::Warning,
                "Delete",
                format!("Teardown failed: {message}"),
            ),
            // The object is about to disappear.
            LifecycleEvent::Deleted => return None,
        };
        Some(Event {
            type_,
            reason: self.reason().into(),
            note: Some(note),
            action: action.into(),
            secondary: None,
        })
    }
}

/// Fire-and-forget sink for lifecycle events and metrics. Implementations
/// must not fail the reconciliation pass.
#[async_trait]
pub trait LifecycleSink: Send + Sync {
    async fn record(&self, store: &Store, event: LifecycleEvent);
}

/// Publishes Kubernetes Events on the Store and records OTel metrics.
pub struct KubeSink {
    recorder: Recorder,
    metrics: StoreMetrics,
}

impl KubeSink {
    pub fn new(client: Client, metrics: StoreMetrics) -> Self {
        let reporter = Reporter {
            controller: "store-operator".into(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
            metrics,
        }
    }
}

#[async_trait]
impl LifecycleSink for KubeSink {
    async fn record(&self, store: &Store, event: LifecycleEvent) {
        match &event {
            LifecycleEvent::ProvisioningStarted => self
                .metrics
                .store_created(&store.spec.engine, &store.spec.plan),
            LifecycleEvent::Ready {
                elapsed: Some(elapsed),
            } => self.metrics.provisioned_in(*elapsed, &store.spec.engine),
            LifecycleEvent::Deleted => self.metrics.store_deleted(),
            _ => {}
        }
        let Some(ev) = event.to_event() else {
            return;
        };
        let reference = store.object_ref(&());
        match self.recorder.publish(&ev, &reference).await {
            Ok(()) => debug!(reason = %ev.reason, "event published"),
            Err(e) => warn!(reason = %ev.reason, error = %e, "failed to publish event"),
        }
    }
}
