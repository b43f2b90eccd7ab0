//! Workload readiness, polled from pod state.

use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, warn};

use crate::store::ResourceStore;

/// Identifying label of the engine's application pods.
pub const WORKLOAD_SELECTOR: &str = "app.kubernetes.io/name=wordpress";

/// Running with a `Ready=True` condition.
pub fn pod_is_ready(pod: &Pod) -> bool {
    let Some(status) = pod.status.as_ref() else {
        return false;
    };
    if status.phase.as_deref() != Some("Running") {
        return false;
    }
    status
        .conditions
        .as_ref()
        .map(|cs| cs.iter().any(|c| c.type_ == "Ready" && c.status == "True"))
        .unwrap_or(false)
}

/// True iff at least one workload pod in `ns` is ready. A failed list is
/// reported as not ready, never as an error.
pub async fn workload_ready<R: ResourceStore>(store: &R, ns: &str) -> bool {
    match store.list::<Pod>(Some(ns), WORKLOAD_SELECTOR).await {
        Ok(pods) => {
            let ready = pods.iter().filter(|p| pod_is_ready(p)).count();
            debug!(%ns, total = pods.len(), ready, "workload pods");
            ready > 0
        }
        Err(e) => {
            warn!(%ns, error = %e, "listing workload pods failed");
            false
        }
    }
}
