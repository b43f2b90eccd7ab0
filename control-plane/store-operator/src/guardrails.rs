//! Namespace guardrails: quota, container default limits and network
//! isolation. Each object has a fixed name per namespace and is re-applied
//! in full on every pass; nothing here deletes them, namespace deletion
//! does.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    LimitRange, LimitRangeItem, LimitRangeSpec, ResourceQuota,
    ResourceQuotaSpec,
};
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule,
    NetworkPolicyPeer, NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, ObjectMeta,
};
use tracing::{debug, info, instrument};

use crate::plans::{PlanEnvelope, ResolvedPlan};
use crate::store::{Managed, ResourceStore, StoreResult};
use crate::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};

pub const RESOURCE_QUOTA_NAME: &str = "store-resource-quota";
pub const LIMIT_RANGE_NAME: &str = "store-limit-range";
pub const NETWORK_POLICY_NAME: &str = "store-default-deny";

const NAMESPACE_NAME_LABEL: &str = "kubernetes.io/metadata.name";

fn meta(ns: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(ns.to_string()),
        labels: Some(BTreeMap::from([(
            MANAGED_BY_LABEL.to_string(),
            MANAGED_BY_VALUE.to_string(),
        )])),
        ..Default::default()
    }
}

fn resources(pairs: &[(&str, &String)]) -> BTreeMap<String, Quantity> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), PlanEnvelope::quantity(v)))
        .collect()
}

pub fn build_resource_quota(ns: &str, env: &PlanEnvelope) -> ResourceQuota {
    ResourceQuota {
        metadata: meta(ns, RESOURCE_QUOTA_NAME),
        spec: Some(ResourceQuotaSpec {
            hard: Some(resources(&[
                ("requests.cpu", &env.requests_cpu),
                ("requests.memory", &env.requests_memory),
                ("limits.cpu", &env.limits_cpu),
                ("limits.memory", &env.limits_memory),
                ("pods", &env.max_pods),
            ])),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn build_limit_range(ns: &str, env: &PlanEnvelope) -> LimitRange {
    LimitRange {
        metadata: meta(ns, LIMIT_RANGE_NAME),
        spec: Some(LimitRangeSpec {
            limits: vec![LimitRangeItem {
                type_: "Container".into(),
                default: Some(resources(&[
                    ("cpu", &env.default_cpu),
                    ("memory", &env.default_memory),
                ])),
                default_request: Some(resources(&[
                    ("cpu", &env.default_request_cpu),
                    ("memory", &env.default_request_memory),
                ])),
                ..Default::default()
            }],
        }),
    }
}

/// Deny by default: all pods are selected; ingress only from the ingress
/// controller's namespace and from pods in the same namespace; egress open
/// (DNS, package mirrors).
pub fn build_network_policy(ns: &str, ingress_namespace: &str) -> NetworkPolicy {
    NetworkPolicy {
        metadata: meta(ns, NETWORK_POLICY_NAME),
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector::default(),
            policy_types: Some(vec!["Ingress".into(), "Egress".into()]),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(vec![
                    NetworkPolicyPeer {
                        namespace_selector: Some(LabelSelector {
                            match_labels: Some(BTreeMap::from([(
                                NAMESPACE_NAME_LABEL.to_string(),
                                ingress_namespace.to_string(),
                            )])),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                    NetworkPolicyPeer {
                        pod_selector: Some(LabelSelector::default()),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }]),
            egress: Some(vec![NetworkPolicyEgressRule {
                to: Some(vec![]),
                ..Default::default()
            }]),
        }),
    }
}

/// Ensure quota, limit range and network policy in `ns` match `plan`.
#[instrument(skip_all, fields(ns = %ns, plan = %plan.name))]
pub async fn apply_guardrails<R: ResourceStore>(
    store: &R,
    ns: &str,
    plan: &ResolvedPlan,
    ingress_namespace: &str,
) -> StoreResult<()> {
    ensure(
        store,
        ns,
        build_resource_quota(ns, &plan.envelope),
        |cur, want| cur.spec = want.spec,
    )
    .await?;
    ensure(
        store,
        ns,
        build_limit_range(ns, &plan.envelope),
        |cur, want| cur.spec = want.spec,
    )
    .await?;
    ensure(
        store,
        ns,
        build_network_policy(ns, ingress_namespace),
        |cur, want| cur.spec = want.spec,
    )
    .await?;
    debug!("guardrails applied");
    Ok(())
}

/// Get by name; overwrite the spec in place when found, create otherwise.
async fn ensure<R, K>(
    store: &R,
    ns: &str,
    desired: K,
    overwrite: impl FnOnce(&mut K, K) + Send,
) -> StoreResult<()>
where
    R: ResourceStore,
    K: Managed,
{
    let name = desired.meta().name.clone().unwrap_or_default();
    match store.get::<K>(Some(ns), &name).await? {
        Some(mut existing) => {
            overwrite(&mut existing, desired);
            store.replace(Some(ns), &existing).await?;
            debug!(kind = %K::kind(&()), %name, "guardrail updated");
        }
        None => {
            store.create(Some(ns), &desired).await?;
            info!(kind = %K::kind(&()), %name, "guardrail created");
        }
    }
    Ok(())
}
