//! Plan catalog: maps a plan name to the resource envelope its namespace
//! is allowed to consume.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};

/// Resource envelope of a plan. Quota fields bound the whole namespace;
/// `default_*` fields are the per-container defaults of the limit range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEnvelope {
    pub requests_cpu: String,
    pub requests_memory: String,
    pub limits_cpu: String,
    pub limits_memory: String,
    pub max_pods: String,

    pub default_cpu: String,
    pub default_memory: String,
    pub default_request_cpu: String,
    pub default_request_memory: String,
}

/// Partial envelope used to override built-in plans from configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlanOverride {
    pub requests_cpu: Option<String>,
    pub requests_memory: Option<String>,
    pub limits_cpu: Option<String>,
    pub limits_memory: Option<String>,
    pub max_pods: Option<String>,
    pub default_cpu: Option<String>,
    pub default_memory: Option<String>,
    pub default_request_cpu: Option<String>,
    pub default_request_memory: Option<String>,
}

impl PlanEnvelope {
    fn apply(&mut self, o: PlanOverride) {
        let PlanOverride {
            requests_cpu,
            requests_memory,
            limits_cpu,
            limits_memory,
            max_pods,
            default_cpu,
            default_memory,
            default_request_cpu,
            default_request_memory,
        } = o;
        let pairs = [
            (&mut self.requests_cpu, requests_cpu),
            (&mut self.requests_memory, requests_memory),
            (&mut self.limits_cpu, limits_cpu),
            (&mut self.limits_memory, limits_memory),
            (&mut self.max_pods, max_pods),
            (&mut self.default_cpu, default_cpu),
            (&mut self.default_memory, default_memory),
            (&mut self.default_request_cpu, default_request_cpu),
            (&mut self.default_request_memory, default_request_memory),
        ];
        for (slot, value) in pairs {
            if let Some(v) = value {
                *slot = v;
            }
        }
    }

    pub fn quantity(v: &str) -> Quantity {
        Quantity(v.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPlan {
    /// Name of the plan actually applied.
    pub name: String,
    pub envelope: PlanEnvelope,
    /// True when the requested plan was unknown and the smallest plan was
    /// substituted.
    pub defaulted: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("invalid plan overrides: {0}")]
    InvalidOverrides(#[from] serde_json::Error),
    #[error("override for unknown plan `{0}`")]
    UnknownPlan(String),
}

/// Ordered smallest to largest; the first entry is the fallback.
#[derive(Clone, Debug)]
pub struct PlanCatalog {
    plans: Vec<(String, PlanEnvelope)>,
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PlanCatalog {
    pub fn builtin() -> Self {
        let plans = vec![
            (
                "small".to_string(),
                envelope(
                    ("500m", "512Mi"),
                    ("1", "1Gi"),
                    "10",
                    ("200m", "256Mi"),
                    ("50m", "128Mi"),
                ),
            ),
            (
                "medium".to_string(),
                envelope(
                    ("1", "1Gi"),
                    ("2", "2Gi"),
                    "15",
                    ("500m", "512Mi"),
                    ("100m", "256Mi"),
                ),
            ),
            (
                "large".to_string(),
                envelope(
                    ("2", "2Gi"),
                    ("4", "4Gi"),
                    "20",
                    ("1", "1Gi"),
                    ("200m", "512Mi"),
                ),
            ),
        ];
        Self { plans }
    }

    /// Built-in catalog with overrides applied from a JSON object keyed by
    /// plan name. Overrides may only target existing plans.
    pub fn with_overrides(raw: Option<&str>) -> Result<Self, PlanError> {
        let mut catalog = Self::builtin();
        let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
            return Ok(catalog);
        };
        let overrides: BTreeMap<String, PlanOverride> =
            serde_json::from_str(raw)?;
        for (name, o) in overrides {
            let slot = catalog
                .plans
                .iter_mut()
                .find(|(n, _)| *n == name)
                .ok_or_else(|| PlanError::UnknownPlan(name.clone()))?;
            slot.1.apply(o);
        }
        Ok(catalog)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plans.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plans.iter().map(|(n, _)| n.as_str())
    }

    /// Resolve a plan by name, falling back to the smallest plan when the
    /// name is unknown.
    pub fn resolve(&self, name: &str) -> ResolvedPlan {
        if let Some((n, env)) = self.plans.iter().find(|(n, _)| n == name) {
            return ResolvedPlan {
                name: n.clone(),
                envelope: env.clone(),
                defaulted: false,
            };
        }
        let (n, env) = &self.plans[0];
        ResolvedPlan {
            name: n.clone(),
            envelope: env.clone(),
            defaulted: true,
        }
    }
}

fn envelope(
    requests: (&str, &str),
    limits: (&str, &str),
    max_pods: &str,
    defaults: (&str, &str),
    default_requests: (&str, &str),
) -> PlanEnvelope {
    PlanEnvelope {
        requests_cpu: requests.0.into(),
        requests_memory: requests.1.into(),
        limits_cpu: limits.0.into(),
        limits_memory: limits.1.into(),
        max_pods: max_pods.into(),
        default_cpu: defaults.0.into(),
        default_memory: defaults.1.into(),
        default_request_cpu: default_requests.0.into(),
        default_request_memory: default_requests.1.into(),
    }
}
