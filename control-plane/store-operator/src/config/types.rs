use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;

/// Duration parsed from a human-readable string such as `5s` or `1m30s`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interval(pub Duration);

impl FromStr for Interval {
    type Err = humantime::DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        humantime::parse_duration(s.trim()).map(Interval)
    }
}

impl From<Interval> for Duration {
    fn from(v: Interval) -> Self {
        v.0
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    #[envconfig(from = "HTTP_PORT", default = "8080")]
    pub http_port: u16,

    /// Restrict the watch to one namespace. Unset watches all namespaces.
    /// Env: STORE_OPERATOR_WATCH_NAMESPACE
    #[envconfig(from = "STORE_OPERATOR_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Base domain for store URLs; a store `shop1` is served at
    /// `shop1.<BASE_DOMAIN>`.
    #[envconfig(from = "BASE_DOMAIN", default = "127.0.0.1.nip.io")]
    pub base_domain: String,

    #[envconfig(from = "STORE_URL_SCHEME", default = "https")]
    pub url_scheme: String,

    /// JSON object of partial per-plan envelope overrides.
    /// Env: STORE_PLAN_OVERRIDES (e.g. {"small":{"limitsMemory":"2Gi"}})
    #[envconfig(from = "STORE_PLAN_OVERRIDES")]
    pub plan_overrides: Option<String>,

    #[envconfig(nested)]
    pub templates: TemplateConfig,

    #[envconfig(nested)]
    pub network: NetworkConfig,

    #[envconfig(nested)]
    pub timing: TimingConfig,

    #[envconfig(nested)]
    pub values: ValuesConfig,

    #[envconfig(nested)]
    pub helm: HelmConfig,
}

#[derive(Envconfig, Clone, Debug)]
pub struct TemplateConfig {
    /// Chart used for engine `woo`.
    #[envconfig(from = "WORDPRESS_CHART_PATH", default = "/charts/engine-woo")]
    pub wordpress_chart_path: String,
    /// Chart used for engine `medusa`. No default ships with the operator.
    #[envconfig(from = "MEDUSA_CHART_PATH")]
    pub medusa_chart_path: Option<String>,
}

#[derive(Envconfig, Clone, Debug)]
pub struct NetworkConfig {
    #[envconfig(from = "INGRESS_CLASS_NAME", default = "nginx")]
    pub ingress_class_name: String,
    /// Namespace of the ingress controller; its pods may reach store pods.
    #[envconfig(from = "INGRESS_NAMESPACE", default = "ingress-nginx")]
    pub ingress_namespace: String,
}

#[derive(Envconfig, Clone, Debug)]
pub struct TimingConfig {
    /// Poll after creating the target namespace.
    #[envconfig(from = "NAMESPACE_REQUEUE_INTERVAL", default = "1s")]
    pub namespace_requeue: Interval,
    /// Poll after adding the finalizer.
    #[envconfig(from = "FINALIZER_REQUEUE_INTERVAL", default = "1s")]
    pub finalizer_requeue: Interval,
    /// Backoff after a failed install/upgrade.
    #[envconfig(from = "HELM_RETRY_INTERVAL", default = "20s")]
    pub helm_retry: Interval,
    /// Poll while waiting for workload pods.
    #[envconfig(from = "POD_CHECK_INTERVAL", default = "5s")]
    pub pod_check: Interval,
    /// Poll while the target namespace is terminating.
    #[envconfig(from = "DELETION_REQUEUE_INTERVAL", default = "5s")]
    pub deletion_requeue: Interval,
    /// Retry after an optimistic-concurrency conflict.
    #[envconfig(from = "CONFLICT_REQUEUE_INTERVAL", default = "1s")]
    pub conflict_requeue: Interval,
    /// Retry after any other failed pass.
    #[envconfig(from = "ERROR_REQUEUE_INTERVAL", default = "15s")]
    pub error_requeue: Interval,
    /// Periodic re-sync of stores that are already Ready.
    #[envconfig(from = "RESYNC_INTERVAL", default = "300s")]
    pub resync: Interval,
}

#[derive(Envconfig, Clone, Debug)]
pub struct ValuesConfig {
    #[envconfig(from = "PERSISTENCE_ENABLED", default = "false")]
    pub persistence_enabled: bool,
    #[envconfig(from = "LIVENESS_INITIAL_DELAY", default = "120")]
    pub liveness_initial_delay: u32,
    #[envconfig(from = "LIVENESS_PERIOD", default = "20")]
    pub liveness_period: u32,
    #[envconfig(from = "READINESS_INITIAL_DELAY", default = "60")]
    pub readiness_initial_delay: u32,
    #[envconfig(from = "READINESS_PERIOD", default = "10")]
    pub readiness_period: u32,
}

#[derive(Envconfig, Clone, Debug)]
pub struct HelmConfig {
    #[envconfig(from = "HELM_BIN", default = "helm")]
    pub bin: String,
    /// Upper bound for `--wait` on install and upgrade.
    #[envconfig(from = "HELM_TIMEOUT", default = "5m")]
    pub timeout: Interval,
}

impl OperatorConfig {
    /// Template path for an engine, if one is configured.
    pub fn template_for(&self, engine: &str) -> Option<&str> {
        match engine {
            "woo" => Some(self.templates.wordpress_chart_path.as_str()),
            "medusa" => self.templates.medusa_chart_path.as_deref(),
            _ => None,
        }
        .filter(|p| !p.trim().is_empty())
    }

    pub fn store_url(&self, store_name: &str) -> String {
        format!("{}://{}", self.url_scheme, self.store_host(store_name))
    }

    pub fn store_host(&self, store_name: &str) -> String {
        format!("{}.{}", store_name, self.base_domain)
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            watch_namespace: None,
            base_domain: "127.0.0.1.nip.io".into(),
            url_scheme: "https".into(),
            plan_overrides: None,
            templates: TemplateConfig {
                wordpress_chart_path: "/charts/engine-woo".into(),
                medusa_chart_path: None,
            },
            network: NetworkConfig {
                ingress_class_name: "nginx".into(),
                ingress_namespace: "ingress-nginx".into(),
            },
            timing: TimingConfig {
                namespace_requeue: Interval(Duration::from_secs(1)),
                finalizer_requeue: Interval(Duration::from_secs(1)),
                helm_retry: Interval(Duration::from_secs(20)),
                pod_check: Interval(Duration::from_secs(5)),
                deletion_requeue: Interval(Duration::from_secs(5)),
                conflict_requeue: Interval(Duration::from_secs(1)),
                error_requeue: Interval(Duration::from_secs(15)),
                resync: Interval(Duration::from_secs(300)),
            },
            values: ValuesConfig {
                persistence_enabled: false,
                liveness_initial_delay: 120,
                liveness_period: 20,
                readiness_initial_delay: 60,
                readiness_period: 10,
            },
            helm: HelmConfig {
                bin: "helm".into(),
                timeout: Interval(Duration::from_secs(300)),
            },
        }
    }
}
