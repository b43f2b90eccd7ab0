use serde::Serialize;

use crate::config::OperatorConfig;
use crate::credentials::StoreCredentials;

/// Values for the WordPress/WooCommerce template. Field names follow the
/// chart's values schema.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WordPressValues {
    pub wordpress_blog_name: String,
    pub wordpress_password: String,
    pub service: ServiceValues,
    pub volume_permissions: Toggle,
    pub ingress: IngressValues,
    pub mariadb: MariaDbValues,
    pub persistence: Toggle,
    pub liveness_probe: ProbeValues,
    pub readiness_probe: ProbeValues,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Toggle {
    pub enabled: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ServiceValues {
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressValues {
    pub enabled: bool,
    pub hostname: String,
    pub ingress_class_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MariaDbValues {
    pub auth: MariaDbAuth,
    pub primary: MariaDbPrimary,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MariaDbAuth {
    pub root_password: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MariaDbPrimary {
    pub persistence: Toggle,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeValues {
    pub initial_delay_seconds: u32,
    pub period_seconds: u32,
}

impl WordPressValues {
    pub fn build(
        store_name: &str,
        creds: &StoreCredentials,
        cfg: &OperatorConfig,
    ) -> Self {
        let persistence = cfg.values.persistence_enabled;
        Self {
            wordpress_blog_name: store_name.to_string(),
            wordpress_password: creds.admin_password.clone(),
            service: ServiceValues {
                type_: "ClusterIP".into(),
            },
            volume_permissions: Toggle { enabled: true },
            ingress: IngressValues {
                enabled: true,
                hostname: cfg.store_host(store_name),
                ingress_class_name: cfg.network.ingress_class_name.clone(),
            },
            mariadb: MariaDbValues {
                auth: MariaDbAuth {
                    root_password: creds.db_root_password.clone(),
                    password: creds.db_user_password.clone(),
                },
                primary: MariaDbPrimary {
                    persistence: Toggle {
                        enabled: persistence,
                    },
                },
            },
            persistence: Toggle {
                enabled: persistence,
            },
            liveness_probe: ProbeValues {
                initial_delay_seconds: cfg.values.liveness_initial_delay,
                period_seconds: cfg.values.liveness_period,
            },
            readiness_probe: ProbeValues {
                initial_delay_seconds: cfg.values.readiness_initial_delay,
                period_seconds: cfg.values.readiness_period,
            },
        }
    }

    /// Generic value tree handed to the deployer.
    pub fn to_tree(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
