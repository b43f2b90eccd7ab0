pub mod config;
pub mod controller;
pub mod crd;
pub mod credentials;
pub mod deployer;
pub mod guardrails;
pub mod plans;
pub mod readiness;
pub mod runtime;
pub mod store;
pub mod telemetry;
pub mod web;

use tracing_subscriber::{
    EnvFilter, filter::LevelFilter, layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Label marking objects this operator created.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "store-operator";
/// Label carrying the name of the Store an object belongs to.
pub const STORE_LABEL: &str = "infra.store.io/store";

pub fn init_tracing(default_env: &str) {
    let filter = EnvFilter::builder()
        .with_default_directive(
            default_env
                .parse()
                .unwrap_or_else(|_| LevelFilter::INFO.into()),
        )
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .try_init();
}
