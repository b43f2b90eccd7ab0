use envconfig::Envconfig;
use kube::Client;
use store_operator::{config::OperatorConfig, init_tracing, runtime, telemetry};
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    // Ensure rustls uses the aws-lc-rs provider explicitly.
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(
        rustls::crypto::aws_lc_rs::default_provider(),
    ) {
        tracing::debug!(
            ?e,
            "CryptoProvider already installed or incompatible; proceeding"
        );
    }

    let meter_provider = telemetry::init_metrics_if_configured("store-operator")?;
    if meter_provider.is_some() {
        info!("OTLP metrics export enabled");
    }

    let cfg = OperatorConfig::init_from_env()?;
    info!(?cfg, "Starting store-operator");

    let client = Client::try_default().await?;
    let res = runtime::run_all(client, cfg).await;

    if let Some(provider) = meter_provider {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "metrics provider shutdown failed");
        }
    }
    res
}
