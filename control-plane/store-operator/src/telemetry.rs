use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use std::time::Duration;

/// Install an OTLP (gRPC) metrics exporter when an endpoint is configured.
/// Returns the provider so the caller can flush it on shutdown; `None`
/// when metrics export is disabled.
///
/// Env vars:
///  - OTEL_EXPORTER_OTLP_METRICS_ENDPOINT or OTEL_EXPORTER_OTLP_ENDPOINT
///  - OTEL_SERVICE_NAME (optional)
///  - OTEL_METRICS_PERIOD_SECS (optional, default 30)
pub fn init_metrics_if_configured(
    default_service: &str,
) -> anyhow::Result<Option<SdkMeterProvider>> {
    let Some(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_METRICS_ENDPOINT")
        .or_else(|_| std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT"))
        .ok()
        .filter(|v| !v.trim().is_empty())
    else {
        return Ok(None);
    };
    let service_name = std::env::var("OTEL_SERVICE_NAME")
        .unwrap_or_else(|_| default_service.to_string());
    let period = std::env::var("OTEL_METRICS_PERIOD_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(30);

    let resource = Resource::builder()
        .with_attribute(KeyValue::new("service.name", service_name))
        .build();
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let reader = PeriodicReader::builder(exporter)
        .with_interval(Duration::from_secs(period))
        .build();
    let provider = SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build();
    opentelemetry::global::set_meter_provider(provider.clone());
    Ok(Some(provider))
}
