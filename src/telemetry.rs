//! Logging and metrics export for a single run.
//!
//! Tracing always goes to stdout through `fmt`, filtered by `RUST_LOG` or the
//! configured level. With the `otel` feature spans are also exported over
//! OTLP. With the `prometheus` feature metrics are recorded in-process and
//! pushed to a push gateway from [`shutdown`], since the process exits before
//! anything could scrape it.

#[cfg(feature = "prometheus")]
use std::sync::OnceLock;
#[cfg(any(feature = "prometheus", feature = "otel"))]
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[cfg(feature = "otel")]
static TRACER_PROVIDER: std::sync::OnceLock<opentelemetry_sdk::trace::SdkTracerProvider> =
    std::sync::OnceLock::new();

#[cfg(feature = "prometheus")]
struct MetricsPush {
    handle: metrics_exporter_prometheus::PrometheusHandle,
    url: String,
}

#[cfg(feature = "prometheus")]
static METRICS_PUSH: OnceLock<MetricsPush> = OnceLock::new();

/// Initialize logging and exporters. Call once, before the run.
pub fn init(config: &TelemetryConfig) -> Result<(), BoxError> {
    init_tracing(config)?;

    #[cfg(feature = "prometheus")]
    if let Some(gateway) = &config.push_gateway {
        let handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
        let url = gateway.push_url();
        info!(%url, "metrics will be pushed on exit");
        let _ = METRICS_PUSH.set(MetricsPush { handle, url });
    }

    Ok(())
}

fn init_tracing(config: &TelemetryConfig) -> Result<(), BoxError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false));

    #[cfg(feature = "otel")]
    let registry = {
        use opentelemetry::trace::TracerProvider as _;

        let provider = match &config.opentelemetry {
            Some(otel) => Some(otlp_tracer_provider(otel)?),
            None => None,
        };
        let layer = provider.map(|provider| {
            let tracer = provider.tracer("node-dns-sync");
            let _ = TRACER_PROVIDER.set(provider);
            tracing_opentelemetry::layer().with_tracer(tracer)
        });
        registry.with(layer)
    };

    registry.try_init()?;

    #[cfg(feature = "otel")]
    if let Some(otel) = &config.opentelemetry {
        info!(endpoint = %otel.endpoint, "OpenTelemetry tracing enabled");
    }

    Ok(())
}

#[cfg(feature = "otel")]
fn otlp_tracer_provider(
    otel: &crate::config::OpenTelemetryConfig,
) -> Result<opentelemetry_sdk::trace::SdkTracerProvider, BoxError> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};
    use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&otel.endpoint)
        .build()?;

    let resource = Resource::builder()
        .with_attributes([
            KeyValue::new(SERVICE_NAME, otel.service_name.clone()),
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
        ])
        .build();

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build())
}

/// Flush exporters: push the run's metrics and drain pending spans.
///
/// Export failures are logged, never returned; the run's exit status stands.
pub async fn shutdown() {
    #[cfg(feature = "prometheus")]
    if let Some(push) = METRICS_PUSH.get() {
        push_metrics(push).await;
    }

    #[cfg(feature = "otel")]
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "failed to flush spans");
        }
    }
}

#[cfg(feature = "prometheus")]
async fn push_metrics(push: &MetricsPush) {
    let body = push.handle.render();
    let result = async {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?
            .put(&push.url)
            .body(body)
            .send()
            .await?
            .error_for_status()
    }
    .await;

    match result {
        Ok(_) => tracing::debug!(url = %push.url, "metrics pushed"),
        Err(e) => tracing::warn!(url = %push.url, error = %e, "failed to push metrics"),
    }
}
