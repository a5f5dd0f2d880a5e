use crate::config::Config;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Registry};

pub const DEFAULT_LOG_FILTER: &str = "evdesk=debug,tower_http=debug,axum=debug";

/// Flushes exported spans when dropped.
pub struct ObservabilityGuard {
    otlp_enabled: bool,
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        if self.otlp_enabled {
            shutdown();
        }
    }
}

pub fn init(config: &Config) -> Result<ObservabilityGuard, Box<dyn std::error::Error>> {
    let otlp_enabled = init_tracing(config)?;
    init_metrics(config)?;
    Ok(ObservabilityGuard { otlp_enabled })
}

/// Installs the global subscriber. Returns whether spans are exported over OTLP.
fn init_tracing(config: &Config) -> Result<bool, Box<dyn std::error::Error>> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_thread_ids(true)
        .with_target(true);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    let Some(endpoint) = &config.otel_exporter_endpoint else {
        Registry::default().with(env_filter).with(fmt_layer).init();
        return Ok(false);
    };

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint);

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
            KeyValue::new("service.name", config.service_name.clone()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])))
        .install_batch(runtime::Tokio)?;

    Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .init();

    tracing::info!(endpoint = %endpoint, "OTLP span export enabled");
    Ok(true)
}

fn init_metrics(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.metrics_port))
        .install()?;

    tracing::info!(port = config.metrics_port, "Prometheus exporter listening");
    Ok(())
}

pub fn shutdown() {
    global::shutdown_tracer_provider();
}
