//! Log output, optional OTLP span export and the Prometheus recorder.

use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::ObservabilityConfig;

/// Install the global subscriber. `RUST_LOG` overrides `log_level`.
pub fn init(service_name: &str, config: &ObservabilityConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt = tracing_subscriber::fmt::layer().with_target(false);
    let fmt = if config.json_logging {
        fmt.json().boxed()
    } else {
        fmt.boxed()
    };

    let otlp = match config.otlp_endpoint.as_deref() {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint);
            let resource = Resource::new([opentelemetry::KeyValue::new(
                "service.name",
                service_name.to_owned(),
            )]);
            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(exporter)
                .with_trace_config(trace::config().with_resource(resource))
                .install_batch(runtime::Tokio)?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(otlp)
        .with(fmt)
        .try_init()?;

    metrics::register_metrics();
    Ok(())
}

/// Flush pending spans.
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}

/// Prometheus recorder and metric descriptions.
pub mod metrics {
    use metrics::describe_counter;
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
    use std::sync::OnceLock;

    static PROMETHEUS: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

    /// Install the process-wide Prometheus recorder. Later calls reuse the first.
    pub fn install_recorder() -> Option<&'static PrometheusHandle> {
        PROMETHEUS
            .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::warn!(error = %e, "Prometheus recorder not installed");
                    None
                }
            })
            .as_ref()
    }

    /// Render all metrics in Prometheus text format.
    pub fn render() -> String {
        install_recorder().map(|h| h.render()).unwrap_or_default()
    }

    /// Describe every campus counter. Installs the recorder first so the
    /// descriptions are not lost to the no-op default.
    pub fn register_metrics() {
        install_recorder();
        for (name, help) in COUNTERS {
            describe_counter!(*name, *help);
        }
    }

    const COUNTERS: &[(&str, &str)] = &[
        ("campus_gate_decisions_total", "Gate outcomes, labelled by outcome"),
        ("campus_refresh_total", "Refresh exchanges, labelled by result"),
        ("campus_entity_checks_total", "Record visibility checks, labelled by result"),
        ("campus_errors_total", "CampusError values created, by code and category"),
        ("campus_logins_total", "Login attempts, labelled by result"),
    ];
}
