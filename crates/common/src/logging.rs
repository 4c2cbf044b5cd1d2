use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

pub fn init_logging(default_level: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }

    fmt()
        .with_env_filter(env_filter(default_level))
        .with_writer(std::io::stderr)
        .init();
}

/// Logging plus span export over OTLP when an endpoint is given.
///
/// Without the `otel` feature, or without an endpoint, this is `init_logging`.
pub fn init_tracing(service: &str, default_level: &str, otlp_endpoint: Option<&str>) {
    if tracing::dispatcher::has_been_set() {
        return;
    }

    #[cfg(feature = "otel")]
    {
        if let Some(endpoint) = otlp_endpoint {
            match otel::tracer(service, endpoint) {
                Ok(tracer) => {
                    tracing_subscriber::registry()
                        .with(env_filter(default_level))
                        .with(fmt::layer().with_writer(std::io::stderr))
                        .with(tracing_opentelemetry::layer().with_tracer(tracer))
                        .init();
                    return;
                }
                Err(err) => {
                    eprintln!("otlp exporter unavailable for {service}: {err}");
                }
            }
        }
    }
    #[cfg(not(feature = "otel"))]
    let _ = (service, otlp_endpoint);

    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub fn shutdown_tracer_provider() {
    #[cfg(feature = "otel")]
    opentelemetry::global::shutdown_tracer_provider();
}

#[cfg(feature = "otel")]
mod otel {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::{self, Tracer};
    use opentelemetry_sdk::Resource;

    pub(super) fn tracer(
        service: &str,
        endpoint: &str,
    ) -> Result<Tracer, opentelemetry::trace::TraceError> {
        opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(endpoint),
            )
            .with_trace_config(trace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", service.to_string()),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
    }
}
