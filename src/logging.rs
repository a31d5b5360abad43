use color_eyre::Result;
use color_eyre::eyre::Context;
use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Flushes exported spans when dropped at the end of `main`
pub struct TracingGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Failed to shut down tracer provider: {e}");
        }
    }
}

/// `RUST_LOG` wins over the CLI level when set
fn build_filter(level: &str) -> Result<EnvFilter> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => {
            EnvFilter::try_new(directives).wrap_err("Invalid RUST_LOG directives")
        }
        _ => EnvFilter::try_new(level).wrap_err("Failed to create tracing filter"),
    }
}

fn otlp_provider(service_name: &str, endpoint: &str) -> Result<SdkTracerProvider> {
    let resource = Resource::builder()
        .with_attributes(vec![KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_NAME,
            service_name.to_string(),
        )])
        .build();

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .wrap_err("Failed to create OTLP span exporter")?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build())
}

/// Install the global subscriber: fmt output on stderr, plus OTLP export
/// when an endpoint is given.
pub fn init_tracing(
    service_name: &str,
    otlp_endpoint: Option<&str>,
    level: &str,
) -> Result<TracingGuard> {
    let filter_layer = build_filter(level)?;
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let tracer_provider = otlp_endpoint
        .map(|endpoint| otlp_provider(service_name, endpoint))
        .transpose()?;
    let telemetry_layer = tracer_provider.as_ref().map(|provider| {
        opentelemetry::global::set_tracer_provider(provider.clone());
        tracing_opentelemetry::layer().with_tracer(provider.tracer(service_name.to_string()))
    });

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(telemetry_layer)
        .try_init()
        .wrap_err("Failed to install tracing subscriber")?;

    Ok(TracingGuard { tracer_provider })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_level() {
        if std::env::var(EnvFilter::DEFAULT_ENV).is_err() {
            assert!(build_filter("track_resolver=loud").is_err());
            assert!(build_filter("track_resolver=debug,warn").is_ok());
        }
    }
}
