//! Tracing bootstrap with optional OpenTelemetry export
//!
//! The server's own diagnostics go through `tracing`. When telemetry is
//! enabled, spans are also exported over OTLP (gRPC or HTTP).

use crate::config::{OtlpProtocol, TelemetrySettings};
use common::Environment;
use common::logging::env_filter;
use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource, runtime,
    trace::{RandomIdGenerator, Sampler, TracerProvider},
};
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to build OTLP exporter: {0}")]
    Exporter(String),

    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(String),
}

/// Keeps the tracer provider alive; dropping it flushes pending spans.
pub struct TelemetryGuard {
    provider: TracerProvider,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Err(e) = self.provider.shutdown() {
            tracing::warn!(error = %e, "Failed to flush spans on shutdown");
        }
    }
}

/// Build the OTLP tracer provider and install it globally.
///
/// Returns `None` when telemetry is disabled.
pub fn init_telemetry(settings: &TelemetrySettings) -> Result<Option<TelemetryGuard>, TelemetryError> {
    if !settings.enabled {
        return Ok(None);
    }

    let exporter = match settings.protocol {
        OtlpProtocol::Grpc => opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(settings.otlp_endpoint.as_str())
            .build(),
        OtlpProtocol::Http => opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(settings.otlp_endpoint.as_str())
            .build(),
    }
    .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

    let resource = Resource::new(vec![
        KeyValue::new("service.name", settings.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION").to_string()),
    ]);

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());

    Ok(Some(TelemetryGuard { provider }))
}

/// Install the tracing subscriber: env filter, a JSON (production) or
/// human-readable fmt layer, and the OpenTelemetry layer when enabled.
pub fn setup_tracing(
    environment: Environment,
    default_level: &str,
    settings: &TelemetrySettings,
) -> Result<Option<TelemetryGuard>, TelemetryError> {
    let guard = init_telemetry(settings)?;

    let otel_layer = guard.as_ref().map(|guard| {
        tracing_opentelemetry::layer().with_tracer(guard.provider.tracer(settings.service_name.clone()))
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(otel_layer);

    let installed = if environment.is_production() {
        subscriber.with(fmt::layer().json()).try_init()
    } else {
        subscriber.with(fmt::layer()).try_init()
    };
    installed.map_err(|e| TelemetryError::Subscriber(e.to_string()))?;

    tracing::info!(
        otel = settings.enabled,
        otlp_endpoint = %settings.otlp_endpoint,
        "Tracing initialized"
    );

    Ok(guard)
}
