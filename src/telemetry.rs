//! Logging and trace-export initialization.
//!
//! Always installs a tracing-subscriber pipeline (JSON for machines, pretty
//! for terminals); optionally layers an OTLP span exporter on top when
//! enabled by configuration.

use opentelemetry::trace::TracerProvider as _;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{LoggingFormat, TelemetryConfig};

/// Flushes pending spans on drop.
pub struct TelemetryGuard {
    tracer_provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.as_mut()
            && let Err(err) = provider.shutdown()
        {
            eprintln!("{err:?}");
        }
    }
}

fn resource(service_name: &str) -> opentelemetry_sdk::Resource {
    opentelemetry_sdk::Resource::builder()
        .with_service_name(service_name.to_string())
        .with_attributes([opentelemetry::KeyValue::new(
            opentelemetry_semantic_conventions::attribute::SERVICE_VERSION,
            env!("CARGO_PKG_VERSION"),
        )])
        .build()
}

fn init_tracer_provider(service_name: &str) -> opentelemetry_sdk::trace::SdkTracerProvider {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
        .expect("failed to build OTLP span exporter");

    opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_resource(resource(service_name))
        .with_batch_exporter(exporter)
        .build()
}

pub fn init(config: &TelemetryConfig) -> TelemetryGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},axum={}",
            tracing::Level::from(config.level),
            tracing::Level::from(config.axum_level),
        ))
    });

    let fmt_layer = match config.format {
        LoggingFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
        LoggingFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
    };

    let registry = tracing_subscriber::registry().with(filter).with(fmt_layer);

    if config.otlp_enabled {
        opentelemetry::global::set_text_map_propagator(
            opentelemetry_sdk::propagation::TraceContextPropagator::new(),
        );

        let tracer_provider = init_tracer_provider(&config.service_name);
        let tracer = tracer_provider.tracer("gatehouse");

        registry
            .with(tracing_opentelemetry::OpenTelemetryLayer::new(tracer))
            .init();

        TelemetryGuard {
            tracer_provider: Some(tracer_provider),
        }
    } else {
        registry.init();
        TelemetryGuard {
            tracer_provider: None,
        }
    }
}
