//! OpenTelemetry initialization and utilities
//!
//! Provides functions to set up distributed tracing with OTLP export.
//! Span attributes that may carry Aura credentials or connection details
//! are redacted before they leave the process.

use opentelemetry::trace::TraceResult;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::resource::Resource;
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::{Config, Sampler, SpanProcessor};
use std::env;
use tracing_subscriber::{registry::LookupSpan, Layer};

use crate::error::{Error, Result};

const SERVICE_NAME: &str = "aura-operator";

const REDACTED: &str = "[REDACTED]";

/// Attribute keys (or key suffixes after a `.`) whose values are never exported
const SENSITIVE_KEYS: &[&str] = &[
    "client_id",
    "client_secret",
    "password",
    "authorization",
    "connection_url",
    "username",
];

fn is_sensitive(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    let leaf = key.rsplit('.').next().unwrap_or(key.as_str());
    SENSITIVE_KEYS.contains(&leaf)
}

/// A span processor that scrubs credential-bearing span attributes
#[derive(Debug)]
struct ScrubbingProcessor {
    inner: std::sync::Mutex<Box<dyn SpanProcessor + Send + Sync>>,
}

impl ScrubbingProcessor {
    fn new(inner: Box<dyn SpanProcessor + Send + Sync>) -> Self {
        ScrubbingProcessor {
            inner: std::sync::Mutex::new(inner),
        }
    }

    fn scrub_attributes(&self, attributes: &mut [KeyValue]) {
        for kv in attributes.iter_mut() {
            if is_sensitive(kv.key.as_str()) {
                kv.value = opentelemetry::Value::String(REDACTED.into());
            }
        }
    }
}

impl SpanProcessor for ScrubbingProcessor {
    fn on_start(&self, span: &mut opentelemetry_sdk::trace::Span, cx: &opentelemetry::Context) {
        if let Ok(inner) = self.inner.lock() {
            inner.on_start(span, cx);
        }
    }

    fn on_end(&self, mut span: SpanData) {
        self.scrub_attributes(&mut span.attributes);
        if let Ok(inner) = self.inner.lock() {
            inner.on_end(span);
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        if let Ok(inner) = self.inner.lock() {
            inner.force_flush()
        } else {
            Ok(())
        }
    }

    fn shutdown(&mut self) -> TraceResult<()> {
        if let Ok(mut inner) = self.inner.lock() {
            inner.shutdown()
        } else {
            Ok(())
        }
    }
}

/// Build the OpenTelemetry tracing layer exporting to `OTEL_EXPORTER_OTLP_ENDPOINT`
pub fn init_telemetry<S>(_subscriber: &S) -> Result<Box<dyn Layer<S> + Send + Sync>>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a> + Send + Sync,
{
    global::set_text_map_propagator(TraceContextPropagator::new());

    let otlp_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4317".to_string());

    let resource = Resource::new(vec![
        KeyValue::new("service.name", SERVICE_NAME),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]);

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(&otlp_endpoint)
        .build_span_exporter()
        .map_err(|e| Error::ConfigError(format!("failed to build OTLP exporter: {e}")))?;

    let batch_processor =
        opentelemetry_sdk::trace::BatchSpanProcessor::builder(exporter, runtime::Tokio).build();

    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_config(
            Config::default()
                .with_resource(resource)
                .with_sampler(Sampler::AlwaysOn),
        )
        .with_span_processor(ScrubbingProcessor::new(Box::new(batch_processor)))
        .build();

    let tracer = opentelemetry::trace::TracerProvider::tracer(&provider, SERVICE_NAME);
    global::set_tracer_provider(provider);

    Ok(tracing_opentelemetry::layer().with_tracer(tracer).boxed())
}

/// Shutdown OpenTelemetry tracer
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_sdk::trace::Span;

    #[derive(Debug)]
    struct NoopProcessor;

    impl SpanProcessor for NoopProcessor {
        fn on_start(&self, _span: &mut Span, _cx: &opentelemetry::Context) {}

        fn on_end(&self, _span: SpanData) {}

        fn force_flush(&self) -> TraceResult<()> {
            Ok(())
        }

        fn shutdown(&mut self) -> TraceResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_scrubbing_processor_redacts_credentials() {
        let processor = ScrubbingProcessor::new(Box::new(NoopProcessor));

        let mut attributes = vec![
            KeyValue::new("client_secret", "s3cr3t"),
            KeyValue::new("instance_id", "abc123"),
            KeyValue::new("http.request.header.authorization", "Bearer token"),
            KeyValue::new("connection_url", "neo4j+s://abc123.databases.neo4j.io"),
        ];

        processor.scrub_attributes(&mut attributes);

        assert_eq!(attributes[0].value, opentelemetry::Value::String(REDACTED.into()));
        assert_eq!(attributes[1].value, opentelemetry::Value::String("abc123".into()));
        assert_eq!(attributes[2].value, opentelemetry::Value::String(REDACTED.into()));
        assert_eq!(attributes[3].value, opentelemetry::Value::String(REDACTED.into()));
    }

    #[test]
    fn test_sensitive_key_matching() {
        assert!(is_sensitive("Password"));
        assert!(is_sensitive("aura.client_id"));
        assert!(!is_sensitive("client_id_key"));
        assert!(!is_sensitive("tenant_id"));
    }
}
