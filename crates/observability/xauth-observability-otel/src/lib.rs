//! OpenTelemetry implementation of the authentication metrics sink
//!
//! Counters and provider latencies are recorded through OpenTelemetry and
//! exported in Prometheus text format, either from an axum `/metrics` route or
//! rendered on demand.

use axum::{
    Router, body::Body, extract::State, http::StatusCode, response::Response, routing::get,
};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram, Meter, MeterProvider},
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use std::{sync::Arc, time::Duration};
use tracing::info;
use xauth_core::{AuthMetrics, ClientAuthenticationType, CounterKind};

/// Authentication metrics backed by OpenTelemetry instruments
#[derive(Clone)]
pub struct OtelAuthMetrics {
    auth_events: Counter<u64>,
    provider_latency: Histogram<f64>,
}

impl OtelAuthMetrics {
    /// Create new metrics with a given meter
    pub fn new(meter: &Meter) -> Self {
        Self {
            auth_events: meter
                .u64_counter("xauth_auth_events_total")
                .with_description("Authentication events by type and outcome")
                .build(),
            provider_latency: meter
                .f64_histogram("xauth_provider_latency")
                .with_description("Round trip of provider calls, queueing included")
                .with_unit("s")
                .build(),
        }
    }
}

impl AuthMetrics for OtelAuthMetrics {
    fn increment(&self, auth_type: ClientAuthenticationType, counter: CounterKind) {
        let attributes = [
            KeyValue::new("auth_type", auth_type.as_str()),
            KeyValue::new("event", counter.as_str()),
        ];

        self.auth_events.add(1, &attributes);
    }

    fn record_latency(&self, auth_type: ClientAuthenticationType, latency: Duration) {
        self.provider_latency.record(
            latency.as_secs_f64(),
            &[KeyValue::new("auth_type", auth_type.as_str())],
        );
    }
}

/// Builder for setting up OpenTelemetry with Prometheus
pub struct OtelSetupBuilder {
    service_name: &'static str,
    prometheus_registry: Option<Registry>,
    install_global: bool,
}

impl OtelSetupBuilder {
    /// Create a new builder with the given service name
    pub fn new(service_name: &'static str) -> Self {
        Self {
            service_name,
            prometheus_registry: None,
            install_global: true,
        }
    }

    /// Use an existing Prometheus registry
    pub fn with_prometheus_registry(mut self, registry: Registry) -> Self {
        self.prometheus_registry = Some(registry);
        self
    }

    /// Keep the meter provider out of the global slot
    pub fn without_global_provider(mut self) -> Self {
        self.install_global = false;
        self
    }

    /// Build and initialize OpenTelemetry
    pub fn build(self) -> Result<OtelSetup, Box<dyn std::error::Error>> {
        let prometheus_registry = self.prometheus_registry.unwrap_or_else(Registry::new);

        let prometheus_exporter = opentelemetry_prometheus::exporter()
            .with_registry(prometheus_registry.clone())
            .build()?;

        let meter_provider = SdkMeterProvider::builder()
            .with_reader(prometheus_exporter)
            .build();

        if self.install_global {
            global::set_meter_provider(meter_provider.clone());
        }

        let meter = meter_provider.meter(self.service_name);
        let metrics = Arc::new(OtelAuthMetrics::new(&meter));

        info!(service = self.service_name, "OpenTelemetry metrics initialized");

        Ok(OtelSetup {
            meter_provider: Arc::new(meter_provider),
            prometheus_registry: Arc::new(prometheus_registry),
            metrics,
            service_name: self.service_name.to_string(),
        })
    }
}

/// Result of OpenTelemetry setup
pub struct OtelSetup {
    pub meter_provider: Arc<SdkMeterProvider>,
    pub prometheus_registry: Arc<Registry>,
    pub metrics: Arc<OtelAuthMetrics>,
    pub service_name: String,
}

impl OtelSetup {
    /// The metrics sink to hand to the dispatcher
    pub fn auth_metrics(&self) -> Arc<dyn AuthMetrics> {
        self.metrics.clone()
    }

    /// Create an Axum router for the metrics endpoint
    pub fn metrics_router(&self) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(self.prometheus_registry.clone())
    }

    /// Current metrics in Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let buffer = encode(&self.prometheus_registry)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn encode(registry: &Registry) -> Result<Vec<u8>, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok(buffer)
}

/// Handler for Prometheus metrics endpoint
async fn metrics_handler(
    State(prometheus_registry): State<Arc<Registry>>,
) -> Result<Response<Body>, StatusCode> {
    let buffer = encode(&prometheus_registry).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", TextEncoder::new().format_type())
        .body(Body::from(buffer))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
