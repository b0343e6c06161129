use std::sync::atomic::AtomicU64;
use std::sync::LazyLock;

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_with_registry,
};
use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Registry as PrometheusRegistry, TextEncoder,
};
use tracing::error;

use crate::command::server::Error;

pub static IN_FLIGHT_REQUESTS: AtomicU64 = AtomicU64::new(0);

pub static METRICS_PROVIDER: LazyLock<MetricsProvider> =
    LazyLock::new(|| MetricsProvider::new().expect("Unable to create metrics provider"));

pub struct MetricsProvider {
    registry: PrometheusRegistry,
    pub metric_http_request_total: IntCounterVec,
    pub metric_http_request_duration: HistogramVec,
    pub metric_http_request_in_flight: IntGauge,
    pub metric_redirect_total: IntCounterVec,
    pub metric_blob_cache_lookup_total: IntCounterVec,
    pub metric_blob_probe_total: IntCounterVec,
}

fn initialization_error(name: &str, error: &prometheus::Error) -> Error {
    error!("Unable to create {name} metric: {error}");
    Error::Initialization(format!("Unable to create {name} metric"))
}

impl MetricsProvider {
    pub fn new() -> Result<Self, Error> {
        let registry = PrometheusRegistry::new();

        let metric_http_request_total = register_int_counter_vec_with_registry!(
            "http_requests_total",
            "Total number of HTTP requests made.",
            &["method", "route", "status"],
            &registry
        )
        .map_err(|error| initialization_error("http_requests_total", &error))?;

        let metric_http_request_duration = register_histogram_vec_with_registry!(
            "http_request_duration_ms",
            "The HTTP request latencies in milliseconds.",
            &["method", "route"],
            &registry
        )
        .map_err(|error| initialization_error("http_request_duration_ms", &error))?;

        let metric_http_request_in_flight = register_int_gauge_with_registry!(
            "http_requests_in_flight",
            "The current number of in-flight HTTP requests.",
            &registry
        )
        .map_err(|error| initialization_error("http_requests_in_flight", &error))?;

        let metric_redirect_total = register_int_counter_vec_with_registry!(
            "redirects_total",
            "Total number of redirects issued, by target.",
            &["target"],
            &registry
        )
        .map_err(|error| initialization_error("redirects_total", &error))?;

        let metric_blob_cache_lookup_total = register_int_counter_vec_with_registry!(
            "blob_cache_lookups_total",
            "Blob existence lookups, by how they were answered.",
            &["result"],
            &registry
        )
        .map_err(|error| initialization_error("blob_cache_lookups_total", &error))?;

        let metric_blob_probe_total = register_int_counter_vec_with_registry!(
            "blob_probes_total",
            "Blob existence probes sent to mirrors, by outcome.",
            &["outcome"],
            &registry
        )
        .map_err(|error| initialization_error("blob_probes_total", &error))?;

        Ok(Self {
            registry,
            metric_http_request_total,
            metric_http_request_duration,
            metric_http_request_in_flight,
            metric_redirect_total,
            metric_blob_cache_lookup_total,
            metric_blob_probe_total,
        })
    }

    pub fn gather(&self) -> Result<(String, Vec<u8>), Error> {
        let mut buffer = vec![];
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|error| Error::Execution(format!("Unable to encode metrics: {error}")))?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}
