use axum::{routing::get, Router};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::warn;

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder once per process and describe the series.
    ///
    /// A second install (another recorder already set) falls back to a detached
    /// handle so building several routers in one process never panics.
    pub fn init() -> Self {
        static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();
        let handle = HANDLE
            .get_or_init(|| {
                let handle = PrometheusBuilder::new().install_recorder().unwrap_or_else(|e| {
                    warn!(error = %e, "prometheus recorder not installed; /metrics will be empty");
                    PrometheusBuilder::new().build_recorder().handle()
                });
                describe();
                handle
            })
            .clone();
        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe() {
    describe_counter!(
        "analysis_requests_total",
        "Analysis requests that reached the orchestrator, by mode."
    );
    describe_counter!(
        "analysis_failures_total",
        "Analysis requests that ended in a typed error, by kind."
    );
    describe_counter!(
        "edge_rate_limited_total",
        "Requests rejected by the per-address edge limiter."
    );
    describe_counter!(
        "usage_rate_limited_total",
        "Requests rejected by the per-identity usage ledger."
    );
    describe_histogram!("llm_call_duration_ms", "Model call latency in milliseconds.");
}

pub(crate) fn record_request(mode: &'static str) {
    counter!("analysis_requests_total", "mode" => mode).increment(1);
}

pub(crate) fn record_failure(kind: &'static str) {
    counter!("analysis_failures_total", "kind" => kind).increment(1);
}

pub(crate) fn record_edge_limited() {
    counter!("edge_rate_limited_total").increment(1);
}

pub(crate) fn record_usage_limited() {
    counter!("usage_rate_limited_total").increment(1);
}

pub(crate) fn record_llm_latency(ms: f64) {
    histogram!("llm_call_duration_ms").record(ms);
}
