//! Prometheus metrics for the polaris client

use polaris_core::{ApiKind, ClientError, Result, ReturnCode};
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, GaugeVec,
    HistogramVec,
};
use std::sync::OnceLock;
use std::time::Duration;

/// Global metrics instance
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// All polaris client metrics
pub struct Metrics {
    /// Finished API calls (by api, return code)
    pub api_calls: CounterVec,

    /// API call latency in seconds (by api)
    pub api_call_duration: HistogramVec,

    /// Latest outlier-detection verdict (1 = healthy, 0 = unhealthy)
    pub instance_healthy: GaugeVec,
}

static INIT_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

impl Metrics {
    /// Initialize metrics (idempotent; call once at startup)
    pub fn init() -> Result<&'static Metrics> {
        if let Some(metrics) = METRICS.get() {
            return Ok(metrics);
        }
        // Serialize first-time registration; a racing second registration
        // of the same metric names would fail spuriously.
        let _guard = INIT_LOCK.lock();
        if let Some(metrics) = METRICS.get() {
            return Ok(metrics);
        }

        let metrics = Metrics {
            api_calls: register_counter_vec!(
                "polaris_api_calls_total",
                "Finished client API calls",
                &["api", "code"]
            )
            .map_err(|e| ClientError::Plugin(format!("metrics: api_calls: {e}")))?,

            api_call_duration: register_histogram_vec!(
                "polaris_api_call_duration_seconds",
                "Client API call latency",
                &["api"],
                vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
            )
            .map_err(|e| ClientError::Plugin(format!("metrics: api_call_duration: {e}")))?,

            instance_healthy: register_gauge_vec!(
                "polaris_instance_healthy",
                "Latest outlier-detection verdict per instance",
                &["namespace", "service", "instance"]
            )
            .map_err(|e| ClientError::Plugin(format!("metrics: instance_healthy: {e}")))?,
        };

        Ok(METRICS.get_or_init(|| metrics))
    }

    /// Get metrics if initialized
    pub fn get() -> Option<&'static Metrics> {
        METRICS.get()
    }

    /// Record one finished API call
    pub fn record_api_call(&self, api: ApiKind, code: ReturnCode, latency: Duration) {
        self.api_calls
            .with_label_values(&[api.as_str(), code.as_str()])
            .inc();
        self.api_call_duration
            .with_label_values(&[api.as_str()])
            .observe(latency.as_secs_f64());
    }

    /// Publish an instance's health verdict
    pub fn set_instance_healthy(
        &self,
        namespace: &str,
        service: &str,
        instance: &str,
        healthy: bool,
    ) {
        self.instance_healthy
            .with_label_values(&[namespace, service, instance])
            .set(if healthy { 1.0 } else { 0.0 });
    }
}
