//! Default stat reporter

use std::sync::Arc;
use std::time::Duration;

use polaris_core::{ApiKind, Plugin, PluginInstance, ReturnCode, StatReporter};
use tracing::debug;

use crate::metrics::Metrics;

pub(crate) fn prometheus_stat_reporter() -> PluginInstance {
    PluginInstance::StatReporter(Arc::new(PrometheusStatReporter))
}

/// Feeds per-call accounting into the process-wide prometheus registry
///
/// When metrics have not been initialized the record degrades to a debug
/// log line, so embedding without a metrics endpoint stays silent but
/// functional.
pub struct PrometheusStatReporter;

impl Plugin for PrometheusStatReporter {
    fn name(&self) -> &'static str {
        "prometheus"
    }
}

impl StatReporter for PrometheusStatReporter {
    fn report_api_call(&self, api: ApiKind, code: ReturnCode, latency: Duration) {
        match Metrics::get() {
            Some(metrics) => metrics.record_api_call(api, code, latency),
            None => debug!(
                api = api.as_str(),
                code = code.as_str(),
                latency_ms = latency.as_millis() as u64,
                "api call finished"
            ),
        }
    }
}
