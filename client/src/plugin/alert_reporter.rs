//! Default alert reporter

use std::sync::Arc;

use polaris_core::{AlertLevel, AlertReporter, Plugin, PluginInstance};
use tracing::{error, warn};

pub(crate) fn log_alert_reporter() -> PluginInstance {
    PluginInstance::AlertReporter(Arc::new(LogAlertReporter))
}

/// Routes alerts into the process log
pub struct LogAlertReporter;

impl Plugin for LogAlertReporter {
    fn name(&self) -> &'static str {
        "log"
    }
}

impl AlertReporter for LogAlertReporter {
    fn report_alert(&self, level: AlertLevel, message: &str) {
        match level {
            AlertLevel::Warn => warn!(alert = message, "polaris alert"),
            AlertLevel::Error => error!(alert = message, "polaris alert"),
        }
    }
}
