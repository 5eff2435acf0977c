//! Background executors
//!
//! Each executor owns one reactor and keeps itself scheduled on it: an
//! immediate task seeds the cycle, and every firing re-arms the next one.
//! Executors hold only a `Weak` reference to the context; when the context
//! goes away the cycle ends on its own, and context shutdown stops the
//! reactors through a shared watch channel.

mod circuit_breaker;
mod outlier_detection;

pub(crate) use circuit_breaker::CircuitBreakerExecutor;
pub(crate) use outlier_detection::OutlierDetectionExecutor;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::context::Context;

/// The running executors of one context
pub(crate) struct ExecutorSet {
    shutdown: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl ExecutorSet {
    /// Signal shutdown without waiting
    pub(crate) fn signal(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signal shutdown and wait for every reactor to exit
    pub(crate) async fn stop(self) {
        let _ = self.shutdown.send(true);
        for join in self.joins {
            let _ = join.await;
        }
    }
}

/// Start the executor set for a freshly built context
pub(crate) fn start(context: &Arc<Context>) -> ExecutorSet {
    let (shutdown, _) = watch::channel(false);
    let joins = vec![
        OutlierDetectionExecutor::start(Arc::downgrade(context), shutdown.subscribe()),
        CircuitBreakerExecutor::start(Arc::downgrade(context), shutdown.subscribe()),
    ];
    ExecutorSet { shutdown, joins }
}
