//! Periodic outlier-detection sweep

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::debug;

use crate::context::Context;
use crate::reactor::{Reactor, ReactorHandle};

/// Cadence of the detection sweep
const DETECT_INTERVAL: Duration = Duration::from_secs(1);

/// Drives every service's outlier-detector chain at a fixed cadence
pub(crate) struct OutlierDetectionExecutor {
    context: Weak<Context>,
    reactor: ReactorHandle,
}

impl OutlierDetectionExecutor {
    /// Spawn the executor's reactor and seed the detection cycle
    pub(crate) fn start(
        context: Weak<Context>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let (handle, reactor) = Reactor::new();
        let join = tokio::spawn(reactor.run(shutdown));

        let executor = Arc::new(Self {
            context,
            reactor: handle,
        });
        executor.setup_work();
        join
    }

    fn setup_work(self: &Arc<Self>) {
        if self.reactor.submit_task(timing_detect(self.clone())).is_err() {
            debug!("reactor closed before the initial detect task");
        }
    }

    /// One sweep over every live service sub-context
    ///
    /// Each sub-context reference acquired here is released when the loop
    /// iteration drops it, whatever the chain did.
    async fn detect_all(&self) {
        let Some(context) = self.context.upgrade() else {
            return;
        };
        for service in context.service_contexts() {
            service.outlier_detector_chain().detect().await;
        }
    }
}

fn timing_detect(
    executor: Arc<OutlierDetectionExecutor>,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        executor.detect_all().await;
        let reactor = executor.reactor.clone();
        if reactor
            .add_timing_task(DETECT_INTERVAL, timing_detect(executor))
            .is_err()
        {
            debug!("reactor closed, outlier detection cycle ends");
        }
    })
}
