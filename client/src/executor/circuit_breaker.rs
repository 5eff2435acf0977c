//! Periodic circuit-breaker state transitions

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::debug;

use crate::context::Context;
use crate::reactor::{Reactor, ReactorHandle};

/// Cadence of the breaker check
const CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Drives every service's circuit-breaker chain at a fixed cadence
///
/// Breakers trip inline as outcomes are reported; this executor only runs
/// the time-based transitions (open window expiry into half-open).
pub(crate) struct CircuitBreakerExecutor {
    context: Weak<Context>,
    reactor: ReactorHandle,
}

impl CircuitBreakerExecutor {
    /// Spawn the executor's reactor and seed the check cycle
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
        if executor
            .reactor
            .submit_task(timing_check(executor.clone()))
            .is_err()
        {
            debug!("reactor closed before the initial breaker check");
        }
        join
    }

    fn check_all(&self) {
        let Some(context) = self.context.upgrade() else {
            return;
        };
        for service in context.service_contexts() {
            service.circuit_breaker_chain().periodic_check();
        }
    }
}

fn timing_check(
    executor: Arc<CircuitBreakerExecutor>,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        executor.check_all();
        let reactor = executor.reactor.clone();
        if reactor
            .add_timing_task(CHECK_INTERVAL, timing_check(executor))
            .is_err()
        {
            debug!("reactor closed, circuit breaker cycle ends");
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::context::ContextMode;
    use polaris_core::{
        CircuitBreaker, Plugin, PluginDescriptor, PluginInstance, PluginType, ServiceKey,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    static CHECKS: AtomicUsize = AtomicUsize::new(0);

    struct CheckCounter;

    impl Plugin for CheckCounter {
        fn name(&self) -> &'static str {
            "checkCounter"
        }
    }

    impl CircuitBreaker for CheckCounter {
        fn report_outcome(&self, _instance_id: &str, _success: bool) {}

        fn allow(&self, _instance_id: &str) -> bool {
            true
        }

        fn periodic_check(&self) {
            CHECKS.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn check_counter() -> PluginInstance {
        PluginInstance::CircuitBreaker(Arc::new(CheckCounter))
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_checks_run_periodically() {
        crate::registry::global()
            .register(PluginDescriptor {
                name: "checkCounter",
                plugin_type: PluginType::CircuitBreaker,
                load_balance: None,
                construct: check_counter,
            })
            .unwrap();

        let mut config = ClientConfig::default();
        config.consumer.circuit_breaker.chain = vec!["checkCounter".to_string()];
        let context = crate::context::Context::new(config, ContextMode::Private).unwrap();
        context.service_context(&ServiceKey::new("ns", "svc")).unwrap();

        CHECKS.store(0, Ordering::SeqCst);
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(CHECKS.load(Ordering::SeqCst), 1, "seed check runs once");

        tokio::time::advance(Duration::from_secs(2)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(CHECKS.load(Ordering::SeqCst) >= 2);

        context.shutdown().await;
    }
}
