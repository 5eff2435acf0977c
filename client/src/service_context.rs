//! Per-service plugin bundle
//!
//! A [`ServiceContext`] carries the routing, balancing, circuit-breaking,
//! and outlier-detection chains for one service. Instances are handed out
//! as `Arc`s by the context; background executors clone one per sweep and
//! release it by dropping.

use std::fmt;
use std::sync::Arc;

use polaris_core::{
    CircuitBreaker, Criteria, Instance, LoadBalancer, LocalRegistry, OutlierDetector,
    PluginInstance, PluginType, Result, ServiceKey, ServiceRouter, WeightAdjuster,
};
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::metrics::Metrics;

/// Routing, balancing, and health machinery for one service
pub struct ServiceContext {
    key: ServiceKey,
    routers: Vec<Arc<dyn ServiceRouter>>,
    load_balancer: Arc<dyn LoadBalancer>,
    weight_adjuster: Arc<dyn WeightAdjuster>,
    circuit_breakers: CircuitBreakerChain,
    outlier_detectors: OutlierDetectorChain,
    local_registry: Arc<dyn LocalRegistry>,
}

impl ServiceContext {
    /// Assemble the bundle from the consumer config, resolving plugins by name
    pub(crate) fn from_config(
        config: &ClientConfig,
        key: ServiceKey,
        local_registry: Arc<dyn LocalRegistry>,
    ) -> Result<Self> {
        let registry = crate::registry::global();
        let consumer = &config.consumer;

        let mut routers = Vec::with_capacity(consumer.service_router.chain.len());
        for name in &consumer.service_router.chain {
            match registry.get(name, PluginType::ServiceRouter)? {
                PluginInstance::ServiceRouter(router) => routers.push(router),
                other => return Err(super::context::unexpected_category_err(other)),
            }
        }

        let load_balancer =
            match registry.get(&consumer.load_balancer.kind, PluginType::LoadBalancer)? {
                PluginInstance::LoadBalancer(lb) => lb,
                other => return Err(super::context::unexpected_category_err(other)),
            };

        let weight_adjuster =
            match registry.get(&consumer.weight_adjuster, PluginType::WeightAdjuster)? {
                PluginInstance::WeightAdjuster(adjuster) => adjuster,
                other => return Err(super::context::unexpected_category_err(other)),
            };

        let mut breakers = Vec::with_capacity(consumer.circuit_breaker.chain.len());
        for name in &consumer.circuit_breaker.chain {
            match registry.get(name, PluginType::CircuitBreaker)? {
                PluginInstance::CircuitBreaker(breaker) => breakers.push(breaker),
                other => return Err(super::context::unexpected_category_err(other)),
            }
        }

        let mut detectors = Vec::new();
        if consumer.outlier_detection.enable {
            detectors.reserve(consumer.outlier_detection.chain.len());
            for name in &consumer.outlier_detection.chain {
                match registry.get(name, PluginType::OutlierDetector)? {
                    PluginInstance::OutlierDetector(detector) => detectors.push(detector),
                    other => return Err(super::context::unexpected_category_err(other)),
                }
            }
        }

        Ok(Self {
            outlier_detectors: OutlierDetectorChain {
                key: key.clone(),
                detectors,
                local_registry: local_registry.clone(),
            },
            circuit_breakers: CircuitBreakerChain { breakers },
            key,
            routers,
            load_balancer,
            weight_adjuster,
            local_registry,
        })
    }

    /// Which service this bundle serves
    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    /// The outlier-detection chain
    pub fn outlier_detector_chain(&self) -> &OutlierDetectorChain {
        &self.outlier_detectors
    }

    /// The circuit-breaker chain
    pub fn circuit_breaker_chain(&self) -> &CircuitBreakerChain {
        &self.circuit_breakers
    }

    /// Route, weight-adjust, and pick one instance from the cached snapshot
    pub fn choose_instance(&self, criteria: &Criteria) -> Option<Instance> {
        let snapshot = self.local_registry.instances(&self.key)?;

        let mut candidates = snapshot.instances;
        for router in &self.routers {
            candidates = router.route(criteria, candidates);
        }
        candidates.retain(|instance| self.circuit_breakers.allow(&instance.id));
        for instance in &mut candidates {
            instance.weight = self.weight_adjuster.dynamic_weight(instance);
        }

        self.load_balancer.choose_instance(criteria, &candidates)
    }
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext").field("key", &self.key).finish()
    }
}

/// Ordered list of circuit breakers for one service
pub struct CircuitBreakerChain {
    breakers: Vec<Arc<dyn CircuitBreaker>>,
}

impl CircuitBreakerChain {
    /// Feed one call outcome to every breaker
    pub fn report_outcome(&self, instance_id: &str, success: bool) {
        for breaker in &self.breakers {
            breaker.report_outcome(instance_id, success);
        }
    }

    /// Calls are allowed only when every breaker allows them
    pub fn allow(&self, instance_id: &str) -> bool {
        self.breakers.iter().all(|breaker| breaker.allow(instance_id))
    }

    /// Run time-based transitions on every breaker
    pub fn periodic_check(&self) {
        for breaker in &self.breakers {
            breaker.periodic_check();
        }
    }
}

/// Ordered list of outlier detectors for one service
pub struct OutlierDetectorChain {
    key: ServiceKey,
    detectors: Vec<Arc<dyn OutlierDetector>>,
    local_registry: Arc<dyn LocalRegistry>,
}

impl OutlierDetectorChain {
    /// Probe every cached instance and publish changed verdicts
    ///
    /// A probe error counts as no verdict: the sweep logs it and moves on,
    /// so one misbehaving detector or instance never blocks the rest.
    pub async fn detect(&self) {
        if self.detectors.is_empty() {
            return;
        }
        let Some(snapshot) = self.local_registry.instances(&self.key) else {
            return;
        };

        for instance in &snapshot.instances {
            if instance.isolated {
                continue;
            }

            let mut verdict = true;
            for detector in &self.detectors {
                match detector.detect_instance(instance).await {
                    Ok(result) => {
                        if !result.healthy {
                            verdict = false;
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(
                            service = %self.key,
                            instance = %instance.id,
                            detector = detector.name(),
                            error = %e,
                            "outlier probe failed"
                        );
                    }
                }
            }

            if verdict != instance.healthy {
                self.local_registry
                    .set_instance_healthy(&self.key, &instance.id, verdict);
                info!(
                    service = %self.key,
                    instance = %instance.id,
                    healthy = verdict,
                    "instance health changed"
                );
            }
            if let Some(metrics) = Metrics::get() {
                metrics.set_instance_healthy(
                    &self.key.namespace,
                    &self.key.name,
                    &instance.id,
                    verdict,
                );
            }
        }
    }
}
