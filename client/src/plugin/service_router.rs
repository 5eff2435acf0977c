//! Routing stages
//!
//! Routers narrow the candidate set before load balancing. Each one
//! degrades to the full input rather than returning nothing: an empty
//! candidate set downstream would turn a routing preference into an
//! outage.

use std::sync::Arc;

use polaris_core::{Criteria, Instance, Plugin, PluginInstance, ServiceRouter};
use tracing::debug;

pub(crate) fn health_router() -> PluginInstance {
    PluginInstance::ServiceRouter(Arc::new(HealthRouter))
}

pub(crate) fn metadata_router() -> PluginInstance {
    PluginInstance::ServiceRouter(Arc::new(MetadataRouter))
}

pub(crate) fn nearby_router() -> PluginInstance {
    PluginInstance::ServiceRouter(Arc::new(NearbyRouter))
}

/// Filters unhealthy and isolated instances
///
/// When every instance is down the full set comes back: a uniformly dead
/// view usually means detection is wrong or the service is restarting, and
/// sending traffic beats sending none.
pub struct HealthRouter;

impl Plugin for HealthRouter {
    fn name(&self) -> &'static str {
        "healthRouter"
    }
}

impl ServiceRouter for HealthRouter {
    fn route(&self, _criteria: &Criteria, instances: Vec<Instance>) -> Vec<Instance> {
        let alive: Vec<Instance> = instances
            .iter()
            .filter(|i| i.healthy && !i.isolated)
            .cloned()
            .collect();
        if alive.is_empty() {
            debug!("no healthy instances, recovering to the full set");
            return instances;
        }
        alive
    }
}

/// Keeps instances whose metadata contains every caller label
pub struct MetadataRouter;

impl Plugin for MetadataRouter {
    fn name(&self) -> &'static str {
        "metadataRouter"
    }
}

impl ServiceRouter for MetadataRouter {
    fn route(&self, criteria: &Criteria, instances: Vec<Instance>) -> Vec<Instance> {
        if criteria.metadata.is_empty() {
            return instances;
        }
        let matched: Vec<Instance> = instances
            .iter()
            .filter(|instance| {
                criteria
                    .metadata
                    .iter()
                    .all(|(k, v)| instance.metadata.get(k) == Some(v))
            })
            .cloned()
            .collect();
        if matched.is_empty() {
            debug!("no metadata match, recovering to the full set");
            return instances;
        }
        matched
    }
}

/// Prefers instances in the caller's zone, then region
pub struct NearbyRouter;

impl NearbyRouter {
    fn filter_by(key: &str, wanted: &str, instances: &[Instance]) -> Vec<Instance> {
        instances
            .iter()
            .filter(|i| i.metadata.get(key).map(String::as_str) == Some(wanted))
            .cloned()
            .collect()
    }
}

impl Plugin for NearbyRouter {
    fn name(&self) -> &'static str {
        "nearbyRouter"
    }
}

impl ServiceRouter for NearbyRouter {
    fn route(&self, criteria: &Criteria, instances: Vec<Instance>) -> Vec<Instance> {
        if let Some(zone) = criteria.metadata.get("zone") {
            let same_zone = Self::filter_by("zone", zone, &instances);
            if !same_zone.is_empty() {
                return same_zone;
            }
        }
        if let Some(region) = criteria.metadata.get("region") {
            let same_region = Self::filter_by("region", region, &instances);
            if !same_region.is_empty() {
                return same_region;
            }
        }
        instances
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn mixed_health() -> Vec<Instance> {
        vec![
            Instance::new("up", "10.0.0.1", 80),
            Instance::new("down", "10.0.0.2", 80).with_healthy(false),
            Instance::new("isolated", "10.0.0.3", 80).with_isolated(true),
        ]
    }

    fn criteria_with(pairs: &[(&str, &str)]) -> Criteria {
        Criteria {
            hash_key: None,
            metadata: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn health_router_filters_dead_and_isolated() {
        let routed = HealthRouter.route(&Criteria::default(), mixed_health());
        let ids: Vec<&str> = routed.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["up"]);
    }

    #[test]
    fn health_router_recovers_when_everything_is_down() {
        let all_down = vec![
            Instance::new("a", "10.0.0.1", 80).with_healthy(false),
            Instance::new("b", "10.0.0.2", 80).with_healthy(false),
        ];
        let routed = HealthRouter.route(&Criteria::default(), all_down);
        assert_eq!(routed.len(), 2, "all-dead view recovers to the full set");
    }

    #[test]
    fn metadata_router_matches_all_labels() {
        let instances = vec![
            Instance::new("blue", "10.0.0.1", 80)
                .with_metadata("version", "v2")
                .with_metadata("env", "prod"),
            Instance::new("green", "10.0.0.2", 80).with_metadata("version", "v1"),
        ];
        let routed =
            MetadataRouter.route(&criteria_with(&[("version", "v2"), ("env", "prod")]), instances);
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].id, "blue");
    }

    #[test]
    fn metadata_router_passes_through_without_labels() {
        let routed = MetadataRouter.route(&Criteria::default(), mixed_health());
        assert_eq!(routed.len(), 3);
    }

    #[test]
    fn metadata_router_recovers_on_no_match() {
        let instances = vec![Instance::new("only", "10.0.0.1", 80)];
        let routed = MetadataRouter.route(&criteria_with(&[("version", "v9")]), instances);
        assert_eq!(routed.len(), 1, "no match recovers to the full set");
    }

    #[test]
    fn nearby_router_prefers_zone_over_region() {
        let instances = vec![
            Instance::new("same-zone", "10.0.0.1", 80)
                .with_metadata("region", "eu")
                .with_metadata("zone", "eu-1a"),
            Instance::new("same-region", "10.0.0.2", 80)
                .with_metadata("region", "eu")
                .with_metadata("zone", "eu-1b"),
            Instance::new("far", "10.0.0.3", 80).with_metadata("region", "us"),
        ];

        let routed = NearbyRouter.route(
            &criteria_with(&[("region", "eu"), ("zone", "eu-1a")]),
            instances.clone(),
        );
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].id, "same-zone");

        // No zone match: fall back to region affinity.
        let routed = NearbyRouter.route(
            &criteria_with(&[("region", "eu"), ("zone", "eu-9z")]),
            instances.clone(),
        );
        let ids: Vec<&str> = routed.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["same-zone", "same-region"]);

        // No affinity at all: keep everything.
        let routed = NearbyRouter.route(&Criteria::default(), instances);
        assert_eq!(routed.len(), 3);
    }
}
