//! Weight adjustment

use std::sync::Arc;

use polaris_core::{Instance, Plugin, PluginInstance, WeightAdjuster};

pub(crate) fn static_weight_adjuster() -> PluginInstance {
    PluginInstance::WeightAdjuster(Arc::new(StaticWeightAdjuster))
}

/// Pass-through adjuster: the control-plane weight is the effective weight
pub struct StaticWeightAdjuster;

impl Plugin for StaticWeightAdjuster {
    fn name(&self) -> &'static str {
        "static"
    }
}

impl WeightAdjuster for StaticWeightAdjuster {
    fn dynamic_weight(&self, instance: &Instance) -> u32 {
        instance.weight
    }
}
