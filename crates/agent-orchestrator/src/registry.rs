//! Capability Registry
//!
//! Catalog of the models and tools a plan may use, plus the strategy that
//! picks a model for a capability tag. Read-only once built; swap the whole
//! registry to refresh it.

use std::collections::HashMap;
use std::sync::Arc;

use agent_core::ToolRegistry;

use crate::config::OrchestratorConfig;
use crate::model::{CapabilityDescriptor, CapabilityKind};

/// Picks the model that should serve a capability tag
pub trait SelectionStrategy: Send + Sync {
    fn select<'a>(
        &self,
        tag: &str,
        models: &'a [CapabilityDescriptor],
    ) -> Option<&'a CapabilityDescriptor>;
}

/// First-available selection over a per-tag ranked list of provider ids
#[derive(Clone, Debug, Default)]
pub struct RankedPreference {
    preferences: HashMap<String, Vec<String>>,
}

impl RankedPreference {
    pub fn new(preferences: HashMap<String, Vec<String>>) -> Self {
        Self { preferences }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.preferences.clone())
    }

    /// Provider ids ranked for `tag`; empty when the tag is unknown
    pub fn ranking(&self, tag: &str) -> &[String] {
        self.preferences.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl SelectionStrategy for RankedPreference {
    fn select<'a>(
        &self,
        tag: &str,
        models: &'a [CapabilityDescriptor],
    ) -> Option<&'a CapabilityDescriptor> {
        self.ranking(tag)
            .iter()
            .find_map(|provider| models.iter().find(|m| &m.provider_id == provider))
    }
}

/// Models and tools available to plans
#[derive(Clone)]
pub struct CapabilityRegistry {
    models: Vec<CapabilityDescriptor>,
    tool_descriptors: Vec<CapabilityDescriptor>,
    tools: ToolRegistry,
    strategy: Arc<dyn SelectionStrategy>,
}

impl CapabilityRegistry {
    /// Build a registry; tool descriptors are derived from the tool schemas
    pub fn new(
        models: Vec<CapabilityDescriptor>,
        tools: ToolRegistry,
        strategy: Arc<dyn SelectionStrategy>,
    ) -> Self {
        let models: Vec<CapabilityDescriptor> = models
            .into_iter()
            .filter(|m| {
                let is_model = m.kind == CapabilityKind::Model;
                if !is_model {
                    tracing::warn!(identifier = %m.identifier, "Ignoring non-model descriptor in model list");
                }
                is_model
            })
            .collect();

        let tool_descriptors = tools
            .schemas()
            .into_iter()
            .map(|schema| CapabilityDescriptor::tool(schema.name, schema.capability_tags))
            .collect();

        Self {
            models,
            tool_descriptors,
            tools,
            strategy,
        }
    }

    /// Registry using ranked provider preferences from `config`
    pub fn with_preferences(
        models: Vec<CapabilityDescriptor>,
        tools: ToolRegistry,
        config: &OrchestratorConfig,
    ) -> Self {
        Self::new(models, tools, Arc::new(RankedPreference::from_config(config)))
    }

    pub fn list_models(&self) -> &[CapabilityDescriptor] {
        &self.models
    }

    pub fn list_tools(&self) -> &[CapabilityDescriptor] {
        &self.tool_descriptors
    }

    /// Best model for `tag` per the selection strategy; `None` if nothing fits
    pub fn find_best_for_tag(&self, tag: &str) -> Option<&CapabilityDescriptor> {
        self.strategy.select(tag, &self.models)
    }

    /// Tool descriptor by exact name
    pub fn find_tool(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.tool_descriptors.iter().find(|t| t.identifier == name)
    }

    /// First registered model; last-resort fallback
    pub fn first_model(&self) -> Option<&CapabilityDescriptor> {
        self.models.first()
    }

    /// Tool invokers backing the tool descriptors
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn has_models(&self) -> bool {
        !self.models.is_empty()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("models", &self.models)
            .field("tools", &self.tool_descriptors)
            .finish_non_exhaustive()
    }
}
