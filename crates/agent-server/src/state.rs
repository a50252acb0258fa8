//! Application State

use std::sync::Arc;

use agent_core::{MemoryHistorySink, ProviderRouter, ToolRegistry};
use agent_orchestrator::{CapabilityDescriptor, CapabilityRegistry, Orchestrator, OrchestratorConfig};
use agent_runtime::discover_capabilities;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// The orchestration engine
    pub orchestrator: Arc<Orchestrator>,

    /// Model providers by id; also the orchestrator's model caller
    pub router: Arc<ProviderRouter>,

    /// Tools offered to every plan
    pub tools: ToolRegistry,

    /// Models declared in configuration rather than discovered
    pub configured_models: Arc<Vec<CapabilityDescriptor>>,

    /// Execution history written by the orchestrator; in memory, bounded,
    /// lost on restart
    pub history: Arc<MemoryHistorySink>,
}

impl AppState {
    /// Discover models and assemble the orchestrator
    pub async fn build(
        router: ProviderRouter,
        tools: ToolRegistry,
        config: OrchestratorConfig,
        configured_models: Vec<CapabilityDescriptor>,
    ) -> Self {
        let router = Arc::new(router);
        let history = Arc::new(MemoryHistorySink::new());

        let models = discover_capabilities(&router, &configured_models).await;
        let registry = CapabilityRegistry::with_preferences(models, tools.clone(), &config);

        let orchestrator = Orchestrator::new(router.clone(), registry, config).with_history(history.clone());

        Self {
            orchestrator: Arc::new(orchestrator),
            router,
            tools,
            configured_models: Arc::new(configured_models),
            history,
        }
    }

    /// Rediscover models and swap the registry; returns the new registry
    pub async fn refresh(&self) -> Arc<CapabilityRegistry> {
        let models = discover_capabilities(&self.router, &self.configured_models).await;
        let registry = CapabilityRegistry::with_preferences(models, self.tools.clone(), self.orchestrator.config());
        self.orchestrator.refresh_registry(registry).await;
        self.orchestrator.registry().await
    }
}
