//! Agent Orchestration HTTP Server
//!
//! Axum-based server exposing the orchestration engine over a REST API.

mod config;
mod handlers;
mod routes;
mod state;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::mock::MockProvider;
use agent_core::tool::{CalculatorTool, DateTimeTool, ToolRegistry};
use agent_core::ProviderRouter;
use agent_runtime::{OllamaProvider, OLLAMA_PROVIDER_ID};

use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = ServerConfig::from_env()?;

    // Initialize model providers
    let mut providers = ProviderRouter::new();
    if config.mock {
        tracing::warn!("⚠ AGENT_MOCK set - serving from the scripted mock provider");
        providers.register(OLLAMA_PROVIDER_ID, Arc::new(MockProvider::echo("mock")));
    } else {
        let ollama = OllamaProvider::from_config(config.ollama.clone());
        tracing::info!("Using Ollama at {}", ollama.endpoint());
        providers.register(OLLAMA_PROVIDER_ID, Arc::new(ollama));
    }

    for (id, connected) in providers.health().await {
        if connected {
            tracing::info!("✓ Provider {} connected", id);
        } else {
            tracing::warn!("⚠ Provider {} not available - requests routed to it will fail", id);
        }
    }

    // Initialize tools
    let mut tools = ToolRegistry::new();
    tools.register(DateTimeTool);
    tools.register(CalculatorTool);

    tracing::info!("Registered {} tools:", tools.len());
    for name in tools.names() {
        tracing::info!("  • {}", name);
    }

    // Build application state (discovers models)
    let state = AppState::build(providers, tools, config.orchestrator.clone(), config.models.clone()).await;
    let registry = state.orchestrator.registry().await;
    if registry.has_models() {
        for model in registry.list_models() {
            tracing::info!("  Model: {}", model.qualified_name());
        }
    } else {
        tracing::warn!("⚠ No models discovered - agent requests will return NO_CAPABLE_MODEL");
        tracing::warn!("  Make sure Ollama is running: ollama serve");
    }

    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 agent server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                    - Health check");
    tracing::info!("  GET  /api/capabilities          - Registered models and tools");
    tracing::info!("  POST /api/capabilities/refresh  - Rediscover models");
    tracing::info!("  POST /api/agent                 - Run a request");
    tracing::info!("  GET  /api/history               - Execution history");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
