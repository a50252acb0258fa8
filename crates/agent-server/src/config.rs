//! Server Configuration
//!
//! Read from the environment (after `.env` is loaded). An optional JSON file
//! named by `AGENT_CONFIG` supplies the orchestrator settings and any
//! statically declared models:
//!
//! ```json
//! {
//!   "orchestrator": { "max_concurrency": 2, "preferences": { "code": ["ollama"] } },
//!   "models": [{ "kind": "model", "provider_id": "ollama", "identifier": "qwen2.5-coder", "capability_tags": ["code"] }]
//! }
//! ```

use agent_orchestrator::{CapabilityDescriptor, OrchestratorConfig};
use agent_runtime::OllamaConfig;
use anyhow::Context;
use serde::Deserialize;

/// Contents of the `AGENT_CONFIG` file
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    orchestrator: OrchestratorConfig,

    #[serde(default)]
    models: Vec<CapabilityDescriptor>,
}

/// Everything the server needs at startup
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub ollama: OllamaConfig,

    /// Serve from the scripted mock provider instead of Ollama
    pub mock: bool,

    pub orchestrator: OrchestratorConfig,

    /// Models declared in the config file, added to discovered ones
    pub models: Vec<CapabilityDescriptor>,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let file = match std::env::var("AGENT_CONFIG") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading AGENT_CONFIG file {}", path))?;
                serde_json::from_str::<FileConfig>(&raw)
                    .with_context(|| format!("parsing AGENT_CONFIG file {}", path))?
            }
            Err(_) => FileConfig::default(),
        };

        let orchestrator = file
            .orchestrator
            .with_env_overrides()
            .context("invalid orchestrator configuration")?;

        let mock = std::env::var("AGENT_MOCK")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into()),
            ollama: OllamaConfig::from_env(),
            mock,
            orchestrator,
            models: file.models,
        })
    }
}
