//! # agent-runtime
//!
//! Runtime providers for the agent orchestration engine.
//!
//! ## Providers
//!
//! - **Ollama** (default): Local LLM inference via Ollama
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::{discover_capabilities, OllamaProvider, OLLAMA_PROVIDER_ID};
//!
//! let mut router = ProviderRouter::new();
//! router.register(OLLAMA_PROVIDER_ID, Arc::new(OllamaProvider::from_env()));
//! let models = discover_capabilities(&router, &[]).await;
//! let registry = CapabilityRegistry::with_preferences(models, tools, &config);
//! ```

pub mod discovery;

#[cfg(feature = "ollama")]
pub mod ollama;

pub use discovery::{describe, discover_capabilities, infer_tags};

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaProvider, OLLAMA_PROVIDER_ID};

// Re-export core types for convenience
pub use agent_core::{AgentError, LlmProvider, Message, ProviderRouter, Result, Role};
