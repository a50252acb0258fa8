//! LLM Provider Strategy Pattern
//!
//! Two layers of abstraction over model backends:
//!
//! - [`LlmProvider`]: one backend (Ollama, OpenAI, Anthropic, ...).
//! - [`ModelCaller`]: the engine-facing `call(providerId, messages, settings)`
//!   contract. [`ProviderRouter`] implements it by dispatching on provider id.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::{CallSettings, ModelCaller, ProviderRouter};
//!
//! let mut router = ProviderRouter::new();
//! router.register("ollama", Arc::new(OllamaProvider::from_env()));
//!
//! let settings = CallSettings::for_model("llama3.2");
//! let completion = router.call("ollama", &messages, &settings).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::message::Message;

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "llama3.2", "gpt-4", "claude-3-sonnet")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Top-p nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

fn default_temperature() -> f32 { 0.7 }
fn default_max_tokens() -> u32 { 2048 }
fn default_top_p() -> f32 { 0.9 }

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "llama3.2".into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
        }
    }
}

impl GenerationOptions {
    /// Overlay per-call settings on top of these defaults
    pub fn merged(&self, settings: &CallSettings) -> Self {
        Self {
            model: settings.model.clone().unwrap_or_else(|| self.model.clone()),
            temperature: settings.temperature.unwrap_or(self.temperature),
            max_tokens: settings.max_tokens.unwrap_or(self.max_tokens),
            top_p: self.top_p,
        }
    }
}

/// Optional per-call settings; unset fields fall back to provider defaults
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CallSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl CallSettings {
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Response from an LLM completion
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text
    pub content: String,

    /// Model that generated this response
    pub model: String,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,

    /// Finish reason
    pub finish_reason: Option<FinishReason>,
}

impl Completion {
    /// Plain completion with no usage data
    pub fn text(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            usage: None,
            finish_reason: Some(FinishReason::Stop),
        }
    }
}

/// Token usage statistics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason for completion finishing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Error,
}

/// Provider metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Provider name (e.g., "Ollama", "OpenAI")
    pub name: String,

    /// Provider version
    pub version: Option<String>,

    /// Available models
    pub models: Vec<ModelInfo>,
}

/// Information about a model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub context_length: Option<u32>,
    pub supports_vision: bool,
}

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for new LLM backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get provider information and capabilities
    async fn info(&self) -> Result<ProviderInfo>;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// Generate a completion from messages
    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion>;

    /// List available models
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    /// Estimate token count for text (provider-specific tokenization)
    fn estimate_tokens(&self, text: &str) -> u32 {
        // Default: rough estimate of ~4 chars per token
        u32::try_from(text.len() / 4).unwrap_or(u32::MAX)
    }
}

/// Engine-facing model call contract.
///
/// Failures must come back as `Err`; an `Ok` completion is a real answer.
#[async_trait]
pub trait ModelCaller: Send + Sync {
    async fn call(
        &self,
        provider_id: &str,
        messages: &[Message],
        settings: &CallSettings,
    ) -> Result<Completion>;
}

/// Routes model calls to the provider registered under a provider id
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    defaults: GenerationOptions,
}

impl Default for ProviderRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            defaults: GenerationOptions::default(),
        }
    }

    /// Replace the generation defaults applied under per-call settings
    pub fn with_defaults(mut self, defaults: GenerationOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Register a provider under an id (e.g. "ollama", "openai")
    pub fn register(&mut self, provider_id: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider_id.into(), provider);
    }

    /// Get a provider by id
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Registered provider ids, sorted
    pub fn provider_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered providers
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Health of every registered provider; errors count as unhealthy
    pub async fn health(&self) -> Vec<(String, bool)> {
        let mut statuses = Vec::with_capacity(self.providers.len());
        for id in self.provider_ids() {
            let healthy = match self.providers.get(id) {
                Some(provider) => provider.health_check().await.unwrap_or(false),
                None => false,
            };
            statuses.push((id.to_string(), healthy));
        }
        statuses
    }

    /// List models across providers as `(provider_id, model)` pairs.
    ///
    /// A provider that fails to list is skipped.
    pub async fn discover_models(&self) -> Vec<(String, ModelInfo)> {
        let mut found = Vec::new();
        for id in self.provider_ids() {
            let Some(provider) = self.providers.get(id) else { continue };
            match provider.list_models().await {
                Ok(models) => found.extend(models.into_iter().map(|m| (id.to_string(), m))),
                Err(e) => tracing::warn!(provider = %id, error = %e, "Model discovery failed"),
            }
        }
        found
    }
}

#[async_trait]
impl ModelCaller for ProviderRouter {
    async fn call(
        &self,
        provider_id: &str,
        messages: &[Message],
        settings: &CallSettings,
    ) -> Result<Completion> {
        let provider = self.get(provider_id).ok_or_else(|| {
            AgentError::ProviderUnavailable(format!("no provider registered as '{}'", provider_id))
        })?;
        let options = self.defaults.merged(settings);

        tracing::debug!(provider = %provider_id, model = %options.model, "Routing model call");
        provider.complete(messages, &options).await
    }
}
