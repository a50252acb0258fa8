//! Orchestrator Configuration
//!
//! Loaded from a JSON file and/or environment variables. Every field has a
//! default so a partial file is enough.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use agent_core::AgentError;

/// Bounded retry for the analyzer and synthesizer calls
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first; 1 disables retry
    #[serde(default = "default_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles after each retry
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_attempts() -> u32 { 1 }
fn default_backoff_ms() -> u64 { 500 }

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self::default()
    }

    pub fn attempts(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_ms,
        }
    }

    /// Delay before attempt number `attempt` (1-based; attempt 1 has none)
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u64 << (attempt - 2).min(16);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

/// Engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Capability tag → provider ids in order of preference
    #[serde(default = "default_preferences")]
    pub preferences: HashMap<String, Vec<String>>,

    /// Upper bound on concurrently running steps / tool calls
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Timeout for each individual model or tool call
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Overall deadline for one request; `None` means no deadline
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: Option<u64>,

    /// Cap on dependency output embedded in a step prompt
    #[serde(default = "default_max_dependency_chars")]
    pub max_dependency_chars: usize,

    /// Cap on prior context embedded in a prompt
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    /// Sampling temperature for step and synthesis calls
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Sampling temperature for the analysis call
    #[serde(default = "default_analysis_temperature")]
    pub analysis_temperature: f32,

    /// Maximum tokens to generate per call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub analysis_retry: RetryPolicy,

    #[serde(default)]
    pub synthesis_retry: RetryPolicy,
}

fn default_max_concurrency() -> usize { 4 }
fn default_call_timeout_secs() -> u64 { 120 }
#[allow(clippy::unnecessary_wraps)]
fn default_request_timeout_secs() -> Option<u64> { Some(600) }
fn default_max_dependency_chars() -> usize { 4000 }
fn default_max_context_chars() -> usize { 4000 }
fn default_temperature() -> f32 { 0.7 }
fn default_analysis_temperature() -> f32 { 0.2 }
fn default_max_tokens() -> u32 { 2048 }

fn default_preferences() -> HashMap<String, Vec<String>> {
    let table: [(&str, &[&str]); 7] = [
        ("code", &["deepseek", "openai", "claude", "ollama"]),
        ("reasoning", &["claude", "openai", "deepseek", "ollama"]),
        ("data", &["openai", "claude", "deepseek", "ollama"]),
        ("visual", &["openai", "claude", "ollama"]),
        ("general", &["openai", "claude", "deepseek", "ollama"]),
        ("analysis", &["openai", "claude", "deepseek", "ollama"]),
        ("synthesis", &["claude", "openai", "deepseek", "ollama"]),
    ];
    table
        .into_iter()
        .map(|(tag, providers)| {
            (tag.to_string(), providers.iter().map(|p| (*p).to_string()).collect())
        })
        .collect()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            preferences: default_preferences(),
            max_concurrency: default_max_concurrency(),
            call_timeout_secs: default_call_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_dependency_chars: default_max_dependency_chars(),
            max_context_chars: default_max_context_chars(),
            temperature: default_temperature(),
            analysis_temperature: default_analysis_temperature(),
            max_tokens: default_max_tokens(),
            analysis_retry: RetryPolicy::default(),
            synthesis_retry: RetryPolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Load from a JSON file; missing fields take defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> agent_core::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validated()
    }

    /// Apply `AGENT_*` environment overrides on top of `self`
    pub fn with_env_overrides(mut self) -> agent_core::Result<Self> {
        if let Some(n) = env_parse::<usize>("AGENT_MAX_CONCURRENCY")? {
            self.max_concurrency = n;
        }
        if let Some(secs) = env_parse::<u64>("AGENT_CALL_TIMEOUT_SECS")? {
            self.call_timeout_secs = secs;
        }
        if let Some(secs) = env_parse::<u64>("AGENT_REQUEST_TIMEOUT_SECS")? {
            self.request_timeout_secs = (secs > 0).then_some(secs);
        }
        self.validated()
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> agent_core::Result<Self> {
        Self::default().with_env_overrides()
    }

    fn validated(self) -> agent_core::Result<Self> {
        if self.max_concurrency == 0 {
            return Err(AgentError::Config("max_concurrency must be at least 1".into()));
        }
        if self.call_timeout_secs == 0 {
            return Err(AgentError::Config("call_timeout_secs must be at least 1".into()));
        }
        Ok(self)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> agent_core::Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AgentError::Config(format!("{} is not a valid value: '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.preferences["code"], vec!["deepseek", "openai", "claude", "ollama"]);
        assert_eq!(config.analysis_retry.max_attempts, 1);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: OrchestratorConfig = serde_json::from_str(
            r#"{"max_concurrency": 1, "preferences": {"general": ["ollama"]}}"#,
        )
        .unwrap();
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.preferences.len(), 1);
        assert_eq!(config.call_timeout_secs, 120);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = OrchestratorConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(config.validated(), Err(AgentError::Config(_))));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::attempts(4, 100);
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(100));
        assert_eq!(policy.delay_before(3), Duration::from_millis(200));
        assert_eq!(policy.delay_before(4), Duration::from_millis(400));
    }
}
