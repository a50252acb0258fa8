//! Mock Model Provider
//!
//! For testing and demo purposes. Answers from a list of substring rules
//! matched against the prompt and records every call it receives.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{AgentError, Result};
use crate::message::{Message, Role};
use crate::provider::{
    CallSettings, Completion, GenerationOptions, LlmProvider, ModelCaller, ModelInfo, ProviderInfo,
};

/// Scripted reply for a matching prompt
#[derive(Clone, Debug)]
pub enum MockReply {
    /// Answer with this text
    Text(String),
    /// Fail with `AgentError::Provider`
    Fail(String),
    /// Echo the last user message back
    Echo,
}

/// One observed call
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub provider_id: Option<String>,
    pub model: Option<String>,
    pub prompt: String,
}

/// Mock provider with substring-matched replies
pub struct MockProvider {
    label: String,
    rules: Vec<(String, MockReply)>,
    fallback: MockReply,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    log: Mutex<Vec<RecordedCall>>,
}

/// Counts a call as in flight until dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockProvider {
    /// Provider that echoes the last user message prefixed with `[label]`
    pub fn echo(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            rules: Vec::new(),
            fallback: MockReply::Echo,
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Reply with `reply` whenever the prompt contains `needle`.
    ///
    /// Rules are checked in insertion order; the first match wins.
    pub fn with_rule(mut self, needle: impl Into<String>, reply: MockReply) -> Self {
        self.rules.push((needle.into(), reply));
        self
    }

    /// Reply used when no rule matches
    pub fn with_fallback(mut self, reply: MockReply) -> Self {
        self.fallback = reply;
        self
    }

    /// Sleep before answering (for timeout and cancellation tests)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of calls received so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most calls that were ever running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Every call received so far, oldest first
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.log.lock().await.clone()
    }

    async fn answer(
        &self,
        provider_id: Option<&str>,
        messages: &[Message],
        model: Option<&str>,
    ) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.in_flight);
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.log.lock().await.push(RecordedCall {
            provider_id: provider_id.map(str::to_string),
            model: model.map(str::to_string),
            prompt: prompt.clone(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map_or(&self.fallback, |(_, reply)| reply);

        let model = model.unwrap_or("mock").to_string();
        match reply {
            MockReply::Text(text) => Ok(Completion::text(model, text.clone())),
            MockReply::Fail(msg) => Err(AgentError::Provider(msg.clone())),
            MockReply::Echo => {
                let last_user = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map_or("(no input)", |m| m.content.as_str());
                Ok(Completion::text(model, format!("[{}] {}", self.label, last_user)))
            }
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn info(&self) -> Result<ProviderInfo> {
        Ok(ProviderInfo {
            name: format!("Mock ({})", self.label),
            version: None,
            models: self.list_models().await?,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        self.answer(None, messages, Some(&options.model)).await
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo {
            id: "mock".into(),
            name: format!("mock-{}", self.label),
            context_length: None,
            supports_vision: false,
        }])
    }
}

#[async_trait]
impl ModelCaller for MockProvider {
    async fn call(
        &self,
        provider_id: &str,
        messages: &[Message],
        settings: &CallSettings,
    ) -> Result<Completion> {
        self.answer(Some(provider_id), messages, settings.model.as_deref()).await
    }
}
