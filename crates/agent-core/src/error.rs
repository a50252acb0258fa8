//! Error Types

use thiserror::Error;

/// Result type alias for collaborator operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors raised by the engine's collaborators (model providers, tools,
/// context providers, history sinks)
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error (non-2xx, malformed body, empty completion)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable, unknown, or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Tool not found in registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Call exceeded its time budget
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Caller cancelled the request
    #[error("Cancelled")]
    Cancelled,

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Persistence error from a history sink
    #[error("History error: {0}")]
    History(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::ProviderUnavailable(_)
                | AgentError::RateLimited(_)
                | AgentError::Timeout(_)
                | AgentError::Io(_)
        )
    }

    /// Whether the caller gave up on the request
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentError::Cancelled)
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Provider(msg) => format!("The AI service encountered an error: {}", msg),
            AgentError::ProviderUnavailable(_) => "The AI service is currently unavailable. Please try again.".into(),
            AgentError::ToolNotFound(name) => format!("The tool '{}' is not available.", name),
            AgentError::ToolExecution(msg) => format!("Tool error: {}", msg),
            AgentError::Timeout(_) => "The AI service took too long to respond.".into(),
            AgentError::Cancelled => "The request was cancelled.".into(),
            AgentError::RateLimited(_) => "You've made too many requests. Please wait a moment.".into(),
            AgentError::Auth(_) => "Authentication failed. Please check your credentials.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}
