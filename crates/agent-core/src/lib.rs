//! # agent-core
//!
//! Collaborator contracts for the agent orchestration engine: model
//! providers, tools, context providers and history sinks.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Orchestration Engine                      │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │ ModelCaller │  │    Tools    │  │ Context / History   │  │
//! │  │  (Router)   │  │   Registry  │  │     Providers       │  │
//! │  └──────┬──────┘  └─────────────┘  └─────────────────────┘  │
//! │         │                                                    │
//! │  ┌──────┴──────────────────────────┐                         │
//! │  │ LlmProvider (Ollama, OpenAI...) │                         │
//! │  └─────────────────────────────────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait enables swapping between Ollama, OpenAI, Anthropic,
//! or any other provider without changing engine logic.

pub mod provider;
pub mod tool;
pub mod message;
pub mod error;
pub mod context;
pub mod history;
pub mod mock;

pub use context::{ContextItem, ContextProvider, ResolvedContext, StaticContextProvider};
pub use error::{AgentError, Result};
pub use history::{HistoryRecord, HistorySink, MemoryHistorySink};
pub use message::{Message, Role};
pub use provider::{CallSettings, Completion, LlmProvider, ModelCaller, ProviderRouter};
pub use tool::{Tool, ToolRegistry, ToolSchema};
