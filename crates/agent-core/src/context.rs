//! Context Providers
//!
//! Prior conversation context arrives as opaque reference strings
//! (e.g. `ctx_1a2b3c4d`). A [`ContextProvider`] turns them into text; nothing
//! else looks inside a reference.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One item of prior context attached to a request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextItem {
    /// Opaque reference understood only by the context provider
    pub reference: String,

    /// Inline content; when present no resolution is needed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ContextItem {
    pub fn reference(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            content: None,
        }
    }

    pub fn inline(reference: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            content: Some(content.into()),
        }
    }
}

/// Context after resolution, ready to embed in a prompt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedContext {
    pub reference: String,
    pub content: String,
}

/// Resolves opaque context references to content
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// `Ok(None)` when the reference is unknown
    async fn resolve(&self, reference: &str) -> Result<Option<String>>;
}

/// Fixed reference → content table (for development/testing)
#[derive(Clone, Debug, Default)]
pub struct StaticContextProvider {
    entries: HashMap<String, String>,
}

impl StaticContextProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, reference: impl Into<String>, content: impl Into<String>) -> Self {
        self.entries.insert(reference.into(), content.into());
        self
    }
}

#[async_trait]
impl ContextProvider for StaticContextProvider {
    async fn resolve(&self, reference: &str) -> Result<Option<String>> {
        Ok(self.entries.get(reference).cloned())
    }
}
