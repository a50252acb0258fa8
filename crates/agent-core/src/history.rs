//! Execution History
//!
//! Durable record of each processed request: what was asked, the execution
//! path the engine took, and the final answer.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

/// One persisted request/response pair
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Unique identifier
    pub id: Uuid,

    /// Owner of the conversation
    pub user_id: String,

    /// Conversation the request belongs to, if any
    pub conversation_id: Option<String>,

    /// Original request text
    pub request: String,

    /// Serialized execution path (plan, step results, tool outputs, trace)
    pub execution_path: serde_json::Value,

    /// Final response text
    pub response: String,

    /// Model that produced the final response
    pub model_used: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(
        user_id: impl Into<String>,
        conversation_id: Option<String>,
        request: impl Into<String>,
        execution_path: serde_json::Value,
        response: impl Into<String>,
        model_used: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            conversation_id,
            request: request.into(),
            execution_path,
            response: response.into(),
            model_used: model_used.into(),
            created_at: Utc::now(),
        }
    }
}

/// Append-only sink for execution history
#[async_trait]
pub trait HistorySink: Send + Sync {
    /// Persist one record
    async fn save(&self, record: HistoryRecord) -> Result<()>;
}

/// Records kept by [`MemoryHistorySink::new`]
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// In-memory history sink (for development/testing).
///
/// Holds at most `capacity` records; the oldest is evicted first.
pub struct MemoryHistorySink {
    records: RwLock<VecDeque<HistoryRecord>>,
    capacity: usize,
}

impl Default for MemoryHistorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHistorySink {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records matching the filters, newest first
    pub async fn list(
        &self,
        user_id: Option<&str>,
        conversation_id: Option<&str>,
        limit: usize,
    ) -> Vec<HistoryRecord> {
        let records = self.records.read().await;
        records
            .iter()
            .rev()
            .filter(|r| user_id.is_none_or(|uid| r.user_id == uid))
            .filter(|r| conversation_id.is_none_or(|cid| r.conversation_id.as_deref() == Some(cid)))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Check if empty
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl HistorySink for MemoryHistorySink {
    async fn save(&self, record: HistoryRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
        Ok(())
    }
}
