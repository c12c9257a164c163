//! Memory trait — per-user recall of previously stored facts.
//!
//! The request path only needs `recall`. The management API additionally
//! uses `store`, `list`, and `delete`, which backends may leave unsupported.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// A ranked piece of text returned by memory recall or document search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub id: String,
    pub content: String,
    /// Where the snippet came from (e.g. `"handbook#2"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Relevance score, higher is better.
    pub score: f32,
}

/// A single stored memory for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub user_id: String,
    pub content: String,
    /// Free-form category, e.g. "fact", "preference".
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn new(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            content: content.into(),
            kind: "fact".into(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[async_trait]
pub trait MemoryBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Top `limit` memories for `user_id` relevant to `query`, best first.
    async fn recall(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Snippet>, MemoryError>;

    async fn store(&self, entry: MemoryEntry) -> Result<String, MemoryError> {
        let _ = entry;
        Err(MemoryError::NotSupported(self.name().to_string()))
    }

    async fn list(&self, user_id: &str) -> Result<Vec<MemoryEntry>, MemoryError> {
        let _ = user_id;
        Err(MemoryError::NotSupported(self.name().to_string()))
    }

    /// Returns `Ok(false)` when the entry did not exist.
    async fn delete(&self, user_id: &str, memory_id: &str) -> Result<bool, MemoryError> {
        let _ = (user_id, memory_id);
        Err(MemoryError::NotSupported(self.name().to_string()))
    }

    async fn health_check(&self) -> Result<bool, MemoryError> {
        Ok(true)
    }
}
