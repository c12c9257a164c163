//! In-memory backend — per-user memories kept in process.
//!
//! Useful for testing, single-node deployments, and ephemeral sessions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use synapse_core::error::MemoryError;
use synapse_core::memory::{MemoryBackend, MemoryEntry, Snippet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::keyword;

/// An in-memory backend that stores memories per user.
pub struct InMemoryMemory {
    entries: Arc<RwLock<HashMap<String, Vec<MemoryEntry>>>>,
}

impl InMemoryMemory {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn count(&self, user_id: &str) -> usize {
        self.entries
            .read()
            .await
            .get(user_id)
            .map_or(0, Vec::len)
    }
}

impl Default for InMemoryMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryBackend for InMemoryMemory {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn recall(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Snippet>, MemoryError> {
        let entries = self.entries.read().await;
        let Some(user_entries) = entries.get(user_id) else {
            return Ok(Vec::new());
        };

        let query_terms = keyword::terms(query);
        let scored = user_entries
            .iter()
            .map(|e| (keyword::score(&query_terms, &e.content), e))
            .filter(|(s, _)| *s > 0.0)
            .collect();

        Ok(keyword::rank(scored, limit)
            .into_iter()
            .map(|(score, e)| Snippet {
                id: e.id.clone(),
                content: e.content.clone(),
                source: Some(format!("memory:{}", e.kind)),
                score,
            })
            .collect())
    }

    async fn store(&self, mut entry: MemoryEntry) -> Result<String, MemoryError> {
        if entry.content.trim().is_empty() {
            return Err(MemoryError::Storage("memory content is empty".into()));
        }
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        let id = entry.id.clone();
        self.entries
            .write()
            .await
            .entry(entry.user_id.clone())
            .or_default()
            .push(entry);
        Ok(id)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<MemoryEntry>, MemoryError> {
        Ok(self
            .entries
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete(&self, user_id: &str, memory_id: &str) -> Result<bool, MemoryError> {
        let mut entries = self.entries.write().await;
        let Some(user_entries) = entries.get_mut(user_id) else {
            return Ok(false);
        };
        let len_before = user_entries.len();
        user_entries.retain(|e| e.id != memory_id);
        Ok(user_entries.len() < len_before)
    }
}
