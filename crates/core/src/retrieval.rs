//! Document index trait — retrieval of indexed snippets for a query.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;
use crate::memory::Snippet;

/// A document submitted for indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait DocumentIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Top `limit` snippets for `query`, best first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Snippet>, RetrievalError>;

    /// Index a document; returns the number of chunks stored.
    async fn ingest(&self, document: Document) -> Result<usize, RetrievalError> {
        let _ = document;
        Err(RetrievalError::NotSupported(self.name().to_string()))
    }

    /// Returns `Ok(false)` when the document did not exist.
    async fn delete(&self, document_id: &str) -> Result<bool, RetrievalError> {
        let _ = document_id;
        Err(RetrievalError::NotSupported(self.name().to_string()))
    }

    async fn health_check(&self) -> Result<bool, RetrievalError> {
        Ok(true)
    }
}
