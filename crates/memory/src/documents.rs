//! In-process document index with paragraph chunking and keyword search.

use async_trait::async_trait;
use std::sync::Arc;
use synapse_core::error::RetrievalError;
use synapse_core::memory::Snippet;
use synapse_core::retrieval::{Document, DocumentIndex};
use tokio::sync::RwLock;
use tracing::debug;

use crate::keyword;

#[derive(Debug, Clone)]
struct Chunk {
    document_id: String,
    ordinal: usize,
    title: String,
    content: String,
}

/// Split on blank lines; a document with no paragraph breaks is one chunk.
pub fn paragraphs(content: &str) -> Vec<String> {
    content
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

pub struct InMemoryDocumentIndex {
    chunks: Arc<RwLock<Vec<Chunk>>>,
}

impl InMemoryDocumentIndex {
    pub fn new() -> Self {
        Self {
            chunks: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryDocumentIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentIndex for InMemoryDocumentIndex {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Snippet>, RetrievalError> {
        let chunks = self.chunks.read().await;
        let query_terms = keyword::terms(query);
        let scored = chunks
            .iter()
            .map(|c| (keyword::score(&query_terms, &c.content), c))
            .filter(|(s, _)| *s > 0.0)
            .collect();

        Ok(keyword::rank(scored, limit)
            .into_iter()
            .map(|(score, c)| Snippet {
                id: format!("{}#{}", c.document_id, c.ordinal),
                content: c.content.clone(),
                source: Some(format!("{}#{}", c.title, c.ordinal)),
                score,
            })
            .collect())
    }

    async fn ingest(&self, document: Document) -> Result<usize, RetrievalError> {
        let parts = paragraphs(&document.content);
        if parts.is_empty() {
            return Err(RetrievalError::IndexingFailed(
                "document content is empty".into(),
            ));
        }

        let count = parts.len();
        let mut chunks = self.chunks.write().await;
        chunks.retain(|c| c.document_id != document.id);
        chunks.extend(parts.into_iter().enumerate().map(|(i, content)| Chunk {
            document_id: document.id.clone(),
            ordinal: i,
            title: document.title.clone(),
            content,
        }));
        debug!(document_id = %document.id, chunks = count, "Document indexed");
        Ok(count)
    }

    async fn delete(&self, document_id: &str) -> Result<bool, RetrievalError> {
        let mut chunks = self.chunks.write().await;
        let len_before = chunks.len();
        chunks.retain(|c| c.document_id != document_id);
        Ok(chunks.len() < len_before)
    }
}
