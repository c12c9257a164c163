//! No-op backends — disable memory and retrieval entirely.

use async_trait::async_trait;
use synapse_core::error::{MemoryError, RetrievalError};
use synapse_core::memory::{MemoryBackend, Snippet};
use synapse_core::retrieval::DocumentIndex;

/// A memory backend that recalls nothing.
pub struct NoopMemory;

#[async_trait]
impl MemoryBackend for NoopMemory {
    fn name(&self) -> &str {
        "none"
    }

    async fn recall(
        &self,
        _user_id: &str,
        _query: &str,
        _limit: usize,
    ) -> Result<Vec<Snippet>, MemoryError> {
        Ok(Vec::new())
    }
}

/// A document index that finds nothing.
pub struct NoopDocumentIndex;

#[async_trait]
impl DocumentIndex for NoopDocumentIndex {
    fn name(&self) -> &str {
        "none"
    }

    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<Snippet>, RetrievalError> {
        Ok(Vec::new())
    }
}
