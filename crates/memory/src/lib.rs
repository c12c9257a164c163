//! Memory and document-retrieval collaborators for Synapse.

pub mod documents;
pub mod in_memory;
pub mod keyword;
pub mod noop;

pub use documents::InMemoryDocumentIndex;
pub use in_memory::InMemoryMemory;
pub use noop::{NoopDocumentIndex, NoopMemory};

use std::sync::Arc;
use synapse_core::memory::MemoryBackend;
use synapse_core::retrieval::DocumentIndex;

/// Construct the memory store and document index for a backend name.
///
/// Returns `None` for an unknown backend.
pub fn create_backends(
    backend: &str,
) -> Option<(Arc<dyn MemoryBackend>, Arc<dyn DocumentIndex>)> {
    match backend {
        "in_memory" => Some((
            Arc::new(InMemoryMemory::new()),
            Arc::new(InMemoryDocumentIndex::new()),
        )),
        "none" => Some((Arc::new(NoopMemory), Arc::new(NoopDocumentIndex))),
        _ => None,
    }
}
