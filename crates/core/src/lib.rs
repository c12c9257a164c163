//! # Synapse Core
//!
//! Domain types, collaborator traits, and error definitions for the Synapse
//! inference gateway. This crate has **no HTTP or storage dependencies**: it
//! defines the model that the provider, memory, orchestrator, and gateway
//! crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (model provider, memory store, document
//! index) is a trait here. Implementations live in their own crates, which
//! keeps the request path testable with in-process mocks and lets the
//! gateway swap backends through configuration.

pub mod completion;
pub mod error;
pub mod memory;
pub mod message;
pub mod provider;
pub mod retrieval;

// Re-export key types at crate root for ergonomics
pub use completion::{
    ChatCompletion, Choice, CompletionChunk, CompletionId, Delta, FinishReason, OutcomeError,
    RequestOutcome, UsageRecord,
};
pub use error::{AttemptFailure, Error, MemoryError, ProviderError, Result, RetrievalError};
pub use memory::{MemoryBackend, MemoryEntry, Snippet};
pub use message::{ChatRequest, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use retrieval::{Document, DocumentIndex};
