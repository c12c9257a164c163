//! Request orchestration for Synapse.
//!
//! A request flows through three stages:
//! 1. [`ContextAssembler`] builds a bounded prompt from instructions, memory,
//!    retrieved documents, and history.
//! 2. The provider router picks an upstream and falls back on failure.
//! 3. [`CompletionStreamer`] turns upstream output into completion chunks.
//!
//! [`Orchestrator`] drives the three for both buffered and streamed requests.

pub mod context;
pub mod orchestrator;
pub mod streamer;

pub use context::{AssembledContext, AssemblerSettings, BlockOrigin, ContextAssembler};
pub use orchestrator::{CompletionStream, Orchestrator, OrchestratorSettings};
pub use streamer::{word_fragments, CompletionStreamer, Sink, StreamReport, StreamState};
