//! Bounded prompt assembly.
//!
//! # Block priority
//!
//! | Order | Origin | Trim strategy |
//! |-------|--------|---------------|
//! | 1 | System | Never trimmed; overflow is a request error |
//! | 2 | Memory | Ranked recall, lowest-ranked dropped first |
//! | 3 | Retrieval | Ranked snippets, lowest-ranked dropped first |
//! | 4 | History | Oldest turns dropped first; latest user turn never dropped |

pub mod assembler;
pub mod token;

pub use assembler::{
    AssembledContext, AssemblerSettings, BlockOrigin, ContextAssembler, ContextBlock, DropInfo,
    compose,
};
