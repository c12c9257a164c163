//! Model provider implementations, registry, and fallback routing for Synapse.
//!
//! All providers implement the `synapse_core::Provider` trait.
//! The router picks candidates from the registry and falls back on failure.

pub mod openai_compat;
pub mod registry;
pub mod router;
pub mod static_reply;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use openai_compat::OpenAiCompatProvider;
pub use registry::{
    build_from_config, Capabilities, HealthStatus, ProviderDescriptor, ProviderRegistry,
    ProviderSpec,
};
pub use router::{Candidate, FragmentSource, ProviderRouter, Routed, RouterPolicy};
pub use static_reply::StaticProvider;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockProvider;
