//! Provider router — selects providers for a request and falls back in
//! priority order on failure.
//!
//! Every attempt runs under its own timeout. A streaming attempt counts as
//! accepted once the upstream yields its first fragment; anything that goes
//! wrong before that is an ordinary fallback failure.

use std::sync::Arc;
use std::time::Duration;
use synapse_config::AppConfig;
use synapse_core::error::{AttemptFailure, Error, ProviderError};
use synapse_core::provider::{FragmentReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk};
use tracing::{debug, info, warn};

use crate::registry::{HealthStatus, ProviderRegistry};

/// Fallback limits.
#[derive(Debug, Clone, Copy)]
pub struct RouterPolicy {
    /// Upper bound on upstream calls per request.
    pub max_attempts: usize,
    /// Consecutive failures before a provider is marked unavailable.
    pub failure_threshold: u32,
}

impl Default for RouterPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            failure_threshold: 3,
        }
    }
}

impl From<&AppConfig> for RouterPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.router.max_attempts,
            failure_threshold: config.router.failure_threshold,
        }
    }
}

/// Where the accepted attempt's output comes from.
pub enum FragmentSource {
    /// Incremental upstream fragments; `first` has already been received.
    Streaming {
        first: StreamChunk,
        rest: FragmentReceiver,
    },
    /// A complete response from a non-streaming call.
    Buffered(ProviderResponse),
}

/// The accepted attempt.
pub struct Routed {
    pub provider: String,
    /// Model name sent upstream.
    pub model: String,
    pub source: FragmentSource,
    /// Failures of earlier attempts in this request.
    pub failures: Vec<AttemptFailure>,
}

/// One entry of a request's fallback chain.
#[derive(Clone)]
pub struct Candidate {
    pub name: String,
    pub provider: Arc<dyn Provider>,
    pub upstream_model: String,
    pub timeout: Duration,
    pub streaming: bool,
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Candidate")
            .field("name", &self.name)
            .field("upstream_model", &self.upstream_model)
            .field("timeout", &self.timeout)
            .field("streaming", &self.streaming)
            .finish()
    }
}

pub struct ProviderRouter {
    registry: Arc<ProviderRegistry>,
    policy: RouterPolicy,
}

impl ProviderRouter {
    pub fn new(registry: Arc<ProviderRegistry>, policy: RouterPolicy) -> Self {
        Self { registry, policy }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> RouterPolicy {
        self.policy
    }

    /// The ordered fallback chain for `model`.
    ///
    /// Providers serving `model` by exact name come first; if none do, every
    /// provider forms the default chain. Unavailable providers are skipped
    /// unless nothing else is left.
    pub fn candidates(&self, model: &str) -> Vec<Candidate> {
        let entries = self.registry.entries();
        let exact: Vec<_> = entries
            .iter()
            .filter(|e| e.spec.models.iter().any(|m| m == model))
            .collect();
        let exact_match = !exact.is_empty();
        let chain = if exact_match {
            exact
        } else {
            entries.iter().collect()
        };

        let to_candidate = |e: &&crate::registry::Entry| Candidate {
            name: e.spec.name.clone(),
            provider: e.provider.clone(),
            upstream_model: if exact_match {
                model.to_string()
            } else {
                e.spec
                    .default_model
                    .clone()
                    .unwrap_or_else(|| model.to_string())
            },
            timeout: e.spec.timeout,
            streaming: e.spec.capabilities.streaming,
        };

        let available: Vec<Candidate> = chain
            .iter()
            .filter(|e| self.registry.status(&e.spec.name) != Some(HealthStatus::Unavailable))
            .map(to_candidate)
            .collect();

        let mut selected = if available.is_empty() {
            // Health may be stale; try the unavailable ones rather than nothing.
            chain.iter().map(to_candidate).collect()
        } else {
            available
        };
        selected.truncate(self.policy.max_attempts.max(1));
        selected
    }

    /// Run the fallback chain until one attempt is accepted.
    pub async fn route(&self, request: &ProviderRequest, want_stream: bool) -> Result<Routed, Error> {
        let candidates = self.candidates(&request.model);
        let total = candidates.len();
        let mut failures = Vec::new();

        for (i, candidate) in candidates.into_iter().enumerate() {
            let stream = want_stream && candidate.streaming;
            let mut upstream = request.clone();
            upstream.model = candidate.upstream_model.clone();
            upstream.stream = stream;

            info!(
                provider = %candidate.name,
                model = %upstream.model,
                attempt = i + 1,
                total,
                stream,
                "Router: trying provider"
            );

            let result = if stream {
                attempt_stream(&candidate, upstream).await
            } else {
                attempt_complete(&candidate, upstream).await
            };

            match result {
                Ok(source) => {
                    self.registry.record_success(&candidate.name);
                    return Ok(Routed {
                        provider: candidate.name,
                        model: candidate.upstream_model,
                        source,
                        failures,
                    });
                }
                Err(error) => {
                    let status = self.record_failure(&candidate.name, &error);
                    warn!(
                        provider = %candidate.name,
                        attempt = i + 1,
                        class = error.class(),
                        health = status.map(|s| s.as_str()).unwrap_or("unknown"),
                        error = %error,
                        "Router: provider failed, trying next"
                    );
                    failures.push(AttemptFailure {
                        provider: candidate.name,
                        error,
                    });
                }
            }
        }

        warn!(attempts = failures.len(), "Router: all providers exhausted");
        Err(Error::AllProvidersExhausted { attempts: failures })
    }

    /// Count a failure against `provider`, e.g. one that broke mid-stream.
    pub fn record_failure(&self, provider: &str, error: &ProviderError) -> Option<HealthStatus> {
        debug!(provider, class = error.class(), "Recording provider failure");
        self.registry
            .record_failure(provider, self.policy.failure_threshold)
    }
}

async fn attempt_complete(
    candidate: &Candidate,
    request: ProviderRequest,
) -> Result<FragmentSource, ProviderError> {
    match tokio::time::timeout(candidate.timeout, candidate.provider.complete(request)).await {
        Ok(Ok(response)) => Ok(FragmentSource::Buffered(response)),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(timed_out(candidate)),
    }
}

async fn attempt_stream(
    candidate: &Candidate,
    request: ProviderRequest,
) -> Result<FragmentSource, ProviderError> {
    let accept = async {
        let mut rest = candidate.provider.stream(request).await?;
        match rest.recv().await {
            Some(Ok(first)) => Ok(FragmentSource::Streaming { first, rest }),
            Some(Err(e)) => Err(e),
            None => Err(ProviderError::StreamInterrupted(
                "stream closed before the first fragment".into(),
            )),
        }
    };

    match tokio::time::timeout(candidate.timeout, accept).await {
        Ok(result) => result,
        Err(_) => Err(timed_out(candidate)),
    }
}

fn timed_out(candidate: &Candidate) -> ProviderError {
    ProviderError::Timeout(format!(
        "provider '{}' gave no response within {:?}",
        candidate.name, candidate.timeout
    ))
}
