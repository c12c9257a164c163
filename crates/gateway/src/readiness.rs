//! Readiness gate.
//!
//! The listener binds before collaborators are confirmed reachable. Until the
//! gate opens, and again once shutdown begins, API routes answer 503 with
//! `Retry-After` instead of queueing requests.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use synapse_core::memory::MemoryBackend;
use synapse_core::retrieval::DocumentIndex;
use tracing::{info, warn};

use crate::SharedState;
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Starting = 0,
    Ready = 1,
    Draining = 2,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
        }
    }
}

#[derive(Debug)]
pub struct Readiness(AtomicU8);

impl Readiness {
    pub fn new() -> Self {
        Self(AtomicU8::new(Phase::Starting as u8))
    }

    pub fn phase(&self) -> Phase {
        match self.0.load(Ordering::Acquire) {
            0 => Phase::Starting,
            1 => Phase::Ready,
            _ => Phase::Draining,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.phase() == Phase::Ready
    }

    /// Open the gate. Has no effect once draining.
    pub fn mark_ready(&self) {
        let _ = self.0.compare_exchange(
            Phase::Starting as u8,
            Phase::Ready as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn mark_draining(&self) {
        self.0.store(Phase::Draining as u8, Ordering::Release);
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

/// Live health of both collaborators.
pub async fn collaborators_healthy(
    memory: &dyn MemoryBackend,
    documents: &dyn DocumentIndex,
) -> (bool, bool) {
    let (m, d) = tokio::join!(memory.health_check(), documents.health_check());
    (m.unwrap_or(false), d.unwrap_or(false))
}

/// Probe collaborators until both answer or `timeout` elapses.
///
/// Returns whether both became reachable.
pub async fn wait_for_collaborators(
    memory: &dyn MemoryBackend,
    documents: &dyn DocumentIndex,
    timeout: Duration,
) -> bool {
    let probe = async {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match collaborators_healthy(memory, documents).await {
                (true, true) => return,
                (m, d) => {
                    warn!(attempt, memory = m, documents = d, "Collaborators not reachable yet");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        }
    };
    tokio::time::timeout(timeout, probe).await.is_ok()
}

/// Run the startup probe, then open the gate.
pub async fn startup(state: SharedState) {
    let timeout = Duration::from_secs(state.config.gateway.startup_timeout_secs);
    let reachable =
        wait_for_collaborators(state.memory.as_ref(), state.documents.as_ref(), timeout).await;
    if reachable {
        info!("Collaborators reachable, accepting traffic");
    } else {
        warn!(
            timeout_secs = timeout.as_secs(),
            "Collaborators still unreachable, accepting traffic in degraded mode"
        );
    }
    state.readiness.mark_ready();
}

/// Reject API traffic unless the gate is open.
pub async fn require_ready(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match state.readiness.phase() {
        Phase::Ready => Ok(next.run(req).await),
        phase => Err(ApiError::not_ready(format!(
            "Service is {}, retry shortly",
            phase.as_str()
        ))),
    }
}
