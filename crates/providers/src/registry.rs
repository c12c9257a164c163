//! Provider registry — configured providers plus their live health.
//!
//! Static descriptor data is fixed at startup. Health is the only state
//! shared across requests and is updated under a per-provider mutex, so
//! concurrent failures never lose an update.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use synapse_config::AppConfig;
use synapse_core::provider::Provider;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::openai_compat::OpenAiCompatProvider;
use crate::static_reply::StaticProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unavailable,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Emits incremental fragments; otherwise served through the buffered path.
    pub streaming: bool,
}

/// Startup-time description of one provider.
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub name: String,
    pub priority: u32,
    pub models: Vec<String>,
    pub default_model: Option<String>,
    pub capabilities: Capabilities,
    pub timeout: Duration,
}

impl ProviderSpec {
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            priority,
            models: Vec::new(),
            default_model: None,
            capabilities: Capabilities { streaming: true },
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_models(mut self, models: &[&str]) -> Self {
        self.models = models.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn non_streaming(mut self) -> Self {
        self.capabilities.streaming = false;
        self
    }
}

/// Point-in-time snapshot of a provider, health included.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderDescriptor {
    pub name: String,
    pub priority: u32,
    pub models: Vec<String>,
    pub default_model: Option<String>,
    pub capabilities: Capabilities,
    pub health: HealthStatus,
    pub consecutive_failures: u32,
    pub last_failure: Option<DateTime<Utc>>,
    pub timeout_secs: f64,
}

#[derive(Debug)]
struct HealthState {
    status: HealthStatus,
    consecutive_failures: u32,
    last_failure: Option<DateTime<Utc>>,
    last_failure_at: Option<Instant>,
}

pub(crate) struct Entry {
    pub(crate) spec: ProviderSpec,
    pub(crate) provider: Arc<dyn Provider>,
    health: Mutex<HealthState>,
}

pub struct ProviderRegistry {
    entries: Vec<Entry>,
    cooldown: Duration,
}

impl ProviderRegistry {
    /// `cooldown` is how long an unavailable provider is skipped before it
    /// is offered again as degraded.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            entries: Vec::new(),
            cooldown,
        }
    }

    /// Register a provider. Entries stay ordered by priority, then
    /// registration order.
    pub fn register(&mut self, spec: ProviderSpec, provider: Arc<dyn Provider>) -> &mut Self {
        self.entries.push(Entry {
            spec,
            provider,
            health: Mutex::new(HealthState {
                status: HealthStatus::Healthy,
                consecutive_failures: 0,
                last_failure: None,
                last_failure_at: None,
            }),
        });
        self.entries.sort_by_key(|e| e.spec.priority);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn provider(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.find(name).map(|e| e.provider.clone())
    }

    fn find(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.spec.name == name)
    }

    /// Snapshots of every provider in priority order.
    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        self.entries.iter().map(|e| self.describe(e)).collect()
    }

    pub fn descriptor(&self, name: &str) -> Option<ProviderDescriptor> {
        self.find(name).map(|e| self.describe(e))
    }

    fn describe(&self, entry: &Entry) -> ProviderDescriptor {
        let state = lock(&entry.health);
        ProviderDescriptor {
            name: entry.spec.name.clone(),
            priority: entry.spec.priority,
            models: entry.spec.models.clone(),
            default_model: entry.spec.default_model.clone(),
            capabilities: entry.spec.capabilities,
            health: self.effective(&state),
            consecutive_failures: state.consecutive_failures,
            last_failure: state.last_failure,
            timeout_secs: entry.spec.timeout.as_secs_f64(),
        }
    }

    /// Status used for selection: unavailable providers past the cooldown
    /// are offered again as degraded.
    fn effective(&self, state: &HealthState) -> HealthStatus {
        match (state.status, state.last_failure_at) {
            (HealthStatus::Unavailable, Some(at)) if at.elapsed() >= self.cooldown => {
                HealthStatus::Degraded
            }
            (status, _) => status,
        }
    }

    pub fn status(&self, name: &str) -> Option<HealthStatus> {
        self.find(name).map(|e| self.effective(&lock(&e.health)))
    }

    /// True when at least one provider is not unavailable.
    pub fn any_available(&self) -> bool {
        self.entries
            .iter()
            .any(|e| self.effective(&lock(&e.health)) != HealthStatus::Unavailable)
    }

    /// Reset a provider to healthy after a successful call.
    pub fn record_success(&self, name: &str) {
        let Some(entry) = self.find(name) else {
            return;
        };
        let mut state = lock(&entry.health);
        if state.status != HealthStatus::Healthy {
            info!(provider = %name, "Provider recovered");
        }
        state.status = HealthStatus::Healthy;
        state.consecutive_failures = 0;
    }

    /// Count a failed call; `threshold` consecutive failures make the
    /// provider unavailable. Returns the new status.
    pub fn record_failure(&self, name: &str, threshold: u32) -> Option<HealthStatus> {
        let entry = self.find(name)?;
        let mut state = lock(&entry.health);
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure = Some(Utc::now());
        state.last_failure_at = Some(Instant::now());
        state.status = if state.consecutive_failures >= threshold.max(1) {
            HealthStatus::Unavailable
        } else {
            HealthStatus::Degraded
        };
        if state.status == HealthStatus::Unavailable {
            warn!(
                provider = %name,
                failures = state.consecutive_failures,
                "Provider marked unavailable"
            );
        }
        Some(state.status)
    }
}

/// Every update leaves the state consistent, so a poisoned lock is still usable.
fn lock(m: &Mutex<HealthState>) -> std::sync::MutexGuard<'_, HealthState> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Build the registry from configuration.
pub fn build_from_config(config: &AppConfig) -> ProviderRegistry {
    let mut registry =
        ProviderRegistry::new(Duration::from_secs(config.router.unavailable_cooldown_secs));

    for pc in &config.providers {
        let timeout =
            Duration::from_secs(pc.timeout_secs.unwrap_or(config.router.attempt_timeout_secs));

        let (provider, streaming): (Arc<dyn Provider>, bool) = match pc.kind.as_str() {
            "static" => (
                Arc::new(StaticProvider::new(
                    &pc.name,
                    pc.reply.clone().unwrap_or_default(),
                )),
                false,
            ),
            _ => {
                let base_url = pc.api_url.clone().unwrap_or_default();
                let api_key = pc.api_key.clone().unwrap_or_default();
                (
                    Arc::new(OpenAiCompatProvider::new(&pc.name, base_url, api_key)),
                    pc.streaming,
                )
            }
        };

        let spec = ProviderSpec {
            name: pc.name.clone(),
            priority: pc.priority,
            models: pc.models.clone(),
            default_model: pc.default_model.clone(),
            capabilities: Capabilities { streaming },
            timeout,
        };
        registry.register(spec, provider);
    }

    info!(count = registry.len(), "Provider registry built");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use synapse_config::ProviderConfig;

    fn registry() -> ProviderRegistry {
        let mut r = ProviderRegistry::new(Duration::from_secs(30));
        r.register(
            ProviderSpec::new("backup", 5),
            Arc::new(StaticProvider::new("backup", "b")),
        );
        r.register(
            ProviderSpec::new("primary", 0),
            Arc::new(StaticProvider::new("primary", "p")),
        );
        r.register(
            ProviderSpec::new("secondary", 5),
            Arc::new(StaticProvider::new("secondary", "s")),
        );
        r
    }

    #[test]
    fn descriptors_are_priority_then_insertion_ordered() {
        let names: Vec<_> = registry()
            .descriptors()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["primary", "backup", "secondary"]);
    }

    #[test]
    fn failures_escalate_to_unavailable() {
        let r = registry();
        assert_eq!(r.record_failure("primary", 2), Some(HealthStatus::Degraded));
        assert_eq!(r.record_failure("primary", 2), Some(HealthStatus::Unavailable));
        let d = r.descriptor("primary").unwrap();
        assert_eq!(d.health, HealthStatus::Unavailable);
        assert_eq!(d.consecutive_failures, 2);
        assert!(d.last_failure.is_some());
    }

    #[test]
    fn success_resets_health() {
        let r = registry();
        r.record_failure("primary", 3);
        r.record_success("primary");
        let d = r.descriptor("primary").unwrap();
        assert_eq!(d.health, HealthStatus::Healthy);
        assert_eq!(d.consecutive_failures, 0);
    }

    #[test]
    fn unknown_provider_is_ignored() {
        let r = registry();
        assert_eq!(r.record_failure("ghost", 1), None);
        r.record_success("ghost");
        assert!(r.status("ghost").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_becomes_half_open_after_cooldown() {
        let r = registry();
        r.record_failure("primary", 1);
        assert_eq!(r.status("primary"), Some(HealthStatus::Unavailable));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(r.status("primary"), Some(HealthStatus::Degraded));
    }

    #[test]
    fn any_available_tracks_health() {
        let mut r = ProviderRegistry::new(Duration::from_secs(30));
        assert!(!r.any_available());
        r.register(
            ProviderSpec::new("only", 0),
            Arc::new(StaticProvider::new("only", "x")),
        );
        assert!(r.any_available());
        r.record_failure("only", 1);
        assert!(!r.any_available());
    }

    #[test]
    fn build_from_config_maps_kinds() {
        let mut config = AppConfig::default();
        config.providers = vec![
            ProviderConfig::openai_compatible(
                "ollama",
                "http://localhost:11434/v1",
                None,
                "llama3.1",
                10,
            ),
            ProviderConfig::static_reply("static", "hello", 100),
        ];
        config.router.attempt_timeout_secs = 45;

        let r = build_from_config(&config);
        let ds = r.descriptors();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds[0].name, "ollama");
        assert!(ds[0].capabilities.streaming);
        assert_eq!(ds[0].default_model.as_deref(), Some("llama3.1"));
        assert!((ds[0].timeout_secs - 45.0).abs() < f64::EPSILON);
        assert!(!ds[1].capabilities.streaming);
        assert!(r.provider("static").is_some());
    }
}
