//! Configuration loading, validation, and management for Synapse.
//!
//! Loads configuration from `$SYNAPSE_CONFIG` or `~/.synapse/config.toml`
//! with environment variable overrides. Validated once at startup and then
//! passed by reference to every component.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// "development" or "production"
    #[serde(default = "default_environment")]
    pub environment: String,

    /// User identifier used when neither the request nor a header names one
    #[serde(default = "default_user")]
    pub default_user: String,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub streaming: StreamingConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    /// Upstream providers, tried in priority order
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Model names advertised by `GET /v1/models`
    #[serde(default = "default_models")]
    pub models: Vec<ModelConfig>,
}

fn default_environment() -> String {
    "development".into()
}
fn default_user() -> String {
    "default".into()
}
fn default_models() -> Vec<ModelConfig> {
    ["synapse", "synapse-fast", "synapse-smart"]
        .into_iter()
        .map(|id| ModelConfig {
            id: id.into(),
            owned_by: default_owner(),
        })
        .collect()
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("environment", &self.environment)
            .field("default_user", &self.default_user)
            .field("gateway", &self.gateway)
            .field("context", &self.context)
            .field("router", &self.router)
            .field("streaming", &self.streaming)
            .field("generation", &self.generation)
            .field("memory", &self.memory)
            .field("providers", &self.providers)
            .field("models", &self.models)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Accepted bearer tokens. Empty means authentication is disabled.
    #[serde(default)]
    pub api_keys: Vec<String>,

    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Header carrying the client-supplied user identity
    #[serde(default = "default_user_header")]
    pub user_header: String,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// How long the startup task waits for collaborators before opening anyway
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,

    /// Upper bound on draining in-flight requests at shutdown
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8000
}
fn default_allowed_origins() -> Vec<String> {
    vec!["*".into()]
}
fn default_user_header() -> String {
    "x-user-id".into()
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}
fn default_startup_timeout() -> u64 {
    30
}
fn default_shutdown_grace() -> u64 {
    15
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_keys: Vec::new(),
            allowed_origins: default_allowed_origins(),
            user_header: default_user_header(),
            max_body_bytes: default_max_body_bytes(),
            startup_timeout_secs: default_startup_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("api_keys", &format!("[{} REDACTED]", self.api_keys.len()))
            .field("allowed_origins", &self.allowed_origins)
            .field("user_header", &self.user_header)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("startup_timeout_secs", &self.startup_timeout_secs)
            .field("shutdown_grace_secs", &self.shutdown_grace_secs)
            .finish()
    }
}

/// Prompt assembly settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Maximum estimated prompt tokens
    #[serde(default = "default_budget")]
    pub budget_tokens: usize,

    /// Operator system prompt, placed before any client system messages
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_top_k")]
    pub memory_top_k: usize,

    #[serde(default = "default_top_k")]
    pub retrieval_top_k: usize,

    /// Deadline for memory and retrieval lookups
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_ms: u64,
}

fn default_budget() -> usize {
    8192
}
fn default_system_prompt() -> String {
    "You are Synapse, a helpful assistant with access to the user's memory and documents.".into()
}
fn default_top_k() -> usize {
    5
}
fn default_lookup_timeout() -> u64 {
    2000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            budget_tokens: default_budget(),
            system_prompt: default_system_prompt(),
            memory_top_k: default_top_k(),
            retrieval_top_k: default_top_k(),
            lookup_timeout_ms: default_lookup_timeout(),
        }
    }
}

/// Fallback policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Consecutive failures before a provider is marked unavailable
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_cooldown")]
    pub unavailable_cooldown_secs: u64,

    /// Per-attempt timeout unless the provider sets its own
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
}

fn default_max_attempts() -> usize {
    3
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_cooldown() -> u64 {
    30
}
fn default_attempt_timeout() -> u64 {
    60
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            failure_threshold: default_failure_threshold(),
            unavailable_cooldown_secs: default_cooldown(),
            attempt_timeout_secs: default_attempt_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Chunks buffered between generation and the client
    #[serde(default = "default_buffer")]
    pub buffer: usize,

    /// Longest gap allowed between upstream fragments
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_buffer() -> usize {
    32
}
fn default_idle_timeout() -> u64 {
    60
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            buffer: default_buffer(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Upper bound accepted for `max_tokens`
    #[serde(default = "default_max_tokens_limit")]
    pub max_tokens_limit: u32,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens_limit() -> u32 {
    32_768
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_temperature: default_temperature(),
            max_tokens_limit: default_max_tokens_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "in_memory" or "none"
    #[serde(default = "default_memory_backend")]
    pub backend: String,
}

fn default_memory_backend() -> String {
    "in_memory".into()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
        }
    }
}

/// One upstream provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,

    /// "openai" (any OpenAI-compatible endpoint) or "static"
    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Upstream model used when the request did not name one of `models`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Model names this provider serves by exact match
    #[serde(default)]
    pub models: Vec<String>,

    /// Lower is tried first
    #[serde(default)]
    pub priority: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(default = "default_true")]
    pub streaming: bool,

    /// Fixed reply for `kind = "static"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

fn default_kind() -> String {
    "openai".into()
}
fn default_true() -> bool {
    true
}

impl ProviderConfig {
    pub fn openai_compatible(
        name: impl Into<String>,
        api_url: impl Into<String>,
        api_key: Option<String>,
        default_model: impl Into<String>,
        priority: u32,
    ) -> Self {
        Self {
            name: name.into(),
            kind: default_kind(),
            api_url: Some(api_url.into()),
            api_key,
            default_model: Some(default_model.into()),
            models: Vec::new(),
            priority,
            timeout_secs: None,
            streaming: true,
            reply: None,
        }
    }

    pub fn static_reply(name: impl Into<String>, reply: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            kind: "static".into(),
            api_url: None,
            api_key: None,
            default_model: None,
            models: Vec::new(),
            priority,
            timeout_secs: None,
            streaming: false,
            reply: Some(reply.into()),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("default_model", &self.default_model)
            .field("models", &self.models)
            .field("priority", &self.priority)
            .field("timeout_secs", &self.timeout_secs)
            .field("streaming", &self.streaming)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    #[serde(default = "default_owner")]
    pub owned_by: String,
}

fn default_owner() -> String {
    "synapse".into()
}

/// Reply served by the placeholder provider when nothing else is configured.
pub const PLACEHOLDER_REPLY: &str =
    "Synapse is running, but no upstream model provider is configured. \
     Set OPENAI_API_KEY, ANTHROPIC_API_KEY, OPENROUTER_API_KEY or OLLAMA_HOST, \
     or add a [[providers]] section to config.toml.";

impl AppConfig {
    /// Load configuration from `$SYNAPSE_CONFIG` or `~/.synapse/config.toml`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file path, apply environment
    /// overrides, then validate.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Providers are provisioned from well-known API key variables only when
    /// the file configured none. A static placeholder is added last if the
    /// chain is still empty.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(env) = non_empty("SYNAPSE_ENVIRONMENT") {
            self.environment = env;
        }
        if let Some(key) = non_empty("SYNAPSE_API_KEY") {
            if !self.gateway.api_keys.contains(&key) {
                self.gateway.api_keys.push(key);
            }
        }
        if let Some(host) = non_empty("SYNAPSE_HOST") {
            self.gateway.host = host;
        }
        if let Some(port) = non_empty("SYNAPSE_PORT") {
            match port.parse() {
                Ok(p) => self.gateway.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid SYNAPSE_PORT"),
            }
        }

        if self.providers.is_empty() {
            if let Some(key) = non_empty("OPENAI_API_KEY") {
                self.providers.push(ProviderConfig::openai_compatible(
                    "openai",
                    "https://api.openai.com/v1",
                    Some(key),
                    "gpt-4o-mini",
                    0,
                ));
            }
            if let Some(key) = non_empty("ANTHROPIC_API_KEY") {
                self.providers.push(ProviderConfig::openai_compatible(
                    "anthropic",
                    "https://api.anthropic.com/v1",
                    Some(key),
                    "claude-sonnet-4-20250514",
                    1,
                ));
            }
            if let Some(key) = non_empty("OPENROUTER_API_KEY") {
                self.providers.push(ProviderConfig::openai_compatible(
                    "openrouter",
                    "https://openrouter.ai/api/v1",
                    Some(key),
                    "openai/gpt-4o-mini",
                    2,
                ));
            }
            if let Some(host) = non_empty("OLLAMA_HOST") {
                let base = format!("{}/v1", host.trim_end_matches('/'));
                self.providers.push(ProviderConfig::openai_compatible(
                    "ollama", base, None, "llama3.1", 10,
                ));
            }
        }

        if self.providers.is_empty() {
            tracing::warn!("No model providers configured, registering static placeholder");
            self.providers
                .push(ProviderConfig::static_reply("static", PLACEHOLDER_REPLY, 100));
        }
    }

    /// Path of the configuration file.
    pub fn config_path() -> PathBuf {
        std::env::var("SYNAPSE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"))
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".synapse")
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: String| Err(ConfigError::ValidationError(msg));

        if !(0.0..=2.0).contains(&self.generation.default_temperature) {
            return fail("generation.default_temperature must be between 0.0 and 2.0".into());
        }
        if self.generation.max_tokens_limit == 0 {
            return fail("generation.max_tokens_limit must be > 0".into());
        }
        if self.context.budget_tokens == 0 {
            return fail("context.budget_tokens must be > 0".into());
        }
        if self.router.max_attempts == 0 {
            return fail("router.max_attempts must be >= 1".into());
        }
        if self.router.failure_threshold == 0 {
            return fail("router.failure_threshold must be >= 1".into());
        }
        if self.streaming.buffer == 0 {
            return fail("streaming.buffer must be >= 1".into());
        }
        if self.router.attempt_timeout_secs == 0 {
            return fail("router.attempt_timeout_secs must be > 0".into());
        }
        if self.streaming.idle_timeout_secs == 0 {
            return fail("streaming.idle_timeout_secs must be > 0".into());
        }
        if self.context.lookup_timeout_ms == 0 {
            return fail("context.lookup_timeout_ms must be > 0".into());
        }

        let mut seen = HashSet::new();
        for p in &self.providers {
            if !seen.insert(p.name.as_str()) {
                return fail(format!("duplicate provider name '{}'", p.name));
            }
            match p.kind.as_str() {
                "openai" => {
                    if p.api_url.is_none() {
                        return fail(format!("provider '{}' needs an api_url", p.name));
                    }
                }
                "static" => {}
                other => {
                    return fail(format!("provider '{}' has unknown kind '{other}'", p.name));
                }
            }
        }

        match self.memory.backend.as_str() {
            "in_memory" | "none" => {}
            other => return fail(format!("unknown memory backend '{other}'")),
        }

        if self.is_production() && self.gateway.api_keys.is_empty() {
            return fail("an API key must be set in production (SYNAPSE_API_KEY)".into());
        }

        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        !self.gateway.api_keys.is_empty()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            default_user: default_user(),
            gateway: GatewayConfig::default(),
            context: ContextConfig::default(),
            router: RouterConfig::default(),
            streaming: StreamingConfig::default(),
            generation: GenerationConfig::default(),
            memory: MemoryConfig::default(),
            providers: Vec::new(),
            models: default_models(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for synapse_core::Error {
    fn from(e: ConfigError) -> Self {
        synapse_core::Error::Config {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.router.max_attempts, 3);
        assert_eq!(config.streaming.buffer, 32);
        assert_eq!(config.models.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let mut config = AppConfig::default();
        config.providers.push(ProviderConfig::static_reply("echo", "hi", 0));
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.providers[0].name, "echo");
        assert_eq!(parsed.providers[0].kind, "static");
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.generation.default_temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeouts_rejected() {
        let cases: [(&str, fn(&mut AppConfig)); 3] = [
            ("router.attempt_timeout_secs", |c| c.router.attempt_timeout_secs = 0),
            ("streaming.idle_timeout_secs", |c| c.streaming.idle_timeout_secs = 0),
            ("context.lookup_timeout_ms", |c| c.context.lookup_timeout_ms = 0),
        ];
        for (field, zero) in cases {
            let mut config = AppConfig::default();
            zero(&mut config);
            let err = config.validate().unwrap_err();
            assert!(matches!(err, ConfigError::ValidationError(_)));
            assert!(err.to_string().contains(field), "{field}: {err}");
        }
    }

    #[test]
    fn duplicate_provider_names_rejected() {
        let mut config = AppConfig::default();
        config.providers = vec![
            ProviderConfig::static_reply("a", "x", 0),
            ProviderConfig::static_reply("a", "y", 1),
        ];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn unknown_kind_rejected() {
        let mut config = AppConfig::default();
        let mut p = ProviderConfig::static_reply("x", "y", 0);
        p.kind = "carrier-pigeon".into();
        config.providers.push(p);
        assert!(config.validate().is_err());
    }

    #[test]
    fn production_requires_api_key() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[("SYNAPSE_ENVIRONMENT", "production")]));
        assert!(config.is_production());
        assert!(config.validate().is_err());

        config.apply_env(env(&[("SYNAPSE_API_KEY", "sk-local")]));
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.api_keys, vec!["sk-local".to_string()]);
    }

    #[test]
    fn providers_provisioned_from_env_in_priority_order() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[
            ("OLLAMA_HOST", "http://localhost:11434/"),
            ("OPENAI_API_KEY", "sk-openai"),
        ]));
        let names: Vec<_> = config.providers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["openai", "ollama"]);
        assert_eq!(
            config.providers[1].api_url.as_deref(),
            Some("http://localhost:11434/v1")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn placeholder_when_nothing_configured() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[]));
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].kind, "static");
    }

    #[test]
    fn file_providers_are_not_overridden_by_env() {
        let mut config = AppConfig::default();
        config
            .providers
            .push(ProviderConfig::static_reply("mine", "hi", 0));
        config.apply_env(env(&[("OPENAI_API_KEY", "sk-openai")]));
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].name, "mine");
    }

    #[test]
    fn invalid_port_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[("SYNAPSE_PORT", "not-a-port")]));
        assert_eq!(config.gateway.port, 8000);
        config.apply_env(env(&[("SYNAPSE_PORT", "9100")]));
        assert_eq!(config.gateway.port, 9100);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::read_file(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.gateway.port, 8000);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_user = "anon"

[context]
budget_tokens = 2048

[[providers]]
name = "primary"
api_url = "http://localhost:9999/v1"
default_model = "gpt-4o"
models = ["gpt-4o"]
priority = 0

[[providers]]
name = "backup"
kind = "static"
reply = "fallback"
priority = 5
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_user, "anon");
        assert_eq!(config.context.budget_tokens, 2048);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].kind, "openai");
        assert!(config.providers[0].streaming);
        assert_eq!(config.providers[1].reply.as_deref(), Some("fallback"));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gateway\nport = ").unwrap();
        assert!(matches!(
            AppConfig::load_from(file.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig::default();
        config.gateway.api_keys.push("super-secret".into());
        config.providers.push(ProviderConfig::openai_compatible(
            "openai",
            "https://api.openai.com/v1",
            Some("sk-hidden".into()),
            "gpt-4o",
            0,
        ));
        let text = format!("{config:?}");
        assert!(!text.contains("super-secret"));
        assert!(!text.contains("sk-hidden"));
        assert!(text.contains("REDACTED"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("8000"));
        assert!(toml_str.contains("synapse-fast"));
    }
}
