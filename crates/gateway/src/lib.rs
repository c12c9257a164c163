//! HTTP gateway for Synapse.
//!
//! Serves the OpenAI-compatible chat API, health probes, and the memory and
//! document management API. Built on Axum.

pub mod error;
pub mod health;
pub mod management;
pub mod openai;
pub mod readiness;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{HeaderValue, Method, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use synapse_config::AppConfig;
use synapse_core::error::Error;
use synapse_core::memory::MemoryBackend;
use synapse_core::retrieval::DocumentIndex;
use synapse_orchestrator::Orchestrator;
use synapse_providers::{ProviderRegistry, ProviderRouter, RouterPolicy};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::readiness::Readiness;

/// Everything request handlers share. Fully constructed before serving.
pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Orchestrator,
    pub registry: Arc<ProviderRegistry>,
    pub memory: Arc<dyn MemoryBackend>,
    pub documents: Arc<dyn DocumentIndex>,
    pub readiness: Readiness,
    /// Unix seconds; reported as `created` for advertised models.
    pub started_at: i64,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        config: AppConfig,
        registry: ProviderRegistry,
        memory: Arc<dyn MemoryBackend>,
        documents: Arc<dyn DocumentIndex>,
    ) -> Self {
        let registry = Arc::new(registry);
        let router = Arc::new(ProviderRouter::new(
            registry.clone(),
            RouterPolicy::from(&config),
        ));
        let orchestrator =
            Orchestrator::from_config(&config, router, memory.clone(), documents.clone());
        Self {
            config,
            orchestrator,
            registry,
            memory,
            documents,
            readiness: Readiness::new(),
            started_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Build providers and collaborators from configuration.
    pub fn from_config(config: AppConfig) -> Result<Self, Error> {
        let (memory, documents) = synapse_memory::create_backends(&config.memory.backend)
            .ok_or_else(|| Error::Config {
                message: format!("unknown memory backend '{}'", config.memory.backend),
            })?;
        let registry = synapse_providers::build_from_config(&config);
        Ok(Self::new(config, registry, memory, documents))
    }
}

/// Build the full router.
///
/// `/v1` and `/api` sit behind bearer auth and the readiness gate; `/` and
/// `/health*` are open.
pub fn build_router(state: SharedState) -> Router {
    let protected = Router::new()
        .nest("/v1", openai::router())
        .nest("/api", management::router())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            readiness::require_ready,
        ));

    Router::new()
        .merge(health::router())
        .merge(protected)
        .layer(DefaultBodyLimit::max(state.config.gateway.max_body_bytes))
        .layer(cors_layer(&state.config.gateway.allowed_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed: &[String]) -> CorsLayer {
    let origin = if allowed.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = allowed
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static("x-user-id"),
        ])
        .max_age(Duration::from_secs(3600))
}

/// Bearer-token check. No configured keys means authentication is off.
async fn auth_middleware(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let keys = &state.config.gateway.api_keys;
    if keys.is_empty() {
        return Ok(next.run(req).await);
    }

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match token {
        Some(t) if keys.iter().any(|k| k == t) => Ok(next.run(req).await),
        _ => {
            warn!(path = %req.uri().path(), "Unauthorized request: missing or invalid bearer token");
            Err(ApiError::unauthorized())
        }
    }
}

/// Start the gateway and serve until SIGINT/SIGTERM.
///
/// The listener binds immediately; a startup task opens the readiness gate
/// once collaborators answer. On shutdown in-flight requests get
/// `gateway.shutdown_grace_secs` to finish.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let grace = Duration::from_secs(config.gateway.shutdown_grace_secs);
    let state: SharedState = Arc::new(AppState::from_config(config)?);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        addr = %addr,
        providers = state.registry.len(),
        memory = state.memory.name(),
        "Gateway listening"
    );

    tokio::spawn(readiness::startup(state.clone()));

    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();
    let shutdown_state = state.clone();
    let server = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_state.readiness.mark_draining();
            info!("Shutdown requested, draining in-flight requests");
            let _ = drain_tx.send(());
        })
        .into_future();

    let grace_timer = async move {
        if drain_rx.await.is_ok() {
            tokio::time::sleep(grace).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server => result?,
        _ = grace_timer => {
            warn!(grace_secs = grace.as_secs(), "Shutdown grace period elapsed, closing remaining connections");
        }
    }

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use synapse_config::ProviderConfig;
    use synapse_core::provider::Provider;
    use synapse_memory::{InMemoryDocumentIndex, InMemoryMemory};
    use synapse_providers::ProviderSpec;
    use tower::ServiceExt;

    pub fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.providers = vec![ProviderConfig::static_reply("mock", "unused", 0)];
        config
    }

    /// Ready state over in-memory collaborators and the given providers.
    pub fn state_with(config: AppConfig, providers: Vec<(ProviderSpec, Arc<dyn Provider>)>) -> SharedState {
        let mut registry = ProviderRegistry::new(Duration::from_secs(30));
        for (spec, p) in providers {
            registry.register(spec, p);
        }
        let state = AppState::new(
            config,
            registry,
            Arc::new(InMemoryMemory::new()),
            Arc::new(InMemoryDocumentIndex::new()),
        );
        state.readiness.mark_ready();
        Arc::new(state)
    }

    pub fn replying(text: &str) -> SharedState {
        let p: Arc<dyn Provider> = Arc::new(synapse_providers::MockProvider::reply("mock", text));
        state_with(config(), vec![(ProviderSpec::new("mock", 0), p)])
    }

    pub async fn send(state: &SharedState, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = build_router(state.clone()).oneshot(req).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }
}
