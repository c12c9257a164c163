//! Liveness and readiness probes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use serde_json::{Value, json};

use crate::SharedState;
use crate::readiness::collaborators_healthy;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(banner))
        .route("/health", get(liveness))
        .route("/health/ready", get(readiness))
}

#[derive(Serialize)]
struct Liveness {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

async fn liveness() -> Json<Liveness> {
    Json(Liveness {
        status: "healthy",
        service: "synapse",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct ReadinessReport {
    status: &'static str,
    phase: &'static str,
    services: Services,
}

#[derive(Serialize)]
struct Services {
    memory: &'static str,
    documents: &'static str,
    providers: Value,
}

fn up(ok: bool) -> &'static str {
    if ok { "up" } else { "down" }
}

/// Ready only when the gate is open, both collaborators answer their live
/// health check, and at least one provider is not unavailable.
async fn readiness(State(state): State<SharedState>) -> (StatusCode, Json<ReadinessReport>) {
    let (memory_ok, documents_ok) =
        collaborators_healthy(state.memory.as_ref(), state.documents.as_ref()).await;
    let providers_ok = state.registry.any_available();
    let phase = state.readiness.phase();

    let providers: Vec<Value> = state
        .registry
        .descriptors()
        .into_iter()
        .map(|d| json!({"name": d.name, "health": d.health}))
        .collect();

    let ready = state.readiness.is_ready() && memory_ok && documents_ok && providers_ok;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessReport {
            status: if ready { "ready" } else { "not_ready" },
            phase: phase.as_str(),
            services: Services {
                memory: up(memory_ok),
                documents: up(documents_ok),
                providers: json!({"available": providers_ok, "chain": providers}),
            },
        }),
    )
}

/// Service banner with the endpoint map.
async fn banner() -> Json<Value> {
    Json(json!({
        "service": "synapse",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "OpenAI-compatible gateway with memory and retrieval",
        "endpoints": {
            "chat": "POST /v1/chat/completions",
            "models": "GET /v1/models",
            "health": "GET /health",
            "ready": "GET /health/ready",
            "memory": "GET|POST /api/memory/{user_id}, DELETE /api/memory/{user_id}/{memory_id}",
            "documents": "POST /api/documents, POST /api/documents/upload, POST /api/documents/search, DELETE /api/documents/{document_id}",
        }
    }))
}

#[cfg(test)]
mod tests {
    use crate::test_helpers::*;
    use axum::http::StatusCode;
    use serde_json::Value;
    use std::sync::Arc;
    use synapse_core::provider::Provider;
    use synapse_providers::{MockProvider, ProviderSpec};

    #[tokio::test]
    async fn liveness_reports_service() {
        let state = replying("x");
        let (status, body) = send(&state, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["service"], "synapse");
    }

    #[tokio::test]
    async fn ready_when_gate_open_and_collaborators_up() {
        let state = replying("x");
        let (status, body) = send(&state, get("/health/ready")).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["services"]["memory"], "up");
        assert_eq!(json["services"]["documents"], "up");
        assert_eq!(json["services"]["providers"]["available"], true);
    }

    #[tokio::test]
    async fn not_ready_when_every_provider_is_unavailable() {
        let p: Arc<dyn Provider> = Arc::new(MockProvider::reply("only", "x"));
        let state = state_with(config(), vec![(ProviderSpec::new("only", 0), p)]);
        state.registry.record_failure("only", 1);

        let (status, body) = send(&state, get("/health/ready")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "not_ready");
        assert_eq!(json["services"]["providers"]["chain"][0]["health"], "unavailable");
    }

    #[tokio::test]
    async fn banner_lists_endpoints() {
        let state = replying("x");
        let (status, body) = send(&state, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["service"], "synapse");
        assert!(json["endpoints"]["chat"].as_str().unwrap().contains("/v1/chat/completions"));
    }
}
