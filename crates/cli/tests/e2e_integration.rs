//! End-to-end integration tests for the Synapse gateway.
//!
//! These tests drive the full HTTP pipeline: authentication, readiness,
//! context assembly with memory and retrieval, provider fallback, and the
//! OpenAI wire format for both buffered and streamed completions.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower::ServiceExt;

use synapse_config::{AppConfig, ProviderConfig};
use synapse_core::completion::FinishReason;
use synapse_core::error::ProviderError;
use synapse_core::message::Role;
use synapse_core::provider::{
    FragmentReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage,
};
use synapse_gateway::{AppState, SharedState, build_router};
use synapse_memory::{InMemoryDocumentIndex, InMemoryMemory};
use synapse_providers::{HealthStatus, ProviderRegistry, ProviderSpec};

// ── Mock Provider ────────────────────────────────────────────────────────

#[derive(Clone)]
enum Script {
    Reply(String),
    Fail(ProviderError),
    BreakAfter(String, ProviderError),
}

/// A provider that follows a fixed script and records every request.
struct ScriptedProvider {
    name: String,
    script: Script,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(name: &str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            script,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn text(name: &str, reply: &str) -> Arc<Self> {
        Self::new(name, Script::Reply(reply.into()))
    }

    fn down(name: &str) -> Arc<Self> {
        Self::new(
            name,
            Script::Fail(ProviderError::ApiError {
                status_code: 503,
                message: "overloaded".into(),
            }),
        )
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> ProviderRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }

    fn record(&self, request: ProviderRequest) {
        self.requests.lock().unwrap().push(request);
    }
}

fn usage() -> Usage {
    Usage {
        prompt_tokens: 12,
        completion_tokens: 3,
        total_tokens: 15,
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.record(request.clone());
        match &self.script {
            Script::Reply(text) => Ok(ProviderResponse {
                content: text.clone(),
                finish_reason: FinishReason::Stop,
                usage: Some(usage()),
                model: request.model,
            }),
            Script::Fail(e) | Script::BreakAfter(_, e) => Err(e.clone()),
        }
    }

    async fn stream(&self, request: ProviderRequest) -> Result<FragmentReceiver, ProviderError> {
        self.record(request);
        let (text, error) = match &self.script {
            Script::Fail(e) => return Err(e.clone()),
            Script::Reply(text) => (text.clone(), None),
            Script::BreakAfter(text, e) => (text.clone(), Some(e.clone())),
        };

        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            for word in text.split_inclusive(' ') {
                if tx.send(Ok(StreamChunk::text(word))).await.is_err() {
                    return;
                }
            }
            let last = match error {
                Some(e) => Err(e),
                None => Ok(StreamChunk::finished(FinishReason::Stop, Some(usage()))),
            };
            let _ = tx.send(last).await;
        });
        Ok(rx)
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.providers = vec![ProviderConfig::static_reply("unused", "unused", 0)];
    config
}

fn gateway(config: AppConfig, providers: Vec<(u32, Arc<ScriptedProvider>)>) -> SharedState {
    let mut registry = ProviderRegistry::new(Duration::from_secs(30));
    for (priority, p) in providers {
        let name = p.name.clone();
        registry.register(ProviderSpec::new(name, priority), p);
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

async fn call(state: &SharedState, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = build_router(state.clone()).oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn chat(content: &str, stream: bool) -> Request<Body> {
    post(
        "/v1/chat/completions",
        json!({
            "model": "synapse",
            "messages": [{"role": "user", "content": content}],
            "stream": stream,
        }),
    )
}

fn json_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

/// `data:` payloads of an SSE body, in order.
fn sse_payloads(body: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .map(str::to_string)
        .collect()
}

// ── E2E: Buffered completions ────────────────────────────────────────────

#[tokio::test]
async fn e2e_hello_returns_openai_completion() {
    let provider = ScriptedProvider::text("primary", "Hello! How can I help?");
    let state = gateway(config(), vec![(0, provider.clone())]);

    let (status, body) = call(&state, chat("Hi", false)).await;
    assert_eq!(status, StatusCode::OK);

    let json = json_body(&body);
    assert_eq!(json["object"], "chat.completion");
    assert!(json["id"].as_str().unwrap().starts_with("chatcmpl-"));
    assert_eq!(json["choices"][0]["message"]["role"], "assistant");
    assert_eq!(json["choices"][0]["message"]["content"], "Hello! How can I help?");
    assert_eq!(json["choices"][0]["finish_reason"], "stop");
    assert_eq!(json["usage"]["total_tokens"], 15);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn e2e_fallback_is_invisible_to_the_client() {
    let primary = ScriptedProvider::down("primary");
    let backup = ScriptedProvider::text("backup", "served by backup");
    let state = gateway(config(), vec![(0, primary.clone()), (1, backup.clone())]);

    let (status, body) = call(&state, chat("Hi", false)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json_body(&body)["choices"][0]["message"]["content"],
        "served by backup"
    );
    assert_eq!(primary.calls(), 1);
    assert_eq!(backup.calls(), 1);
    assert_eq!(state.registry.status("primary"), Some(HealthStatus::Degraded));
    assert_eq!(state.registry.status("backup"), Some(HealthStatus::Healthy));
}

#[tokio::test]
async fn e2e_exhausted_chain_is_bad_gateway() {
    let state = gateway(
        config(),
        vec![
            (0, ScriptedProvider::down("a")),
            (1, ScriptedProvider::down("b")),
        ],
    );

    let (status, body) = call(&state, chat("Hi", false)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let json = json_body(&body);
    assert_eq!(json["error"]["type"], "all_providers_exhausted");
    assert!(json["error"]["message"].as_str().unwrap().contains("overloaded"));
}

#[tokio::test]
async fn e2e_invalid_request_never_reaches_a_provider() {
    let provider = ScriptedProvider::text("primary", "unused");
    let state = gateway(config(), vec![(0, provider.clone())]);

    let (status, body) = call(
        &state,
        post("/v1/chat/completions", json!({"model": "synapse", "messages": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error"]["type"], "invalid_request_error");
    assert_eq!(provider.calls(), 0);
}

// ── E2E: Streaming ───────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_stream_ends_with_done_sentinel() {
    let provider = ScriptedProvider::text("primary", "Hello there friend");
    let state = gateway(config(), vec![(0, provider)]);

    let (status, body) = call(&state, chat("Hi", true)).await;
    assert_eq!(status, StatusCode::OK);

    let payloads = sse_payloads(&body);
    assert_eq!(payloads.last().map(String::as_str), Some("[DONE]"));

    let chunks: Vec<Value> = payloads[..payloads.len() - 1]
        .iter()
        .map(|p| serde_json::from_str(p).unwrap())
        .collect();
    assert_eq!(chunks[0]["choices"][0]["delta"]["role"], "assistant");
    assert_eq!(chunks.last().unwrap()["choices"][0]["finish_reason"], "stop");

    let id = chunks[0]["id"].as_str().unwrap();
    assert!(chunks.iter().all(|c| c["id"] == id));
    assert!(chunks.iter().all(|c| c["object"] == "chat.completion.chunk"));

    let text: String = chunks
        .iter()
        .filter_map(|c| c["choices"][0]["delta"]["content"].as_str())
        .collect();
    assert_eq!(text, "Hello there friend");
}

#[tokio::test]
async fn e2e_stream_falls_back_before_first_fragment() {
    let primary = ScriptedProvider::down("primary");
    let backup = ScriptedProvider::text("backup", "from backup");
    let state = gateway(config(), vec![(0, primary), (1, backup)]);

    let (status, body) = call(&state, chat("Hi", true)).await;
    assert_eq!(status, StatusCode::OK);
    let payloads = sse_payloads(&body);
    assert_eq!(payloads.last().map(String::as_str), Some("[DONE]"));
    assert!(payloads.iter().any(|p| p.contains("backup")));
}

#[tokio::test]
async fn e2e_mid_stream_failure_does_not_switch_providers() {
    let primary = ScriptedProvider::new(
        "primary",
        Script::BreakAfter(
            "partial answer".into(),
            ProviderError::StreamInterrupted("connection reset".into()),
        ),
    );
    let backup = ScriptedProvider::text("backup", "unused");
    let state = gateway(config(), vec![(0, primary), (1, backup.clone())]);

    let (status, body) = call(&state, chat("Hi", true)).await;
    assert_eq!(status, StatusCode::OK);

    let payloads = sse_payloads(&body);
    assert!(!payloads.iter().any(|p| p == "[DONE]"));
    assert!(!payloads.iter().any(|p| p.contains("\"finish_reason\":\"stop\"")));
    assert_eq!(backup.calls(), 0);
    assert_eq!(state.registry.status("primary"), Some(HealthStatus::Degraded));
}

// ── E2E: Memory and retrieval ────────────────────────────────────────────

#[tokio::test]
async fn e2e_memory_and_documents_reach_the_prompt() {
    let provider = ScriptedProvider::text("primary", "You work on billing.");
    let state = gateway(config(), vec![(0, provider.clone())]);

    let (status, _) = call(
        &state,
        post(
            "/api/memory/alice",
            json!({"content": "Alice works on the billing team"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = call(
        &state,
        post(
            "/api/documents",
            json!({"title": "handbook", "content": "The billing team owns invoicing and refunds."}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let mut req = chat("Which team does Alice work on for billing?", false);
    req.headers_mut().insert("x-user-id", "alice".parse().unwrap());
    let (status, _) = call(&state, req).await;
    assert_eq!(status, StatusCode::OK);

    let sent = provider.last_request();
    assert_eq!(sent.messages[0].role, Role::System);
    let system = &sent.messages[0].content;
    assert!(system.contains("[Memory]"));
    assert!(system.contains("Alice works on the billing team"));
    assert!(system.contains("[Retrieved Knowledge]"));
    assert!(system.contains("invoicing and refunds"));

    let last = sent.messages.last().unwrap();
    assert_eq!(last.role, Role::User);
    assert_eq!(last.content, "Which team does Alice work on for billing?");
}

#[tokio::test]
async fn e2e_memories_are_isolated_per_user() {
    let provider = ScriptedProvider::text("primary", "ok");
    let state = gateway(config(), vec![(0, provider.clone())]);

    call(
        &state,
        post("/api/memory/alice", json!({"content": "Alice prefers dark roast coffee"})),
    )
    .await;

    let mut req = chat("What coffee do I prefer?", false);
    req.headers_mut().insert("x-user-id", "bob".parse().unwrap());
    call(&state, req).await;

    let sent = provider.last_request();
    assert!(!sent.messages.iter().any(|m| m.content.contains("dark roast")));
}

#[tokio::test]
async fn e2e_over_budget_prompt_is_rejected() {
    let provider = ScriptedProvider::text("primary", "unused");
    let mut config = config();
    config.context.budget_tokens = 16;
    let state = gateway(config, vec![(0, provider.clone())]);

    let (status, body) = call(&state, chat(&"word ".repeat(200), false)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error"]["code"], "context_length_exceeded");
    assert_eq!(provider.calls(), 0);
}

// ── E2E: Auth and readiness ──────────────────────────────────────────────

#[tokio::test]
async fn e2e_bearer_auth_guards_the_api() {
    let mut config = config();
    config.gateway.api_keys = vec!["sk-test".into()];
    let state = gateway(config, vec![(0, ScriptedProvider::text("primary", "hi"))]);

    let (status, body) = call(&state, chat("Hi", false)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&body)["error"]["type"], "authentication_error");

    let mut req = chat("Hi", false);
    req.headers_mut()
        .insert("authorization", "Bearer sk-test".parse().unwrap());
    let (status, _) = call(&state, req).await;
    assert_eq!(status, StatusCode::OK);

    let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, _) = call(&state, health).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn e2e_startup_opens_the_readiness_gate() {
    let state: SharedState = Arc::new(AppState::from_config(config()).unwrap());

    let (status, body) = call(&state, chat("Hi", false)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(&body)["error"]["code"], "not_ready");

    synapse_gateway::readiness::startup(state.clone()).await;

    let ready = Request::builder()
        .uri("/health/ready")
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(&state, ready).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["phase"], "ready");

    let (status, body) = call(&state, chat("Hi", false)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["choices"][0]["message"]["content"], "unused");
}

// ── E2E: Configuration ───────────────────────────────────────────────────

#[test]
fn e2e_config_file_drives_the_provider_chain() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
default_user = "anonymous"

[gateway]
port = 9100

[context]
budget_tokens = 4096
memory_top_k = 3

[[providers]]
name = "local"
kind = "openai"
api_url = "http://localhost:11434/v1"
default_model = "llama3.1"
priority = 5

[[providers]]
name = "canned"
kind = "static"
reply = "offline"
priority = 50
"#,
    )
    .unwrap();

    let config = AppConfig::load_from(&path).unwrap();
    assert_eq!(config.default_user, "anonymous");
    assert_eq!(config.gateway.port, 9100);
    assert_eq!(config.context.budget_tokens, 4096);
    assert_eq!(config.context.memory_top_k, 3);

    let registry = synapse_providers::build_from_config(&config);
    let names: Vec<_> = registry.descriptors().into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["local", "canned"]);
}

#[test]
fn e2e_invalid_config_is_rejected() {
    let parsed: AppConfig = toml::from_str(
        r#"
[[providers]]
name = "dup"
kind = "static"

[[providers]]
name = "dup"
kind = "static"
"#,
    )
    .unwrap();
    assert!(parsed.validate().is_err());
}
