//! OpenAI-compatible routes.
//!
//! - `POST /v1/chat/completions` — buffered JSON or an SSE stream
//! - `GET  /v1/models`           — advertised model names

use axum::extract::State;
use axum::http::{HeaderMap, header};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::StreamExt;
use serde::Serialize;
use std::convert::Infallible;
use synapse_core::completion::{ChatCompletion, Choice, CompletionChunk, UsageRecord};
use synapse_core::message::ChatRequest;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use crate::SharedState;
use crate::error::{ApiError, ApiJson};

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/chat/completions", post(chat_completions))
        .route("/models", get(list_models))
}

// ── Wire shapes ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct CompletionBody<'a> {
    id: &'a str,
    object: &'static str,
    created: i64,
    model: &'a str,
    choices: &'a [Choice],
    usage: UsageRecord,
}

impl<'a> From<&'a ChatCompletion> for CompletionBody<'a> {
    fn from(c: &'a ChatCompletion) -> Self {
        Self {
            id: c.id.as_str(),
            object: "chat.completion",
            created: c.created,
            model: &c.model,
            choices: &c.choices,
            usage: c.usage,
        }
    }
}

#[derive(Serialize)]
struct ChunkBody<'a> {
    id: &'a str,
    object: &'static str,
    created: i64,
    model: &'a str,
    choices: [&'a CompletionChunk; 1],
}

#[derive(Serialize)]
struct ModelList {
    object: &'static str,
    data: Vec<ModelEntry>,
}

#[derive(Serialize)]
struct ModelEntry {
    id: String,
    object: &'static str,
    created: i64,
    owned_by: String,
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn chat_completions(
    State(state): State<SharedState>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<ChatRequest>,
) -> Result<Response, ApiError> {
    let header_user = headers
        .get(state.config.gateway.user_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    info!(
        model = %request.model,
        messages = request.messages.len(),
        stream = request.stream,
        "chat/completions request"
    );

    if !request.stream {
        let completion = state
            .orchestrator
            .complete(request, header_user.as_deref())
            .await?;
        return Ok(Json(CompletionBody::from(&completion)).into_response());
    }

    let stream = state
        .orchestrator
        .stream(request, header_user.as_deref())
        .await?;

    let id = stream.id.to_string();
    let model = stream.model.clone();
    let created = stream.created;

    // The outcome task logs the result; nothing here waits on it.
    drop(stream.outcome);

    let events = ReceiverStream::new(stream.chunks).flat_map(move |chunk| {
        let body = ChunkBody {
            id: &id,
            object: "chat.completion.chunk",
            created,
            model: &model,
            choices: [&chunk],
        };

        let mut events = Vec::with_capacity(2);
        if let Some(data) = event_data(&body, &id) {
            events.push(Ok::<_, Infallible>(SseEvent::default().data(data)));
        }
        if chunk.is_terminal() {
            events.push(Ok(SseEvent::default().data("[DONE]")));
        }
        futures::stream::iter(events)
    });

    Ok(([(header::CACHE_CONTROL, "no-cache")], Sse::new(events)).into_response())
}

/// Serialize one SSE payload. A failure is logged and the event skipped.
fn event_data<T: Serialize>(value: &T, completion_id: &str) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(data) => Some(data),
        Err(e) => {
            error!(completion_id, error = %e, "Failed to serialize stream chunk, skipping");
            None
        }
    }
}

async fn list_models(State(state): State<SharedState>) -> Json<ModelList> {
    Json(ModelList {
        object: "list",
        data: state
            .config
            .models
            .iter()
            .map(|m| ModelEntry {
                id: m.id.clone(),
                object: "model",
                created: state.started_at,
                owned_by: m.owned_by.clone(),
            })
            .collect(),
    })
}
