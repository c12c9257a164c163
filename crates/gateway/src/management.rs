//! Memory and document management API.
//!
//! - `GET    /api/memory/{user_id}`              — list a user's memories
//! - `POST   /api/memory/{user_id}`              — store a memory
//! - `DELETE /api/memory/{user_id}/{memory_id}`  — delete a memory
//! - `POST   /api/documents`                     — index a document
//! - `POST   /api/documents/upload`              — index multipart `files`
//! - `POST   /api/documents/search`              — search documents
//! - `DELETE /api/documents/{document_id}`       — remove a document

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::{delete, get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use synapse_core::error::{Error, MemoryError, RetrievalError};
use synapse_core::memory::{MemoryEntry, Snippet};
use synapse_core::retrieval::Document;
use tracing::{info, warn};

use crate::SharedState;
use crate::error::{ApiError, ApiJson};

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/memory/{user_id}", get(list_memories).post(create_memory))
        .route("/memory/{user_id}/{memory_id}", delete(delete_memory))
        .route("/documents", post(ingest_document))
        .route("/documents/upload", post(upload_documents))
        .route("/documents/search", post(search_documents))
        .route("/documents/{document_id}", delete(delete_document))
}

fn memory_error(err: MemoryError) -> ApiError {
    match err {
        MemoryError::NotSupported(_) | MemoryError::Storage(_) => {
            ApiError::invalid_request(err.to_string())
        }
        other => Error::Memory(other).into(),
    }
}

fn retrieval_error(err: RetrievalError) -> ApiError {
    match err {
        RetrievalError::NotSupported(_) | RetrievalError::IndexingFailed(_) => {
            ApiError::invalid_request(err.to_string())
        }
        other => Error::Retrieval(other).into(),
    }
}

// ── Memory ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct MemoryList {
    user_id: String,
    memories: Vec<MemoryEntry>,
    count: usize,
}

async fn list_memories(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Result<Json<MemoryList>, ApiError> {
    let memories = state.memory.list(&user_id).await.map_err(memory_error)?;
    Ok(Json(MemoryList {
        count: memories.len(),
        user_id,
        memories,
    }))
}

#[derive(Deserialize)]
struct CreateMemory {
    content: String,
    #[serde(rename = "type", default = "default_kind")]
    kind: String,
    #[serde(default)]
    metadata: serde_json::Value,
}

fn default_kind() -> String {
    "fact".into()
}

#[derive(Serialize)]
struct MemoryCreated {
    status: &'static str,
    user_id: String,
    memory_id: String,
}

async fn create_memory(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    ApiJson(req): ApiJson<CreateMemory>,
) -> Result<(StatusCode, Json<MemoryCreated>), ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::invalid_request("'content' must not be empty"));
    }
    let entry = MemoryEntry::new(&user_id, req.content)
        .with_kind(req.kind)
        .with_metadata(req.metadata);
    let memory_id = state.memory.store(entry).await.map_err(memory_error)?;
    info!(user_id = %user_id, memory_id = %memory_id, "Memory stored");

    Ok((
        StatusCode::CREATED,
        Json(MemoryCreated {
            status: "created",
            user_id,
            memory_id,
        }),
    ))
}

#[derive(Serialize)]
struct MemoryDeleted {
    status: &'static str,
    memory_id: String,
}

async fn delete_memory(
    State(state): State<SharedState>,
    Path((user_id, memory_id)): Path<(String, String)>,
) -> Result<Json<MemoryDeleted>, ApiError> {
    if !state
        .memory
        .delete(&user_id, &memory_id)
        .await
        .map_err(memory_error)?
    {
        return Err(ApiError::not_found(format!(
            "Memory '{memory_id}' not found for user '{user_id}'"
        )));
    }
    Ok(Json(MemoryDeleted {
        status: "deleted",
        memory_id,
    }))
}

// ── Documents ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct IngestDocument {
    title: String,
    content: String,
}

#[derive(Serialize)]
struct DocumentIndexed {
    status: &'static str,
    document_id: String,
    chunks: usize,
}

async fn ingest_document(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<IngestDocument>,
) -> Result<(StatusCode, Json<DocumentIndexed>), ApiError> {
    let document = Document::new(req.title, req.content);
    let document_id = document.id.clone();
    let chunks = state
        .documents
        .ingest(document)
        .await
        .map_err(retrieval_error)?;
    info!(document_id = %document_id, chunks, "Document indexed");

    Ok((
        StatusCode::CREATED,
        Json(DocumentIndexed {
            status: "indexed",
            document_id,
            chunks,
        }),
    ))
}

#[derive(Serialize)]
struct UploadedFile {
    filename: String,
    size: usize,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl UploadedFile {
    fn failed(filename: String, size: usize, error: String) -> Self {
        Self {
            filename,
            size,
            status: "failed",
            document_id: None,
            chunks: None,
            error: Some(error),
        }
    }
}

#[derive(Serialize)]
struct UploadResult {
    status: &'static str,
    documents: Vec<UploadedFile>,
    count: usize,
}

/// Each `files` part becomes one document titled by its filename. A file
/// that cannot be indexed is reported as failed without aborting the rest.
async fn upload_documents(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResult>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::invalid_request(e.body_text()))?;
    let mut documents = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::invalid_request(e.body_text()))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::invalid_request(e.body_text()))?;
        let size = bytes.len();

        let Ok(content) = String::from_utf8(bytes.to_vec()) else {
            warn!(filename = %filename, size, "Uploaded file is not UTF-8 text");
            documents.push(UploadedFile::failed(filename, size, "file is not UTF-8 text".into()));
            continue;
        };

        let document = Document::new(filename.clone(), content);
        let document_id = document.id.clone();
        match state.documents.ingest(document).await {
            Ok(chunks) => {
                info!(document_id = %document_id, filename = %filename, chunks, "Document uploaded");
                documents.push(UploadedFile {
                    filename,
                    size,
                    status: "indexed",
                    document_id: Some(document_id),
                    chunks: Some(chunks),
                    error: None,
                });
            }
            Err(e @ (RetrievalError::IndexingFailed(_) | RetrievalError::NotSupported(_))) => {
                warn!(filename = %filename, error = %e, "Uploaded file was not indexed");
                documents.push(UploadedFile::failed(filename, size, e.to_string()));
            }
            Err(e) => return Err(retrieval_error(e)),
        }
    }

    if documents.is_empty() {
        return Err(ApiError::invalid_request(
            "no files uploaded; send multipart form parts named 'files'",
        ));
    }

    Ok(Json(UploadResult {
        status: "success",
        count: documents.len(),
        documents,
    }))
}

#[derive(Deserialize)]
struct SearchDocuments {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default = "default_true")]
    use_memory: bool,
}

fn default_limit() -> usize {
    10
}

fn default_true() -> bool {
    true
}

#[derive(Serialize)]
struct SearchResults {
    query: String,
    results: Vec<Snippet>,
    count: usize,
    user_context_applied: bool,
    memories: Vec<Snippet>,
}

async fn search_documents(
    State(state): State<SharedState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<SearchDocuments>,
) -> Result<Json<SearchResults>, ApiError> {
    if req.query.trim().is_empty() {
        return Err(ApiError::invalid_request("'query' must not be empty"));
    }

    let results = state
        .documents
        .search(&req.query, req.limit)
        .await
        .map_err(retrieval_error)?;

    let memories = if req.use_memory {
        let header_user = headers
            .get(state.config.gateway.user_header.as_str())
            .and_then(|v| v.to_str().ok());
        let user_id = state.orchestrator.resolve_user_id(None, header_user);
        match state
            .memory
            .recall(&user_id, &req.query, state.config.context.memory_top_k)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Memory recall failed during search");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    Ok(Json(SearchResults {
        count: results.len(),
        query: req.query,
        results,
        user_context_applied: !memories.is_empty(),
        memories,
    }))
}

#[derive(Serialize)]
struct DocumentDeleted {
    status: &'static str,
    document_id: String,
}

async fn delete_document(
    State(state): State<SharedState>,
    Path(document_id): Path<String>,
) -> Result<Json<DocumentDeleted>, ApiError> {
    if !state
        .documents
        .delete(&document_id)
        .await
        .map_err(retrieval_error)?
    {
        return Err(ApiError::not_found(format!(
            "Document '{document_id}' not found"
        )));
    }
    Ok(Json(DocumentDeleted {
        status: "deleted",
        document_id,
    }))
}
