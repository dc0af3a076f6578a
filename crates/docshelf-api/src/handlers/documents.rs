//! Document handlers: ingestion, listing, moves, deletes, content and export.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use docshelf_db::{
    sanitize_filename, Document, DocumentContent, DocumentRepository, FileInput, IngestStore,
    LibrarySnapshot, SaveOutcome,
};

use crate::services::{write_export, DirectoryPicker};
use crate::{ApiError, AppState};

// =============================================================================
// INGESTION
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub paths: Vec<PathBuf>,
}

/// Accepted part of a batch. Processing continues in the background and
/// reports through `document.updated` events.
#[derive(Debug, Serialize)]
pub struct StageResponse {
    pub batch_id: Uuid,
    pub documents: Vec<Document>,
    pub warnings: Vec<String>,
}

async fn stage_and_spawn(
    state: &AppState,
    inputs: Vec<FileInput>,
) -> Result<(StatusCode, Json<StageResponse>), ApiError> {
    let db = state.db().await?;
    let store: Arc<dyn IngestStore> = Arc::new(db.documents.clone());

    let batch = state.pipeline.stage(store.as_ref(), inputs).await?;
    let response = StageResponse {
        batch_id: batch.id,
        documents: batch.documents(),
        warnings: batch.warnings.iter().map(ToString::to_string).collect(),
    };

    if batch.is_empty() {
        batch.cleanup().await;
        return Ok((StatusCode::OK, Json(response)));
    }

    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        pipeline.process(store.as_ref(), batch).await;
    });
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Ingest files that already exist on the server's filesystem.
pub async fn import_paths(
    State(state): State<AppState>,
    Json(req): Json<ImportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.paths.is_empty() {
        return Err(ApiError::BadRequest("paths must not be empty".to_string()));
    }
    let inputs = req.paths.into_iter().map(FileInput::Path).collect();
    stage_and_spawn(&state, inputs).await
}

/// Ingest uploaded files. Every multipart field carrying a file name is one input.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut inputs = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file data: {}", e)))?;
        debug!(file_name = %file_name, bytes = data.len(), "Received upload part");
        inputs.push(FileInput::bytes(file_name, data.to_vec()));
    }

    if inputs.is_empty() {
        return Err(ApiError::BadRequest(
            "No file uploaded. Send one or more multipart file fields.".to_string(),
        ));
    }
    stage_and_spawn(&state, inputs).await
}

// =============================================================================
// QUERIES
// =============================================================================

/// Folders and documents for an initial view.
pub async fn library(State(state): State<AppState>) -> Result<Json<LibrarySnapshot>, ApiError> {
    Ok(Json(state.db().await?.library().await?))
}

pub async fn list_documents(State(state): State<AppState>) -> Result<Json<Vec<Document>>, ApiError> {
    Ok(Json(state.db().await?.documents.list().await?))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>, ApiError> {
    state
        .db()
        .await?
        .documents
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Document not found: {}", id)))
}

pub async fn document_content(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentContent>, ApiError> {
    Ok(Json(state.db().await?.documents.content(id).await?))
}

/// Original bytes for in-app viewing.
pub async fn document_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let raw = state.db().await?.documents.raw_file(id).await?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!(
            "inline; filename=\"{}\"",
            sanitize_filename(&raw.file_name).replace('"', "_")
        ))
        .unwrap_or_else(|_| HeaderValue::from_static("inline")),
    );
    Ok((StatusCode::OK, headers, raw.data))
}

// =============================================================================
// MUTATIONS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct IdsRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    /// Target folder name; `null` moves to root.
    #[serde(default)]
    pub folder: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MoveManyRequest {
    pub ids: Vec<Uuid>,
    #[serde(default)]
    pub folder: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TagsRequest {
    pub tags: Vec<String>,
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.db().await?.documents.delete(id).await?;
    info!(subsystem = "api", op = "delete_document", document_id = %id, "Document deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_documents(
    State(state): State<AppState>,
    Json(req): Json<IdsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state.db().await?.documents.delete_many(&req.ids).await?;
    info!(
        subsystem = "api",
        op = "delete_documents",
        requested = req.ids.len(),
        deleted,
        "Documents deleted"
    );
    Ok(Json(serde_json::json!({ "deleted_count": deleted })))
}

pub async fn move_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<MoveRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .db()
        .await?
        .documents
        .move_to_folder(id, req.folder.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn move_documents(
    State(state): State<AppState>,
    Json(req): Json<MoveManyRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let moved = state
        .db()
        .await?
        .documents
        .move_many(&req.ids, req.folder.as_deref())
        .await?;
    Ok(Json(serde_json::json!({ "moved_count": moved })))
}

pub async fn set_tags(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TagsRequest>,
) -> Result<StatusCode, ApiError> {
    let mut tags: Vec<String> = Vec::with_capacity(req.tags.len());
    for tag in req.tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    state.db().await?.documents.set_tags(id, &tags).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// EXPORT
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    #[serde(default)]
    pub suggested_name: Option<String>,
    /// Target directory; falls back to the server's export directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

/// Write the original bytes to disk. Responds `{path}` or `{canceled: true}`.
pub async fn save_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SaveRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let raw = state.db().await?.documents.raw_file(id).await?;
    let picker = DirectoryPicker::new(req.directory.or_else(|| state.export_dir.clone()));

    let body = match write_export(&picker, &raw, req.suggested_name.as_deref()).await? {
        SaveOutcome::Saved { path } => serde_json::json!({ "path": path }),
        SaveOutcome::Canceled => serde_json::json!({ "canceled": true }),
    };
    Ok(Json(body))
}
