//! Folder handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use docshelf_db::{Folder, FolderColor, FolderRepository};

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
    #[serde(default)]
    pub color: FolderColor,
}

pub async fn list_folders(State(state): State<AppState>) -> Result<Json<Vec<Folder>>, ApiError> {
    Ok(Json(state.db().await?.folders.list().await?))
}

/// Create a folder; 409 when the name is taken.
pub async fn create_folder(
    State(state): State<AppState>,
    Json(req): Json<CreateFolderRequest>,
) -> Result<(StatusCode, Json<Folder>), ApiError> {
    match state.db().await?.folders.create(&req.name, req.color).await? {
        Some(folder) => Ok((StatusCode::CREATED, Json(folder))),
        None => Err(ApiError::Conflict(format!(
            "A folder named \"{}\" already exists",
            req.name.trim()
        ))),
    }
}

/// Delete a folder. Its documents move to root.
pub async fn delete_folder(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.db().await?.folders.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
