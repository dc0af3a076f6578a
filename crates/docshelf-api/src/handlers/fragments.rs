//! Text and image fragment edits.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use docshelf_db::FragmentRepository;

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct UpdateTextRequest {
    pub content: String,
}

pub async fn update_text_fragment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTextRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .db()
        .await?
        .fragments
        .update_text(id, &req.content)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_text_fragment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.db().await?.fragments.delete_text(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_image_fragment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.db().await?.fragments.delete_image(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
