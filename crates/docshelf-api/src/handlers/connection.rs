//! Store connection lifecycle handlers.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use docshelf_db::{ConnectionConfig, Error};

use crate::{ApiError, AppState};

/// Either a full `postgres://` URL or field-wise settings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ConnectRequest {
    Url { url: String },
    Fields(ConnectionConfig),
}

#[derive(Debug, Serialize)]
pub struct ConnectionStatus {
    pub state: &'static str,
}

pub async fn connection_status(State(state): State<AppState>) -> Json<ConnectionStatus> {
    Json(ConnectionStatus {
        state: state.connections.state().await.label(),
    })
}

/// Connect, replacing any existing connection.
pub async fn connect(
    State(state): State<AppState>,
    Json(req): Json<ConnectRequest>,
) -> Result<Json<ConnectionStatus>, ApiError> {
    let result = match req {
        ConnectRequest::Url { url } => state.connections.connect_url(&url).await,
        ConnectRequest::Fields(config) => state.connections.connect(&config).await,
    };
    result.map_err(connect_error)?;
    Ok(Json(ConnectionStatus {
        state: state.connections.state().await.label(),
    }))
}

pub async fn disconnect(State(state): State<AppState>) -> Json<ConnectionStatus> {
    state.connections.disconnect().await;
    Json(ConnectionStatus {
        state: state.connections.state().await.label(),
    })
}

/// Driver errors during connect become 503.
fn connect_error(err: Error) -> ApiError {
    match err {
        Error::Database(e) => ApiError::Unavailable(format!("Could not connect to database: {}", e)),
        other => other.into(),
    }
}
