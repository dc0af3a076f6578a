//! docshelf-api - HTTP API server for the docshelf PDF library

mod config;
mod handlers;
mod services;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Sse,
    },
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use docshelf_core::defaults::SSE_KEEPALIVE_SECS;
use docshelf_core::{EventBus, EventEnvelope, Extractor};
use docshelf_db::{log_pool_metrics, ConnectionManager, ConnectionState, Database, PoolConfig};
use docshelf_ingest::{
    IngestPipeline, PdfTextExtractor, ProcessExtractor, ProcessExtractorConfig, StagingArea,
};

use config::{ApiConfig, ExtractorBackend};
use handlers::{connection, documents, folders, fragments};

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    /// Runtime database connection; handlers fail with 503 while disconnected.
    connections: Arc<ConnectionManager>,
    /// Ingestion pipeline shared by the import and upload endpoints.
    pipeline: Arc<IngestPipeline>,
    /// Event bus for document lifecycle notifications (SSE).
    event_bus: Arc<EventBus>,
    /// Default directory for saving documents to disk.
    export_dir: Option<PathBuf>,
}

impl AppState {
    async fn db(&self) -> Result<Database, ApiError> {
        Ok(self.connections.database().await?)
    }
}

fn parse_allowed_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect()
}

fn build_extractor(config: &ApiConfig) -> Arc<dyn Extractor> {
    match config.extractor_backend {
        ExtractorBackend::Process => Arc::new(ProcessExtractor::new(ProcessExtractorConfig {
            program: config.extractor_program.clone(),
            script: config.extractor_script.clone(),
            timeout: config.extractor_timeout,
        })),
        ExtractorBackend::PdfToText => Arc::new(PdfTextExtractor::default()),
    }
}

fn build_router(state: AppState, config: &ApiConfig) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Connection lifecycle
        .route(
            "/api/v1/connection",
            get(connection::connection_status)
                .post(connection::connect)
                .delete(connection::disconnect),
        )
        // Initial data load
        .route("/api/v1/library", get(documents::library))
        // Documents
        .route("/api/v1/documents", get(documents::list_documents))
        .route("/api/v1/documents/import", post(documents::import_paths))
        .route("/api/v1/documents/upload", post(documents::upload))
        .route("/api/v1/documents/delete", post(documents::delete_documents))
        .route("/api/v1/documents/move", post(documents::move_documents))
        .route(
            "/api/v1/documents/:id",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route("/api/v1/documents/:id/move", post(documents::move_document))
        .route("/api/v1/documents/:id/tags", put(documents::set_tags))
        .route("/api/v1/documents/:id/content", get(documents::document_content))
        .route("/api/v1/documents/:id/file", get(documents::document_file))
        .route("/api/v1/documents/:id/save", post(documents::save_document))
        // Folders
        .route(
            "/api/v1/folders",
            get(folders::list_folders).post(folders::create_folder),
        )
        .route("/api/v1/folders/:id", delete(folders::delete_folder))
        // Fragments
        .route(
            "/api/v1/text-fragments/:id",
            patch(fragments::update_text_fragment).delete(fragments::delete_text_fragment),
        )
        .route(
            "/api/v1/image-fragments/:id",
            delete(fragments::delete_image_fragment),
        )
        // SSE events
        .route("/api/v1/events", get(sse_events))
        // Middleware
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(parse_allowed_origins(
                    &config.allowed_origins,
                )))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
                .max_age(Duration::from_secs(3600)),
        )
        // Uploads carry whole PDFs
        .layer(DefaultBodyLimit::max(config.max_body_size))
        .layer(RequestBodyLimitLayer::new(config.max_body_size))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "docshelf_api=debug,docshelf_ingest=debug,docshelf_db=info,tower_http=debug".into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("docshelf-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false)); // no ANSI in files by default
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = ApiConfig::from_env()?;

    // Event bus and ingestion pipeline
    let event_bus = Arc::new(EventBus::new(config.event_bus_capacity));
    let extractor = build_extractor(&config);
    match extractor.health_check().await {
        Ok(true) => info!(extractor = extractor.name(), "Extractor available"),
        Ok(false) | Err(_) => warn!(
            extractor = extractor.name(),
            "Extractor dependencies not found; ingested documents will end in error"
        ),
    }
    let staging = config
        .staging_dir
        .clone()
        .map(StagingArea::new)
        .unwrap_or_default();
    let pipeline = Arc::new(IngestPipeline::new(
        extractor,
        event_bus.clone(),
        staging,
    ));

    // Database connection (optional at startup)
    let connections = Arc::new(
        ConnectionManager::new(
            PoolConfig::new()
                .max_connections(config.db_max_connections)
                .connect_timeout(config.db_connect_timeout),
        )
        .with_auto_migrate(config.auto_migrate),
    );
    if let Some(url) = &config.database_url {
        if let Err(e) = connections.connect_url(url).await {
            warn!(error = %e, "Initial database connection failed; connect through /api/v1/connection");
        }
    } else {
        info!("DATABASE_URL not set; waiting for a connection request");
    }

    let state = AppState {
        connections: connections.clone(),
        pipeline,
        event_bus,
        export_dir: config.export_dir.clone(),
    };
    let app = build_router(state, &config);

    // Start server
    let addr: SocketAddr = config.bind_address().parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    connections.disconnect().await;
    Ok(())
}

// =============================================================================
// EVENTING: SSE
// =============================================================================

fn sse_event(envelope: &EventEnvelope) -> Option<Event> {
    let json = serde_json::to_string(envelope).ok()?;
    Some(
        Event::default()
            .event(envelope.event_type.clone())
            .id(envelope.event_id.to_string())
            .data(json),
    )
}

/// SSE event stream handler.
///
/// Clients connect to `/api/v1/events` and receive `document.created`,
/// `document.updated` and `notice.warning` events.
async fn sse_events(
    State(state): State<AppState>,
) -> Sse<impl futures::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let rx = state.event_bus.subscribe();

    use tokio_stream::StreamExt as _;
    let stream = tokio_stream::wrappers::BroadcastStream::new(rx).filter_map(|result| {
        match result {
            Ok(envelope) => sse_event(&envelope).map(Ok),
            Err(_) => None, // Skip lagged/closed errors
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(SSE_KEEPALIVE_SECS))
            .text("keepalive"),
    )
}

// =============================================================================
// HEALTH CHECK
// =============================================================================

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let connection = state.connections.state().await;
    let database = connection.label();
    let pool = match &connection {
        ConnectionState::Connected(db) => {
            log_pool_metrics(db.pool());
            Some(serde_json::json!({
                "size": db.pool().size(),
                "idle": db.pool().num_idle(),
            }))
        }
        _ => None,
    };
    let extractor = state.pipeline.extractor();
    let extractor_available = extractor.health_check().await.unwrap_or(false);
    let status = if database == "connected" && extractor_available {
        "healthy"
    } else {
        "degraded"
    };

    Json(serde_json::json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "database": database,
        "pool": pool,
        "extractor": {
            "name": extractor.name(),
            "available": extractor_available,
        },
        "event_subscribers": state.event_bus.subscriber_count(),
    }))
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[derive(Debug)]
enum ApiError {
    Internal(docshelf_core::Error),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unavailable(String),
    BadGateway(String),
}

impl From<docshelf_core::Error> for ApiError {
    fn from(err: docshelf_core::Error) -> Self {
        use docshelf_core::Error;
        match err {
            Error::NotFound(_) | Error::DocumentNotFound(_) | Error::FolderNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            Error::InvalidInput(msg) | Error::Config(msg) => ApiError::BadRequest(msg),
            Error::AlreadyExists(_) => ApiError::Conflict(err.to_string()),
            Error::NotConnected => ApiError::Unavailable(err.to_string()),
            Error::Extraction(_) => ApiError::BadGateway(err.to_string()),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
