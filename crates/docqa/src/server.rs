//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Landing page |
//! | `POST` | `/ask` | Answer `{ "query": "..." }` from the corpus |
//! | `POST` | `/upload` | Add a text file (multipart field `file`) to the corpus |
//! | `GET`  | `/health` | Status, version, and index size |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Query is required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `payload_too_large` (413),
//! `internal` (500), `ingestion_failed` (500), `upstream_error` (502),
//! `timeout` (503, with `Retry-After`).
//!
//! If the index storage becomes unavailable the server stops accepting
//! requests and [`run_server`] returns an error.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, State,
    },
    http::{header, HeaderValue, Method, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};

use docqa_core::models::Answer;
use docqa_core::RagError;

use crate::config::ServerConfig;
use crate::engine::Engine;

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
    /// Signalled when the index becomes unavailable.
    fatal: Arc<Notify>,
}

/// Bind to `[server].bind` and serve until Ctrl-C or a fatal index error,
/// then persist the index.
pub async fn run_server(engine: Arc<Engine>) -> anyhow::Result<()> {
    let bind_addr = engine.config().server.bind.clone();
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "listening");
    println!("{} listening on http://{}", engine.bot_name(), bind_addr);

    serve(listener, engine.clone(), shutdown_signal()).await?;

    engine.shutdown().await?;
    if !engine.index().is_available() {
        anyhow::bail!("server stopped: vector index storage became unavailable");
    }
    Ok(())
}

/// Serve on an already-bound listener until `shutdown` resolves or the index
/// becomes unavailable.
pub async fn serve(
    listener: TcpListener,
    engine: Arc<Engine>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let fatal = Arc::new(Notify::new());
    let app = router(engine, fatal.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown => info!("shutdown requested"),
                _ = fatal.notified() => error!("index unavailable; shutting down"),
            }
        })
        .await?;
    Ok(())
}

fn router(engine: Arc<Engine>, fatal: Arc<Notify>) -> Router {
    let server_config = engine.config().server.clone();
    let state = AppState { engine, fatal };

    Router::new()
        .route("/", get(handle_home))
        .route("/ask", post(handle_ask))
        .route("/upload", post(handle_upload))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(server_config.max_upload_bytes))
        .layer(cors_layer(&server_config))
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origin = if config.cors_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    retry_after: Option<u64>,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            retry_after: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn multipart_error(e: MultipartError) -> AppError {
    let status = e.status();
    let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "payload_too_large"
    } else {
        "bad_request"
    };
    AppError::new(status, code, e.body_text())
}

/// Map an engine error to a response, prefixing the message with `context`.
///
/// With a context (uploads), every server-side failure other than a timeout
/// is a 500 `ingestion_failed`.
fn classify(err: &RagError, context: &str) -> AppError {
    let message = format!("{}{}", context, err.public_message());
    match err.root() {
        RagError::Validation(_) | RagError::EmptyQuery => bad_request(err.public_message()),
        RagError::ServiceTimeout { timeout, .. } => {
            let mut e = AppError::new(StatusCode::SERVICE_UNAVAILABLE, "timeout", message);
            e.retry_after = Some(timeout.as_secs().max(1));
            e
        }
        RagError::Service { .. } if context.is_empty() => {
            AppError::new(StatusCode::BAD_GATEWAY, "upstream_error", message)
        }
        _ if context.is_empty() => {
            AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
        }
        _ => AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "ingestion_failed", message),
    }
}

impl AppState {
    /// Log `err`, trigger shutdown if it is fatal, and build the response.
    fn fail(&self, err: RagError, context: &str) -> AppError {
        if err.is_fatal() {
            self.fatal.notify_one();
        }
        if err.is_client_error() {
            warn!(error = %err, "request rejected");
        } else {
            error!(error = %err, "request failed");
        }
        classify(&err, context)
    }
}

// ============ GET / ============

async fn handle_home() -> Html<&'static str> {
    Html(INDEX_HTML)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    entries: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let index = state.engine.index();
    Json(HealthResponse {
        status: if index.is_available() { "ok" } else { "unavailable" },
        version: env!("CARGO_PKG_VERSION"),
        entries: index.len(),
    })
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    #[serde(default)]
    query: Option<String>,
}

async fn handle_ask(
    State(state): State<AppState>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Answer>, AppError> {
    let query = match body {
        Ok(Json(AskRequest { query: Some(q) })) if !q.trim().is_empty() => q,
        Ok(_) => return Err(bad_request("Query is required")),
        Err(rejection) => return Err(bad_request(rejection.body_text())),
    };

    let answer = state
        .engine
        .answer(&query)
        .await
        .map_err(|e| state.fail(e, ""))?;
    Ok(Json(answer))
}

// ============ POST /upload ============

#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    filename: String,
    chunks: usize,
}

async fn handle_upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut multipart = multipart.map_err(|_| bad_request("No file part in the request"))?;

    let mut file = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        file = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = file.ok_or_else(|| bad_request("No file part in the request"))?;
    if filename.is_empty() {
        return Err(bad_request("No selected file"));
    }

    let upload = state
        .engine
        .validate_upload(&filename, bytes.to_vec())
        .map_err(|e| state.fail(e, ""))?;
    let saved_as = upload.source().to_string();

    let chunks = match state.engine.commit_upload(upload).await {
        Ok(n) => n,
        Err(RagError::Io(e)) => {
            error!(error = %e, "failed to save upload");
            return Err(AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "Failed to save uploaded file",
            ));
        }
        Err(e) => return Err(state.fail(e, "File uploaded but failed to embed: ")),
    };

    Ok(Json(UploadResponse {
        message: "File uploaded and embedded successfully",
        filename: saved_as,
        chunks,
    }))
}
