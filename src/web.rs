use crate::{
    config::Config,
    semantic::{SearchQuery, SearchResult, SemanticSearchError, SemanticSearchService},
};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, sync::Arc};
use tokio::signal;

pub struct SharedState {
    pub service: Arc<SemanticSearchService>,
    pub config: Config,
}

pub fn router(state: Arc<SharedState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/text", post(store_text))
        .route("/search", post(search))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutting down");
}

async fn start_app(state: SharedState, addr: String) -> anyhow::Result<()> {
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn start_daemon(state: SharedState, addr: String) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_app(state, addr))
}

/// JSON envelope shared by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn success(message: &str, data: T) -> Json<Self> {
        Json(Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: Some(data),
            error: None,
        })
    }
}

#[derive(Debug)]
enum HttpError {
    Search(SemanticSearchError),
    NoResults,
}

// Tell axum how to convert `HttpError` into a response.
impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let (status, message, error) = match &self {
            HttpError::NoResults => (
                StatusCode::NOT_FOUND,
                "No results found",
                "No results found".to_string(),
            ),
            HttpError::Search(err @ SemanticSearchError::InvalidArgument(_)) => {
                (StatusCode::BAD_REQUEST, "Invalid input", err.to_string())
            }
            HttpError::Search(err) => {
                log::error!("{err:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Request failed",
                    err.to_string(),
                )
            }
        };

        let body = ApiResponse::<()> {
            status: "error".to_string(),
            message: message.to_string(),
            data: None,
            error: Some(error),
        };

        (status, Json(body)).into_response()
    }
}

// This enables using `?` on functions that return `Result<_, SemanticSearchError>`.
impl From<SemanticSearchError> for HttpError {
    fn from(err: SemanticSearchError) -> Self {
        Self::Search(err)
    }
}

fn invalid(message: impl Into<String>) -> HttpError {
    HttpError::Search(SemanticSearchError::InvalidArgument(message.into()))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Semantic Search API is running!".to_string(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthData {
    pub is_healthy: bool,
    pub store: String,
    pub model: String,
}

async fn health(State(state): State<Arc<SharedState>>) -> Json<ApiResponse<HealthData>> {
    let service = state.service.clone();

    let result = tokio::task::block_in_place(move || service.health_check());

    let data = HealthData {
        is_healthy: result.is_ok(),
        store: state.service.store_name().to_string(),
        model: state.service.model_name().to_string(),
    };

    match result {
        Ok(()) => ApiResponse::success("Health check passed", data),
        Err(err) => {
            log::error!("health check failed: {err}");
            Json(ApiResponse {
                status: "error".to_string(),
                message: "Health check failed".to_string(),
                data: Some(data),
                error: Some(err.to_string()),
            })
        }
    }
}

#[derive(Deserialize)]
pub struct TextRequest {
    pub session_id: String,
    pub text: String,
    pub chunk_size: Option<i64>,
}

impl Debug for TextRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TextRequest {{ session_id: {:?}, text: [{} bytes], chunk_size: {:?} }}",
            self.session_id,
            self.text.len(),
            self.chunk_size
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TextResponse {
    pub chunks_stored: usize,
}

async fn store_text(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<TextRequest>,
) -> Result<Json<ApiResponse<TextResponse>>, HttpError> {
    log::debug!("payload: {payload:?}");

    let chunk_size = match payload.chunk_size {
        None => state.config.store.default_chunk_size,
        Some(n) => usize::try_from(n)
            .map_err(|_| invalid(format!("chunk_size must be greater than 0, got {n}")))?,
    };

    let service = state.service.clone();

    let report = tokio::task::block_in_place(move || {
        service.store_text(&payload.session_id, &payload.text, chunk_size)
    })?;

    Ok(ApiResponse::success(
        "Text stored successfully",
        TextResponse {
            chunks_stored: report.chunks_stored,
        },
    ))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub session_id: String,
    pub query: String,
    pub limit: Option<i64>,
    pub base_similarity: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub top_results: Vec<SearchResult>,
}

async fn search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<ApiResponse<SearchResponse>>, HttpError> {
    log::debug!("payload: {payload:?}");

    let limit = match payload.limit {
        None => state.config.search.default_limit,
        Some(n) => usize::try_from(n)
            .map_err(|_| invalid(format!("limit must not be negative, got {n}")))?,
    };

    let query = SearchQuery::new(payload.session_id, payload.query)
        .with_limit(limit)
        .with_base_similarity(
            payload
                .base_similarity
                .unwrap_or(state.config.search.default_base_similarity),
        );

    let service = state.service.clone();

    let (query, results) = tokio::task::block_in_place(move || {
        service.search(&query).map(|results| (query, results))
    })?;

    if results.is_empty() {
        return Err(HttpError::NoResults);
    }

    Ok(ApiResponse::success(
        "Search results returned successfully",
        SearchResponse {
            query: query.query,
            top_results: results,
        },
    ))
}
