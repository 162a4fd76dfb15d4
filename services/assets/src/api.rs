use crate::asset_manager::{AssetEntry, AssetManager, SignedUrl, UploadResult};
use crate::config::ApiConfig;
use crate::error::{AssetError, StoreError};
use crate::object_store::BatchDeleteResult;
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<AssetManager>,
}

/// Upload request, field names as the web client sends them
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    /// Base64 image, optionally as a `data:image/...;base64,` URI
    pub encoded_file: String,
    /// Asset name shared by every variant
    pub encoded_file_name: String,
}

/// Request carrying a `<label>/<asset name>` key
#[derive(Debug, Deserialize)]
pub struct KeyRequest {
    pub key: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Failure rendered as an HTTP response
#[derive(Debug)]
pub enum ApiError {
    /// Body missing, not JSON, or missing required fields
    Request(JsonRejection),
    Asset(AssetError),
}

impl From<AssetError> for ApiError {
    fn from(err: AssetError) -> Self {
        Self::Asset(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Request(rejection)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        let err = match self {
            ApiError::Request(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                return StatusCode::PAYLOAD_TOO_LARGE;
            }
            ApiError::Request(_) => return StatusCode::BAD_REQUEST,
            ApiError::Asset(err) => err,
        };
        if err.is_timeout() {
            return StatusCode::GATEWAY_TIMEOUT;
        }
        match err {
            AssetError::Decode(_) | AssetError::InvalidAssetName(_) | AssetError::InvalidKey(_) => {
                StatusCode::BAD_REQUEST
            }
            AssetError::Encode { .. } | AssetError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AssetError::Fetch {
                source: StoreError::NotFound { .. },
                ..
            } => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Request(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                "PAYLOAD_TOO_LARGE"
            }
            ApiError::Request(_) => "INVALID_REQUEST",
            ApiError::Asset(err) => err.code(),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Request(rejection) => rejection.body_text(),
            ApiError::Asset(err) => err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.message(),
            code: self.code().to_string(),
        };

        if status.is_server_error() {
            error!(error = %body.error, code = %body.code, "Request failed");
        } else {
            warn!(error = %body.error, code = %body.code, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/user/upload", post(upload_asset))
        .route("/user/delete", post(delete_asset))
        .route("/user/get", get(list_assets))
        .route("/user/getOriginal", post(get_original_url))
        .route("/user/file/*key", get(get_file))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "asset-service"
    }))
}

/// Upload one image as a group of resized variants
#[instrument(skip_all)]
async fn upload_asset(
    State(state): State<AppState>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<Vec<UploadResult>>, ApiError> {
    let Json(request) = payload?;
    let results = state
        .manager
        .upload(request.encoded_file, &request.encoded_file_name)
        .await?;
    Ok(Json(results))
}

/// Delete every variant of the asset named by a composite key
#[instrument(skip_all)]
async fn delete_asset(
    State(state): State<AppState>,
    payload: Result<Json<KeyRequest>, JsonRejection>,
) -> Result<Json<BatchDeleteResult>, ApiError> {
    let Json(request) = payload?;
    let result = state.manager.delete_by_composite_key(&request.key).await?;
    Ok(Json(result))
}

/// List assets with signed URLs for their representative variant
#[instrument(skip(state))]
async fn list_assets(State(state): State<AppState>) -> Result<Json<Vec<AssetEntry>>, ApiError> {
    Ok(Json(state.manager.list_assets().await?))
}

/// Signed URL for the original-size variant
#[instrument(skip_all)]
async fn get_original_url(
    State(state): State<AppState>,
    payload: Result<Json<KeyRequest>, JsonRejection>,
) -> Result<Json<SignedUrl>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.manager.signed_original_url(&request.key).await?))
}

/// Raw bytes of one stored object
#[instrument(skip(state))]
async fn get_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let object = state.manager.get_file(&key).await?;
    let content_type = object
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        object.body,
    )
        .into_response())
}

/// Start the asset API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting asset API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}
