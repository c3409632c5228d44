//! HTTP surface: upload endpoint, health check and analysis history.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::QueryRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::analyzer::Severity;
use crate::errors::DentalSegError;
use crate::history::{AnalysisHistory, HistoryEntry};
use crate::pipeline::SegmentationPipeline;
use crate::traits::SegmentationModel;

pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];
const UPLOAD_FIELD: &str = "file";

pub struct AppState<M: SegmentationModel> {
    /// `None` when the model failed to load at startup.
    pub pipeline: Option<Arc<SegmentationPipeline<M>>>,
    pub history: AnalysisHistory,
    pub model_path: PathBuf,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InputRejected(String),

    #[error("Model could not be loaded. Check the server logs and make sure the model file exists.")]
    ModelUnavailable,

    #[error("Error while processing image: {0}")]
    Processing(String),
}

impl ApiError {
    fn rejected(message: impl Into<String>) -> Self {
        Self::InputRejected(message.into())
    }
}

impl From<DentalSegError> for ApiError {
    fn from(err: DentalSegError) -> Self {
        Self::Processing(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::InputRejected(_) => StatusCode::BAD_REQUEST,
            ApiError::ModelUnavailable | ApiError::Processing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            error!(status = status.as_u16(), "{self}");
        } else {
            warn!(status = status.as_u16(), "{self}");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub processed_image: String,
    pub detected_class: String,
    pub severity: Severity,
    pub class_percentages: BTreeMap<String, f64>,
    pub class_pixel_counts: BTreeMap<String, u64>,
    pub dominant_condition: String,
    pub legend: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub model_path: String,
    pub model_exists: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

pub fn router<M: SegmentationModel + 'static>(
    state: Arc<AppState<M>>,
    max_upload_bytes: usize,
) -> Router {
    Router::new()
        .route("/predict_endpoint", post(predict::<M>))
        .route("/health", get(health::<M>))
        .route("/history", get(history::<M>))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// POST /predict_endpoint - analyze one uploaded image
pub async fn predict<M: SegmentationModel + 'static>(
    State(state): State<Arc<AppState<M>>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let pipeline = state.pipeline.clone().ok_or(ApiError::ModelUnavailable)?;
    let mut multipart = multipart.map_err(|e| ApiError::rejected(e.body_text()))?;
    let (file_name, bytes) = read_upload(&mut multipart).await?;
    info!(file = %file_name, bytes = bytes.len(), "processing upload");

    let worker = Arc::clone(&pipeline);
    let (analysis, processed_image) = tokio::task::spawn_blocking(move || {
        let diagnosis = worker.process_bytes(&bytes)?;
        let processed_image = diagnosis.overlay_data_uri()?;
        Ok::<_, DentalSegError>((diagnosis.analysis, processed_image))
    })
    .await
    .map_err(|e| ApiError::Processing(e.to_string()))?
    .map_err(|e| {
        error!(file = %file_name, error = ?e, "processing failed");
        ApiError::from(e)
    })?;

    state
        .history
        .record(HistoryEntry::new(&analysis, processed_image.clone()));
    info!(
        file = %file_name,
        severity = %analysis.severity,
        dominant = %analysis.dominant_condition,
        "analysis completed"
    );

    Ok(Json(PredictionResponse {
        processed_image,
        detected_class: analysis.detected_class,
        severity: analysis.severity,
        class_percentages: analysis.class_percentages,
        class_pixel_counts: analysis.class_pixel_counts,
        dominant_condition: analysis.dominant_condition,
        legend: pipeline.catalog().legend(),
    }))
}

/// GET /health
pub async fn health<M: SegmentationModel + 'static>(
    State(state): State<Arc<AppState<M>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model_loaded: state.pipeline.is_some(),
        model_path: state.model_path.display().to_string(),
        model_exists: state.model_path.exists(),
        timestamp: Utc::now(),
    })
}

/// GET /history - recent analyses, newest first
pub async fn history<M: SegmentationModel + 'static>(
    State(state): State<Arc<AppState<M>>>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::rejected(e.body_text()))?;
    let limit = query.limit.unwrap_or_else(|| state.history.capacity());
    Ok(Json(state.history.recent(limit)))
}

async fn read_upload(multipart: &mut Multipart) -> Result<(String, Bytes), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::rejected(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Err(ApiError::rejected("No file selected for upload."));
        }
        if !is_supported_image_format(&file_name) {
            return Err(ApiError::rejected(
                "File type not allowed. Use PNG, JPG, or JPEG.",
            ));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::rejected(format!("Failed to read upload: {e}")))?;
        return Ok((file_name, data));
    }

    Err(ApiError::rejected("No file part in the request."))
}

/// Case-insensitive check of the text after the last `.` against [`ALLOWED_EXTENSIONS`].
pub fn is_supported_image_format(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .is_some_and(|(_, extension)| {
            ALLOWED_EXTENSIONS.contains(&extension.to_lowercase().as_str())
        })
}
