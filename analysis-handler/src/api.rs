use crate::dispatcher::{Dispatcher, spawn_dispatch};
use crate::metrics_defs::{ANALYSIS_ACCEPTED, ANALYSIS_REJECTED};
use crate::model::{AnalysisAcknowledgment, BuildAnalysisRequest, ValidationError};
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        AppState { dispatcher }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/analyze", post(analyze_build))
        .with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(state)
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Body(#[from] JsonRejection),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error_message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            // Every unreadable body is a 422, whatever axum's own status
            ApiError::Body(rejection) => {
                (StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text())
            }
            ApiError::Validation(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
        };

        (status, Json(ApiErrorResponse { error_message })).into_response()
    }
}

/// Submits the build to Log Detective in a background task and answers
/// right away with the id the outcome message will carry.
async fn analyze_build(
    State(state): State<AppState>,
    payload: Result<Json<BuildAnalysisRequest>, JsonRejection>,
) -> Result<Json<AnalysisAcknowledgment>, ApiError> {
    let request = payload
        .map_err(ApiError::from)
        .and_then(|Json(request)| {
            request.validate()?;
            Ok(request)
        })
        .inspect_err(|e| {
            tracing::warn!(error = %e, "Rejected analysis request");
            crate::counter!(ANALYSIS_REJECTED).increment(1);
        })?;

    let analysis_id = Uuid::new_v4();
    tracing::info!(
        %analysis_id,
        target_build = %request.target_build,
        build_system = %request.build_system,
        "Accepted analysis request"
    );
    crate::counter!(ANALYSIS_ACCEPTED).increment(1);

    spawn_dispatch(state.dispatcher.clone(), request, analysis_id);

    Ok(Json(AnalysisAcknowledgment {
        log_detective_analysis_id: analysis_id,
    }))
}

async fn health() -> &'static str {
    "ok\n"
}

async fn ready(State(state): State<AppState>) -> Response {
    match state.dispatcher.publisher().is_ready().await {
        true => "ok\n".into_response(),
        false => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
