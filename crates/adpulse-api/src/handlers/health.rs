//! Health handlers
//!
//! - GET /health - service status with version and session count
//! - GET /health/live - process liveness
//! - GET /health/ready - readiness, including the metric store

use crate::service::AnalysisService;
use crate::SuccessResponse;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Shared state for health handlers
#[derive(Debug, Clone)]
pub struct HealthState {
    /// Service version string
    pub version: String,
    /// Pipeline coordinator, for store and session introspection
    pub service: Arc<AnalysisService>,
}

/// Body of the full health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "ok" when serving
    pub status: String,
    /// Crate version
    pub version: String,
    /// Live session count
    pub active_sessions: usize,
}

/// GET /health
pub async fn health(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: state.version.clone(),
        active_sessions: state.service.sessions().active_count(),
    };
    (StatusCode::OK, Json(SuccessResponse::new(response)))
}

/// GET /health/live
pub async fn liveness() -> impl IntoResponse {
    StatusCode::OK
}

/// GET /health/ready
pub async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    match state.service.store().health_check().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => {
            warn!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "unavailable",
                    "message": err.to_string(),
                })),
            )
                .into_response()
        }
    }
}
