//! Prometheus metrics handler
//!
//! - GET /metrics - exposition-format dump of the process recorder

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Shared state for the metrics handler
#[derive(Clone)]
pub struct MetricsState {
    /// Handle onto the installed Prometheus recorder
    pub handle: Arc<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsState").finish()
    }
}

impl MetricsState {
    /// Wrap an installed recorder handle
    pub fn new(handle: PrometheusHandle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<MetricsState>>) -> impl IntoResponse {
    (StatusCode::OK, state.handle.render())
}
