//! # adpulse-api
//!
//! Request surface for the adpulse diagnosis service. Three logical
//! operations drive the whole pipeline:
//!
//! - `POST /api/v1/analyze` - detect anomalies and diagnose root causes
//! - `POST /api/v1/recommend` - generate grounded recommendations
//! - `POST /api/v1/execute` - simulate approved recommendations
//!
//! plus session release, the health triplet, and Prometheus metrics.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod service;

pub use routes::create_router;
pub use service::AnalysisService;

use adpulse_core::Error;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Address to bind
    pub bind_addr: SocketAddr,
    /// Allowed CORS origins ("*" for any)
    pub cors_origins: Vec<String>,
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
    /// Request logging toggle
    pub enable_logging: bool,
    /// Path serving Prometheus metrics
    pub metrics_path: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 8080).into(),
            cors_origins: vec!["*".to_string()],
            timeout_secs: 150,
            enable_logging: true,
            metrics_path: "/metrics".to_string(),
        }
    }
}

/// Uniform success envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    /// Always true on this envelope
    pub success: bool,
    /// Operation payload
    pub data: T,
}

impl<T> SuccessResponse<T> {
    /// Wrap a payload
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Uniform error envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false on this envelope
    pub success: bool,
    /// Stable error kind
    pub error: String,
    /// Human-readable message
    pub message: String,
}

/// Map a core error onto an HTTP status and error envelope
pub fn error_response(err: &Error) -> (StatusCode, Json<ErrorResponse>) {
    let (status, kind) = match err {
        Error::UnknownTenant(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_TENANT"),
        Error::WindowOutOfRange { .. } => (StatusCode::BAD_REQUEST, "WINDOW_OUT_OF_RANGE"),
        Error::SessionExpired(_) => (StatusCode::NOT_FOUND, "SESSION_EXPIRED"),
        Error::UpstreamUnavailable(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_UNAVAILABLE"),
        Error::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
        Error::ModelProtocol(_) => (StatusCode::BAD_GATEWAY, "MODEL_PROTOCOL_VIOLATION"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
    };
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: kind.to_string(),
            message: err.to_string(),
        }),
    )
}

/// HTTP server wrapping the assembled router
#[derive(Debug)]
pub struct ApiServer {
    config: ApiConfig,
    router: axum::Router,
}

impl ApiServer {
    /// Create a server from config and a prepared router
    pub fn new(config: ApiConfig, router: axum::Router) -> Self {
        Self { config, router }
    }

    /// Bind and serve until the process shuts down
    pub async fn serve(self) -> adpulse_core::Result<()> {
        info!(addr = %self.config.bind_addr, "API server listening");
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| Error::upstream(format!("bind failed: {e}")))?;
        axum::serve(listener, self.router)
            .await
            .map_err(|e| Error::upstream(format!("server error: {e}")))
    }
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::handlers::health::HealthState;
    pub use crate::routes::create_router;
    pub use crate::service::{AnalysisService, AnalyzeSummary};
    pub use crate::{ApiConfig, ApiServer, ErrorResponse, SuccessResponse};
}
