//! Error taxonomy for the adpulse workspace.
//!
//! One enum carries every failure kind the pipeline can surface. Probe-level
//! and validator-level failures are recovered close to where they occur;
//! warehouse/model terminal failures and invalid caller input propagate to
//! the request surface.

use uuid::Uuid;

/// Result type alias used throughout the workspace
pub type Result<T> = std::result::Result<T, Error>;

/// All error kinds surfaced by adpulse components
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Data warehouse or model provider failed terminally after retries
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Tenant short code is not in the configured registry
    #[error("unknown tenant: {0}")]
    UnknownTenant(String),

    /// Analysis window outside the accepted range
    #[error("analysis window of {days} days is out of range (1-365)")]
    WindowOutOfRange { days: u32 },

    /// Session identifier no longer resolves; the caller must re-analyze
    #[error("session {0} not found or expired")]
    SessionExpired(Uuid),

    /// Model output failed grounding or schema validation
    #[error("model protocol violation: {0}")]
    ModelProtocol(String),

    /// A deadline was exceeded
    #[error("deadline exceeded during {0}")]
    Timeout(String),

    /// Invalid configuration detected at startup
    #[error("configuration error: {0}")]
    Config(String),

    /// A warehouse record failed strict numeric parsing
    #[error("unparseable value {value:?} in column {column}")]
    Parse { column: String, value: String },

    /// JSON (de)serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Configuration error with a message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Terminal upstream failure with a message
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::UpstreamUnavailable(msg.into())
    }

    /// Model protocol violation with a message
    pub fn model(msg: impl Into<String>) -> Self {
        Self::ModelProtocol(msg.into())
    }

    /// Deadline exceeded while performing `what`
    pub fn timeout(what: impl Into<String>) -> Self {
        Self::Timeout(what.into())
    }

    /// Record-level parse failure
    pub fn parse(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Parse {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Whether a retry may succeed (transient upstream conditions only)
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_) | Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = Error::WindowOutOfRange { days: 999 };
        assert!(err.to_string().contains("999"));

        let err = Error::UnknownTenant("zz".to_string());
        assert!(err.to_string().contains("zz"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::upstream("503").is_transient());
        assert!(Error::timeout("probe").is_transient());
        assert!(!Error::config("bad").is_transient());
        assert!(!Error::UnknownTenant("x".into()).is_transient());
    }
}
