//! # adpulse-core
//!
//! Shared foundation for the adpulse ad-performance diagnosis service:
//!
//! - Data model: ad summaries, baselines, anomalies, probe evidence,
//!   root-cause verdicts, recommendations, execution results
//! - Error taxonomy shared by every crate in the workspace
//! - Configuration loaded once at startup (thresholds, deadlines, tenants)
//! - In-memory session registry with idle-TTL expiry

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod config;
pub mod error;
pub mod session;
pub mod types;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{
        AnomalyConfig, Config, ModelConfig, ModelProvider, ProbeConfig, RcaConfig, SessionConfig,
        ValidatorConfig,
    };
    pub use crate::error::{Error, Result};
    pub use crate::session::{Session, SessionManager};
    pub use crate::types::*;
}
