//! # adpulse-detection
//!
//! The diagnostic core of adpulse:
//!
//! - **Baseline engine**: per-metric account statistics over the window
//! - **Anomaly detector**: z-score classification with severity bands and
//!   the bad-only business-polarity filter
//! - **Diagnostic probes**: six side-effect-free checks over warehouse
//!   series, each emitting structured evidence
//! - **Agents**: the model-driven RCA orchestration loop, the grounded
//!   recommendation generator, the output validator, and the execution
//!   simulator

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod agents;
pub mod baseline;
pub mod detector;
pub mod probes;
pub mod stats;

pub use baseline::BaselineEngine;
pub use detector::AnomalyDetector;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::agents::execute::{ExecutionSimulator, ExecutionSummary, PlatformWriter};
    pub use crate::agents::model::{
        DecisionTableModel, HttpModel, ModelClient, ModelTurn, RcaContext, RecommendationDraft,
        RecommendationFacts,
    };
    pub use crate::agents::rca::RcaOrchestrator;
    pub use crate::agents::recommend::{RecommendationGenerator, RecommendationSummary};
    pub use crate::agents::validator::GroundedValidator;
    pub use crate::baseline::BaselineEngine;
    pub use crate::detector::AnomalyDetector;
    pub use crate::probes::{run_probe, ProbeRequest, ProbeSpec};
}
