//! adpulse agents.
//!
//! The model-facing half of the diagnostic core:
//!
//! - **RcaOrchestrator**: per anomaly, lets the model pick probes from the
//!   fixed catalog, executes them, and resolves the accumulated evidence
//!   into a root-cause verdict deterministically.
//!   Classification: ANALYSIS
//!
//! - **RecommendationGenerator**: converts classified ads into budget
//!   actions with dollar-impact estimates; every model-drafted field is
//!   checked against source facts before it is accepted.
//!   Classification: RECOMMENDATION
//!
//! - **GroundedValidator**: stateless checks that model output never
//!   contradicts the warehouse; drives retry-with-feedback and the
//!   rule-based fallback.
//!
//! - **ExecutionSimulator**: dry-run state machine over approved
//!   recommendations; no external side effects.
//!
//! The model's only freedom is probe selection and prose. Verdicts,
//! classifications that survive validation, and execution outcomes are all
//! produced by code.

pub mod execute;
pub mod model;
pub mod rca;
pub mod recommend;
pub mod validator;

pub use execute::{ExecutionSimulator, ExecutionSummary, PlatformWriter};
pub use model::{
    probe_preferences, DecisionTableModel, HttpModel, ModelClient, ModelTurn, RcaContext,
    RecommendationDraft, RecommendationFacts,
};
pub use rca::RcaOrchestrator;
pub use recommend::{RecommendationGenerator, RecommendationSummary};
pub use validator::GroundedValidator;
