//! API request handlers.
//!
//! One module per logical operation:
//! - `analyze` - run detection + diagnosis, open a session
//! - `recommend` - generate grounded recommendations for a session
//! - `execute` - simulate approved recommendations
//! - `health` - liveness / readiness triplet
//! - `metrics` - Prometheus exposition

pub mod analyze;
pub mod execute;
pub mod health;
pub mod metrics;
pub mod recommend;

pub use analyze::*;
pub use execute::*;
pub use health::*;
pub use metrics::*;
pub use recommend::*;
