//! # adpulse-warehouse
//!
//! Read-only metric store adapter over the ad data warehouse.
//!
//! This crate provides:
//! - The `MetricStore` trait consumed by detection, probes, and the API
//! - Tenant registry mapping short codes to warehouse view identifiers
//! - Retry with exponential backoff for transient warehouse failures
//! - A deterministic fixture-backed store used in development and tests
//!
//! ## Design Principles
//!
//! 1. **Read-only**: no operation mutates warehouse state
//! 2. **Filter at source**: advertising and commerce rows are never mixed
//!    into one aggregate
//! 3. **Spend-weighted only**: ratio metrics aggregate as
//!    sum(metric * spend) / sum(spend); unweighted averages are a defect
//! 4. **UTC at the boundary**: all timestamps normalize to UTC calendar days
//!    before anything downstream sees them

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod adapters;
pub mod retry;
pub mod tenant;

pub use adapters::{DailyFunnel, DailyPoint, MetricStore, SeriesKind, SummaryFetch};
pub use retry::RetryPolicy;
pub use tenant::TenantRegistry;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::adapters::fixture::{FixtureStore, RawAdRow};
    pub use crate::adapters::{DailyFunnel, DailyPoint, MetricStore, SeriesKind, SummaryFetch};
    pub use crate::retry::RetryPolicy;
    pub use crate::tenant::TenantRegistry;
}
