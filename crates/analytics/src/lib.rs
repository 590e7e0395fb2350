// In crates/analytics/src/lib.rs

//! Performance statistics over a closed-trade log and an equity curve.

pub mod engine;
pub mod types;

pub use engine::AnalyticsEngine;
pub use types::{EquityPoint, PerformanceReport};
