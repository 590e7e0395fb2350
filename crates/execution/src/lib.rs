// In crates/execution/src/lib.rs

use async_trait::async_trait;
use core_types::{ExitReason, Position, Symbol};
use rust_decimal::Decimal;

pub mod error;
pub mod live;
pub mod simulated;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use live::{LiveExecutor, OrderAck, VenueClient};
pub use simulated::SimulatedExecutor;
pub use types::{
    entry_fill_price, exit_fill_price, EntryRequest, Fill, FillStatus, Portfolio, SimulationSettings,
    VenuePosition,
};

/// The universal interface for an execution handler.
///
/// An `Executor` places entry and exit orders against a target, which could be
/// a live exchange or a simulation, and reports what actually filled.
#[async_trait]
pub trait Executor: Send + Sync {
    /// The name of the executor (e.g., "LiveExecutor", "SimulatedExecutor").
    fn name(&self) -> &'static str;

    /// Opens a position with a market order.
    ///
    /// A fill for less than the requested size is returned as `FillStatus::Partial`,
    /// never silently as a full fill.
    async fn place_entry(&mut self, request: &EntryRequest) -> Result<Fill>;

    /// Closes the whole of `position`. `price_hint` is the level that triggered
    /// the close (stop, target or mark price).
    async fn close(&mut self, position: &Position, reason: ExitReason, price_hint: Decimal) -> Result<Fill>;

    /// The venue's current view of the position on `symbol`, if any.
    async fn venue_position(&self, symbol: &Symbol) -> Result<Option<VenuePosition>>;

    /// The simulated portfolio, for executors that keep one.
    fn portfolio(&self) -> Option<&Portfolio> {
        None
    }
}
