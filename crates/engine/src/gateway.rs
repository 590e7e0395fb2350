// In crates/engine/src/gateway.rs

use crate::Result;
use async_trait::async_trait;
use core_types::{Interval, Kline, Symbol};
use rust_decimal::Decimal;

/// Everything a market data transport delivers to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// A final or in-progress kline. Bars for one stream arrive in time order;
    /// a repeated `open_time` replaces the earlier delivery.
    Kline {
        symbol: Symbol,
        interval: Interval,
        kline: Kline,
    },
    Tick {
        symbol: Symbol,
        price: Decimal,
        time: i64,
    },
    /// The transport reconnected. `history` is the full current window for the
    /// stream and is delivered before any further incremental update.
    Reconnected {
        symbol: Symbol,
        interval: Interval,
        history: Vec<Kline>,
    },
}

impl GatewayEvent {
    pub fn symbol(&self) -> &Symbol {
        match self {
            GatewayEvent::Kline { symbol, .. }
            | GatewayEvent::Tick { symbol, .. }
            | GatewayEvent::Reconnected { symbol, .. } => symbol,
        }
    }
}

/// The market data transport. Connection handling, reconnect and backfill live
/// behind this trait.
#[async_trait]
pub trait MarketDataGateway: Send {
    fn name(&self) -> &'static str;

    async fn subscribe(&mut self, symbol: &Symbol, interval: Interval) -> Result<()>;

    async fn unsubscribe(&mut self, symbol: &Symbol, interval: Interval) -> Result<()>;

    /// The next event across all subscribed streams, or `None` once the feed has ended.
    async fn next_event(&mut self) -> Result<Option<GatewayEvent>>;
}
