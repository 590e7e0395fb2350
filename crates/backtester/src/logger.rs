// In crates/backtester/src/logger.rs

use analytics::EquityPoint;
use core_types::{Position, TradeRecord};
use rust_decimal::Decimal;

/// A logger responsible for recording trades and equity changes during a backtest.
#[derive(Debug)]
pub struct TradeLogger {
    trades: Vec<TradeRecord>,
    equity_curve: Vec<EquityPoint>,
    realized: Decimal,
}

impl TradeLogger {
    pub fn new(initial_equity: Decimal) -> Self {
        Self {
            trades: Vec::new(),
            equity_curve: Vec::new(),
            realized: initial_equity,
        }
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn record_trade(&mut self, record: TradeRecord) {
        self.realized += record.net_pnl;
        self.trades.push(record);
    }

    /// Samples equity at `time`, marking any open position to `price` net of its entry fee.
    pub fn mark(&mut self, time: i64, position: Option<&Position>, price: Decimal) {
        let open = position.map_or(Decimal::ZERO, |p| p.unrealized_pnl(price) - p.entry_fee);
        self.equity_curve.push(EquityPoint::at_millis(time, self.realized + open));
    }

    /// Rewrites the last sample to realized equity, e.g. after a final close.
    pub fn restate_last(&mut self) {
        let realized = self.realized;
        if let Some(last) = self.equity_curve.last_mut() {
            last.value = realized;
        }
    }

    pub fn into_parts(self) -> (Vec<TradeRecord>, Vec<EquityPoint>) {
        (self.trades, self.equity_curve)
    }
}
