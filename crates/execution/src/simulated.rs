// In crates/execution/src/simulated.rs

use crate::types::{
    entry_fill_price, exit_fill_price, EntryRequest, Fill, FillStatus, Portfolio, SimulationSettings,
    VenuePosition,
};
use crate::{Error, Executor, Result};
use async_trait::async_trait;
use core_types::{fees, ExitReason, Position, Symbol};
use rust_decimal::Decimal;

/// Fills every order in full at the hinted price worsened by slippage, and
/// keeps a cash-and-positions portfolio like a venue account would.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    settings: SimulationSettings,
    portfolio: Portfolio,
}

impl SimulatedExecutor {
    pub fn new(settings: SimulationSettings, default_cash: Decimal) -> Self {
        let cash = settings.initial_cash.unwrap_or(default_cash);
        Self {
            settings,
            portfolio: Portfolio::new(cash),
        }
    }

    /// Processes an entry order (opening a new long or short position).
    fn process_entry(&mut self, order: &EntryRequest) -> Result<Fill> {
        if self.portfolio.open_positions.contains_key(&order.symbol) {
            return Err(Error::Rejected {
                reason: format!("position already open for {}", order.symbol),
            });
        }
        if order.quantity <= Decimal::ZERO || order.price_hint <= Decimal::ZERO {
            return Err(Error::Rejected {
                reason: format!("invalid order size {} at {}", order.quantity, order.price_hint),
            });
        }

        // --- 1. Calculate Execution Price with Slippage ---
        let execution_price = entry_fill_price(order.side, order.price_hint, self.settings.slippage_percent);

        // --- 2. Calculate Costs ---
        let position_value = order.quantity * execution_price;
        let fee = fees::fill_fee(execution_price, order.quantity, order.fee_rate);
        let margin = position_value / Decimal::from(order.leverage.max(1));

        // --- 3. Update Portfolio State ---
        if self.portfolio.cash < margin + fee {
            return Err(Error::InsufficientFunds {
                required: margin + fee,
                available: self.portfolio.cash,
            });
        }
        self.portfolio.cash -= fee;
        self.portfolio.open_positions.insert(
            order.symbol.clone(),
            VenuePosition {
                symbol: order.symbol.clone(),
                side: order.side,
                quantity: order.quantity,
                entry_price: execution_price,
            },
        );

        tracing::debug!(symbol = %order.symbol, side = %order.side, price = %execution_price, quantity = %order.quantity, "Simulated entry filled.");
        Ok(Fill {
            price: execution_price,
            quantity: order.quantity,
            requested_quantity: order.quantity,
            fee,
            slippage: (execution_price - order.price_hint).abs() * order.quantity,
            status: FillStatus::Full,
        })
    }

    /// Processes a closing order.
    fn process_close(&mut self, position: &Position, price_hint: Decimal) -> Result<Fill> {
        // --- 1. Find the Position to Close ---
        let open_position = self
            .portfolio
            .open_positions
            .remove(&position.symbol)
            .ok_or_else(|| Error::NoPosition(position.symbol.clone()))?;

        // --- 2. Calculate Execution Price with Slippage ---
        let execution_price = exit_fill_price(open_position.side, price_hint, self.settings.slippage_percent);

        // --- 3. Calculate P&L and Costs ---
        let pnl = (execution_price - open_position.entry_price) * open_position.quantity * open_position.side.sign();
        let fee = fees::fill_fee(execution_price, open_position.quantity, position.fee_rate);

        // --- 4. Update Portfolio State ---
        self.portfolio.cash += pnl - fee;

        Ok(Fill {
            price: execution_price,
            quantity: open_position.quantity,
            requested_quantity: position.quantity,
            fee,
            slippage: (execution_price - price_hint).abs() * open_position.quantity,
            status: if open_position.quantity < position.quantity {
                FillStatus::Partial
            } else {
                FillStatus::Full
            },
        })
    }
}

#[async_trait]
impl Executor for SimulatedExecutor {
    fn name(&self) -> &'static str {
        "SimulatedExecutor"
    }

    async fn place_entry(&mut self, request: &EntryRequest) -> Result<Fill> {
        self.process_entry(request)
    }

    async fn close(&mut self, position: &Position, reason: ExitReason, price_hint: Decimal) -> Result<Fill> {
        tracing::debug!(symbol = %position.symbol, %reason, %price_hint, "Simulated close requested.");
        self.process_close(position, price_hint)
    }

    async fn venue_position(&self, symbol: &Symbol) -> Result<Option<VenuePosition>> {
        Ok(self.portfolio.open_positions.get(symbol).cloned())
    }

    fn portfolio(&self) -> Option<&Portfolio> {
        Some(&self.portfolio)
    }
}
