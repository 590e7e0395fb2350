// In crates/execution/src/live.rs

use crate::types::{EntryRequest, Fill, FillStatus, VenuePosition};
use crate::{Error, Executor, Result};
use async_trait::async_trait;
use core_types::{ExitReason, Position, Side, Symbol};
use rust_decimal::Decimal;

/// The venue's acknowledgement of a market order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: u64,
    pub avg_price: Decimal,
    pub executed_qty: Decimal,
    /// Quote-currency value of the executed quantity.
    pub cum_quote: Decimal,
    /// Commission reported by the venue, when the acknowledgement carries it.
    pub commission: Option<Decimal>,
}

/// The signed-request surface of a derivatives venue. Transport, signing and
/// rate limiting live behind this trait.
#[async_trait]
pub trait VenueClient: Send + Sync {
    async fn set_leverage(&self, symbol: &Symbol, leverage: u8) -> std::result::Result<(), String>;

    /// Places a market order. `reduce_only` orders may only shrink an existing position.
    async fn place_market_order(
        &self,
        symbol: &Symbol,
        buy: bool,
        quantity: Decimal,
        reduce_only: bool,
    ) -> std::result::Result<OrderAck, String>;

    async fn position(&self, symbol: &Symbol) -> std::result::Result<Option<VenuePosition>, String>;
}

/// An executor that places real orders through a [`VenueClient`].
///
/// The venue's fill report is the source of truth: entry price, quantity and
/// fee all come from the acknowledgement, not from the request.
#[derive(Debug, Clone)]
pub struct LiveExecutor<C: VenueClient> {
    client: C,
}

impl<C: VenueClient> LiveExecutor<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn fill_from_ack(ack: &OrderAck, requested: Decimal, price_hint: Decimal, fee_rate: Decimal) -> Result<Fill> {
        if ack.executed_qty <= Decimal::ZERO {
            return Err(Error::Rejected {
                reason: format!("order {} executed nothing", ack.order_id),
            });
        }
        let fee = ack.commission.unwrap_or(ack.cum_quote * fee_rate);
        let status = if ack.executed_qty < requested {
            FillStatus::Partial
        } else {
            FillStatus::Full
        };
        Ok(Fill {
            price: ack.avg_price,
            quantity: ack.executed_qty,
            requested_quantity: requested,
            fee,
            slippage: (ack.avg_price - price_hint).abs() * ack.executed_qty,
            status,
        })
    }
}

#[async_trait]
impl<C: VenueClient> Executor for LiveExecutor<C> {
    fn name(&self) -> &'static str {
        "LiveExecutor"
    }

    async fn place_entry(&mut self, request: &EntryRequest) -> Result<Fill> {
        tracing::info!(symbol = %request.symbol, side = %request.side, quantity = %request.quantity, "Executing live entry...");

        // --- Step 1: Set Leverage ---
        // Leverage is set before every entry so the venue never trades at a stale setting.
        if let Err(e) = self.client.set_leverage(&request.symbol, request.leverage).await {
            tracing::error!(error = %e, "Failed to set leverage. Aborting trade.");
            return Err(Error::ExecutionFailed {
                reason: format!("Failed to set leverage: {}", e),
            });
        }
        tracing::info!(leverage = request.leverage, "Leverage set successfully.");

        // --- Step 2: Place the Market Order ---
        let ack = match self
            .client
            .place_market_order(&request.symbol, request.side == Side::Long, request.quantity, false)
            .await
        {
            Ok(ack) => ack,
            Err(e) => {
                tracing::error!(error = %e, "Failed to place market order.");
                return Err(Error::ExecutionFailed {
                    reason: format!("Failed to place order: {}", e),
                });
            }
        };
        tracing::info!(?ack, "Market entry acknowledged.");

        // --- Step 3: Build the Fill from the REAL Fill Data ---
        let fill = Self::fill_from_ack(&ack, request.quantity, request.price_hint, request.fee_rate)?;
        if fill.is_partial() {
            tracing::warn!(requested = %request.quantity, executed = %fill.quantity, "Entry only partially filled.");
        }
        Ok(fill)
    }

    async fn close(&mut self, position: &Position, reason: ExitReason, price_hint: Decimal) -> Result<Fill> {
        tracing::info!(symbol = %position.symbol, position_id = position.id, %reason, "Executing live close...");

        let ack = self
            .client
            .place_market_order(&position.symbol, position.side == Side::Short, position.quantity, true)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to place closing order.");
                Error::ExecutionFailed {
                    reason: format!("Failed to place closing order: {}", e),
                }
            })?;
        tracing::info!(?ack, "Closing order acknowledged.");

        let fill = Self::fill_from_ack(&ack, position.quantity, price_hint, position.fee_rate)?;
        if fill.is_partial() {
            tracing::warn!(requested = %position.quantity, executed = %fill.quantity, "Close only partially filled.");
        }
        Ok(fill)
    }

    async fn venue_position(&self, symbol: &Symbol) -> Result<Option<VenuePosition>> {
        self.client.position(symbol).await.map_err(Error::Venue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{NewPosition, StopReason};
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    /// Replays canned acknowledgements and records what it was asked to do.
    #[derive(Default)]
    struct ScriptedClient {
        acks: Mutex<Vec<std::result::Result<OrderAck, String>>>,
        orders: Mutex<Vec<(bool, Decimal, bool)>>,
        fail_leverage: bool,
    }

    #[async_trait]
    impl VenueClient for ScriptedClient {
        async fn set_leverage(&self, _symbol: &Symbol, _leverage: u8) -> std::result::Result<(), String> {
            if self.fail_leverage {
                Err("leverage not allowed".into())
            } else {
                Ok(())
            }
        }

        async fn place_market_order(
            &self,
            _symbol: &Symbol,
            buy: bool,
            quantity: Decimal,
            reduce_only: bool,
        ) -> std::result::Result<OrderAck, String> {
            self.orders.lock().unwrap().push((buy, quantity, reduce_only));
            self.acks.lock().unwrap().remove(0)
        }

        async fn position(&self, _symbol: &Symbol) -> std::result::Result<Option<VenuePosition>, String> {
            Err("timeout".into())
        }
    }

    fn ack(qty: Decimal) -> OrderAck {
        OrderAck {
            order_id: 7,
            avg_price: dec!(100.5),
            executed_qty: qty,
            cum_quote: dec!(100.5) * qty,
            commission: None,
        }
    }

    fn request() -> EntryRequest {
        EntryRequest {
            symbol: "ETHUSDT".into(),
            side: Side::Short,
            quantity: dec!(2),
            leverage: 3,
            price_hint: dec!(100),
            fee_rate: dec!(0.001),
            time: 0,
        }
    }

    #[tokio::test]
    async fn entry_uses_venue_fill_data() {
        let client = ScriptedClient {
            acks: Mutex::new(vec![Ok(ack(dec!(2)))]),
            ..Default::default()
        };
        let mut exec = LiveExecutor::new(client);
        let fill = exec.place_entry(&request()).await.unwrap();
        assert_eq!(fill.price, dec!(100.5));
        assert_eq!(fill.fee, dec!(0.201));
        assert_eq!(fill.status, FillStatus::Full);
        assert_eq!(exec.client().orders.lock().unwrap()[0], (false, dec!(2), false));
    }

    #[tokio::test]
    async fn short_fill_is_reported_partial_and_empty_fill_rejected() {
        let client = ScriptedClient {
            acks: Mutex::new(vec![Ok(ack(dec!(1.5))), Ok(ack(dec!(0)))]),
            ..Default::default()
        };
        let mut exec = LiveExecutor::new(client);
        let partial = exec.place_entry(&request()).await.unwrap();
        assert!(partial.is_partial());
        assert_eq!(partial.unfilled(), dec!(0.5));

        let err = exec.place_entry(&request()).await.unwrap_err();
        assert!(matches!(err, Error::Rejected { .. }));
    }

    #[tokio::test]
    async fn leverage_failure_aborts_before_ordering() {
        let client = ScriptedClient {
            fail_leverage: true,
            ..Default::default()
        };
        let mut exec = LiveExecutor::new(client);
        let err = exec.place_entry(&request()).await.unwrap_err();
        assert!(matches!(err, Error::ExecutionFailed { .. }));
        assert!(exec.client().orders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_is_reduce_only_on_the_opposite_side() {
        let client = ScriptedClient {
            acks: Mutex::new(vec![Ok(ack(dec!(2)))]),
            ..Default::default()
        };
        let mut exec = LiveExecutor::new(client);
        let pos = Position::open(NewPosition {
            id: 9,
            symbol: "ETHUSDT".into(),
            side: Side::Short,
            entry_price: dec!(100),
            entry_time: 0,
            quantity: dec!(2),
            leverage: 3,
            stop_loss: dec!(102),
            take_profit: dec!(94),
            stop_reason: StopReason::Initial,
            strategy_stop: None,
            fee_rate: dec!(0.001),
            entry_rationale: vec![],
        })
        .unwrap();
        exec.close(&pos, ExitReason::StopLoss, dec!(102)).await.unwrap();
        assert_eq!(exec.client().orders.lock().unwrap()[0], (true, dec!(2), true));
        assert!(matches!(
            exec.venue_position(&"ETHUSDT".into()).await,
            Err(Error::Venue(_))
        ));
    }
}
