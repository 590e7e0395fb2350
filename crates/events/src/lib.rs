// In crates/events/src/lib.rs

//! Outbound events and the fire-and-forget collaborators that consume them.

use chrono::{DateTime, Utc};
use core_types::{Position, Signal, StopReason, TradeRecord};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

// --- Event payloads ---

/// A log line forwarded from the tracing subscriber.
#[derive(Debug, Clone, Serialize)]
pub struct LogMessage {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateChange {
    pub bot_id: String,
    pub from: String,
    pub to: String,
    pub timestamp: DateTime<Utc>,
}

/// A non-binding signal computed on an in-progress kline.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewSignal {
    pub bot_id: String,
    pub kline_open_time: i64,
    pub signal: Signal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionOpened {
    pub bot_id: String,
    pub position: Position,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopAdjusted {
    pub bot_id: String,
    pub position_id: u64,
    pub from: Decimal,
    pub to: Decimal,
    pub reason: StopReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeClosed {
    pub bot_id: String,
    pub record: TradeRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

/// Operator-visible condition (execution failure, desync, partial close, ...).
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub bot_id: String,
    pub severity: Severity,
    pub message: String,
}

/// The top-level event enum.
/// `tag` and `content` are used by serde for clean JSON representation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    Log(LogMessage),
    StateChanged(StateChange),
    PreviewSignal(PreviewSignal),
    PositionOpened(PositionOpened),
    StopAdjusted(StopAdjusted),
    TradeClosed(TradeClosed),
    Alert(Alert),
}

// --- Collaborator contracts ---

/// Outbound notifications. Implementations must not block and must swallow
/// their own failures.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: EngineEvent);
}

/// Persistence of closed trades. Fire-and-forget like [`Notifier`].
pub trait TradeRecorder: Send + Sync {
    fn record_closed_trade(&self, record: &TradeRecord);
}

/// Fans events out over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<EngineEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn from_sender(tx: broadcast::Sender<EngineEvent>) -> Self {
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn sender(&self) -> broadcast::Sender<EngineEvent> {
        self.tx.clone()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, event: EngineEvent) {
        // An error only means nobody is listening right now.
        if self.tx.send(event).is_err() {
            tracing::trace!("No event subscribers; notification dropped.");
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: EngineEvent) {}
}

/// Keeps closed trades in memory, shared between clones.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTradeRecorder {
    trades: Arc<Mutex<Vec<TradeRecord>>>,
}

impl InMemoryTradeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trades(&self) -> Vec<TradeRecord> {
        match self.trades.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl TradeRecorder for InMemoryTradeRecorder {
    fn record_closed_trade(&self, record: &TradeRecord) {
        match self.trades.lock() {
            Ok(mut guard) => guard.push(record.clone()),
            Err(e) => tracing::error!(error = %e, position_id = record.position_id, "Failed to record closed trade."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{ExitReason, Side, Symbol};
    use rust_decimal_macros::dec;

    fn record() -> TradeRecord {
        TradeRecord {
            position_id: 3,
            symbol: Symbol("BTCUSDT".into()),
            side: Side::Long,
            entry_time: 0,
            exit_time: 60_000,
            entry_price: dec!(100),
            exit_price: dec!(101),
            quantity: dec!(1),
            gross_pnl: dec!(1),
            fees: dec!(0.08),
            net_pnl: dec!(0.92),
            slippage: dec!(0),
            exit_reason: ExitReason::TakeProfit,
            stop_reason_at_exit: StopReason::Breakeven,
            entry_rationale: vec![],
        }
    }

    #[test]
    fn events_serialize_with_type_and_payload() {
        let event = EngineEvent::Alert(Alert {
            bot_id: "BTCUSDT_1h_supertrend".into(),
            severity: Severity::Critical,
            message: "partial close".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Alert");
        assert_eq!(json["payload"]["severity"], "critical");
    }

    #[tokio::test]
    async fn broadcast_notifier_delivers_and_tolerates_no_listeners() {
        let notifier = BroadcastNotifier::new(8);
        notifier.notify(EngineEvent::TradeClosed(TradeClosed {
            bot_id: "a".into(),
            record: record(),
        }));

        let mut rx = notifier.subscribe();
        notifier.notify(EngineEvent::TradeClosed(TradeClosed {
            bot_id: "b".into(),
            record: record(),
        }));
        match rx.recv().await.unwrap() {
            EngineEvent::TradeClosed(t) => assert_eq!(t.bot_id, "b"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn in_memory_recorder_is_shared_between_clones() {
        let recorder = InMemoryTradeRecorder::new();
        let clone = recorder.clone();
        clone.record_closed_trade(&record());
        assert_eq!(recorder.trades().len(), 1);
    }
}
