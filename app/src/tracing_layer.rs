// In app/src/tracing_layer.rs

use chrono::Utc;
use events::{EngineEvent, LogMessage};
use std::fmt::Write;
use tokio::sync::broadcast;
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;

/// Forwards every log event into the engine's event channel as `EngineEvent::Log`.
pub struct EventBroadcastLayer {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBroadcastLayer {
    pub fn new(tx: broadcast::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl<S> Layer<S> for EventBroadcastLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = LogMessageVisitor::default();
        event.record(&mut visitor);
        let log_message = LogMessage {
            timestamp: Utc::now(),
            level: event.metadata().level().to_string(),
            message: visitor.finish(),
        };
        // No receivers is fine.
        let _ = self.tx.send(EngineEvent::Log(log_message));
    }
}

/// Renders the `message` field followed by the structured fields as `key=value`.
#[derive(Default)]
struct LogMessageVisitor {
    message: String,
    fields: String,
}

impl LogMessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl tracing::field::Visit for LogMessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::prelude::*;

    #[test]
    fn log_events_reach_the_channel_with_their_fields() {
        let (tx, mut rx) = broadcast::channel(8);
        let subscriber = tracing_subscriber::registry().with(EventBroadcastLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(bot_id = "BTCUSDT_1h_supertrend", "Entry failed.");
        });

        match rx.try_recv().unwrap() {
            EngineEvent::Log(log) => {
                assert_eq!(log.level, "WARN");
                assert_eq!(log.message, "Entry failed. bot_id=BTCUSDT_1h_supertrend");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
