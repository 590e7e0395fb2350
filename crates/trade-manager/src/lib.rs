// In crates/trade-manager/src/lib.rs

pub mod lifecycle;
pub mod manager;
pub mod rules;
pub mod types;

pub use lifecycle::{cooldown_applies, invalidation_check, invalidation_due, reentry_veto, touch_exit};
pub use manager::TradeManager;
pub use types::{MarketView, StopCandidate, Verdict};

#[cfg(test)]
pub(crate) mod test_support {
    use core_types::{
        BotConfig, Interval, Kline, NewPosition, Position, PrecisionRules, Side, Signal, StopReason,
        StrategyConfig,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use strategies::Strategy;

    pub fn config() -> BotConfig {
        BotConfig {
            symbol: "BTCUSDT".into(),
            interval: Interval::H1,
            strategy: StrategyConfig::new("test", toml::Value::Table(Default::default())),
            allocated_capital: dec!(1000),
            leverage: 1,
            mode: Default::default(),
            features: Default::default(),
            fee_rate: dec!(0.0002),
            precision: PrecisionRules::default(),
            risk: Default::default(),
            management: Default::default(),
            lifecycle: Default::default(),
        }
    }

    fn open(side: Side, stop: Decimal, target: Decimal) -> Position {
        Position::open(NewPosition {
            id: 1,
            symbol: "BTCUSDT".into(),
            side,
            entry_price: dec!(100),
            entry_time: 0,
            quantity: dec!(10),
            leverage: 1,
            stop_loss: stop,
            take_profit: target,
            stop_reason: StopReason::HardCap,
            strategy_stop: None,
            fee_rate: dec!(0.0002),
            entry_rationale: vec![],
        })
        .unwrap()
    }

    pub fn long_position() -> Position {
        open(Side::Long, dec!(98), dec!(106))
    }

    pub fn short_position() -> Position {
        open(Side::Short, dec!(102), dec!(94))
    }

    /// Never trails or exits, keeps a long bias and never vetoes.
    pub struct NoSignals;

    impl Strategy for NoSignals {
        fn name(&self) -> &'static str {
            "NoSignals"
        }
        fn warmup_bars(&self) -> usize {
            0
        }
        fn evaluate(&self, _: &[Kline], _: &BotConfig, _: Option<&[Kline]>) -> Signal {
            Signal::hold()
        }
        fn bias(&self, _: &[Kline], _: &BotConfig, _: Option<&[Kline]>) -> Option<Side> {
            Some(Side::Long)
        }
        fn native_stop(&self, _: Side, _: Decimal, _: &[Kline]) -> Option<Decimal> {
            None
        }
        fn exhaustion_veto(&self, _: Side, _: &[Kline]) -> Option<String> {
            None
        }
    }

    /// Trails at a fixed level and optionally wants out. Has no bias and always
    /// vetoes re-entry.
    pub struct TrailAt(pub Option<Decimal>, pub Option<String>);

    impl Strategy for TrailAt {
        fn name(&self) -> &'static str {
            "TrailAt"
        }
        fn warmup_bars(&self) -> usize {
            0
        }
        fn evaluate(&self, _: &[Kline], _: &BotConfig, _: Option<&[Kline]>) -> Signal {
            Signal::hold()
        }
        fn bias(&self, _: &[Kline], _: &BotConfig, _: Option<&[Kline]>) -> Option<Side> {
            None
        }
        fn native_stop(&self, _: Side, _: Decimal, _: &[Kline]) -> Option<Decimal> {
            None
        }
        fn native_trailing_stop(&self, _: &Position, _: &[Kline], _: &BotConfig) -> Option<Decimal> {
            self.0
        }
        fn exit_signal(&self, _: &Position, _: &[Kline]) -> Option<String> {
            self.1.clone()
        }
        fn exhaustion_veto(&self, _: Side, _: &[Kline]) -> Option<String> {
            Some("exhausted".into())
        }
    }
}
