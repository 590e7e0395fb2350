//! Property tests for position invariants.
//!
//! 1. Stops only ever tighten, whatever sequence of candidates is proposed.
//! 2. An adopted stop is always on the protective side of the price it was adopted at.

use core_types::{NewPosition, Position, Side, StopReason};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn open(side: Side) -> Position {
    let (stop, target) = match side {
        Side::Long => (dec!(95), dec!(115)),
        Side::Short => (dec!(105), dec!(85)),
    };
    Position::open(NewPosition {
        id: 7,
        symbol: "SOLUSDT".into(),
        side,
        entry_price: dec!(100),
        entry_time: 0,
        quantity: dec!(3),
        leverage: 1,
        stop_loss: stop,
        take_profit: target,
        stop_reason: StopReason::Initial,
        strategy_stop: None,
        fee_rate: dec!(0.0004),
        entry_rationale: vec![],
    })
    .unwrap()
}

fn cents(range: std::ops::Range<i64>) -> impl Strategy<Value = Decimal> {
    range.prop_map(|c| Decimal::new(c, 2))
}

fn arb_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Long), Just(Side::Short)]
}

proptest! {
    #[test]
    fn stop_never_loosens(
        side in arb_side(),
        steps in prop::collection::vec((cents(8_000..12_000), cents(8_000..12_000)), 1..60),
    ) {
        let mut pos = open(side);
        for (candidate, price) in steps {
            let before = pos.stop_loss;
            pos.tighten_stop(candidate, StopReason::StrategyTrail, price);
            match side {
                Side::Long => prop_assert!(pos.stop_loss >= before),
                Side::Short => prop_assert!(pos.stop_loss <= before),
            }
        }
    }

    #[test]
    fn adopted_stop_protects_the_current_price(
        side in arb_side(),
        candidate in cents(8_000..12_000),
        price in cents(8_000..12_000),
    ) {
        let mut pos = open(side);
        if pos.tighten_stop(candidate, StopReason::AggressiveTrail, price) {
            match side {
                Side::Long => {
                    prop_assert!(pos.stop_loss < price);
                    prop_assert!(pos.stop_loss < pos.take_profit);
                }
                Side::Short => {
                    prop_assert!(pos.stop_loss > price);
                    prop_assert!(pos.stop_loss > pos.take_profit);
                }
            }
        }
    }
}
