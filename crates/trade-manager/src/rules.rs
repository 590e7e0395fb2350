// In crates/trade-manager/src/rules.rs

//! The four stop-tightening rules. Each proposes at most one candidate and
//! never mutates the position; arbitration happens in the manager.

use crate::types::{MarketView, StopCandidate};
use core_types::{BotConfig, Kline, Position, Side, StopReason};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use strategies::Strategy;

/// Rule 1: once the peak excursion covers the configured fee multiple, lock
/// the fee-adjusted breakeven price. Fires once per position.
pub fn breakeven(position: &Position, config: &BotConfig) -> Option<StopCandidate> {
    if position.breakeven_set {
        return None;
    }
    let peak = position.peak_excursion();
    let threshold = config.management.breakeven_fee_multiple * position.round_trip_fee_per_unit();
    if peak <= Decimal::ZERO || peak < threshold {
        return None;
    }
    Some(StopCandidate {
        price: position.breakeven_price(),
        reason: StopReason::Breakeven,
    })
}

/// Rule 2: for whole fee multiples `N` of peak profit, lock `N - 1` multiples.
///
/// `breakeven_locked` must reflect the state before the current evaluation, so
/// the first tier can never fire on the same evaluation as the breakeven lock.
pub fn profit_secure(
    position: &Position,
    config: &BotConfig,
    breakeven_locked: bool,
) -> Option<StopCandidate> {
    if !breakeven_locked {
        return None;
    }
    let fee = position.round_trip_fee_per_unit();
    if fee <= Decimal::ZERO {
        return None;
    }
    let tier = (position.peak_excursion() / fee).floor().to_u32()?;
    if tier < config.management.secure_start_multiple || tier <= position.secured_tier {
        return None;
    }
    let locked = Decimal::from(tier - 1) * fee;
    Some(StopCandidate {
        price: position.entry_price + position.side.sign() * locked,
        reason: StopReason::ProfitSecure(tier),
    })
}

/// Rule 3: the strategy's own trailing level, never allowed back past breakeven
/// once breakeven has been locked.
pub fn strategy_trail(
    position: &Position,
    klines: &[Kline],
    strategy: &dyn Strategy,
    config: &BotConfig,
) -> Option<StopCandidate> {
    let raw = strategy.native_trailing_stop(position, klines, config)?;
    let price = if position.breakeven_set {
        let floor = position.breakeven_price();
        match position.side {
            Side::Long => raw.max(floor),
            Side::Short => raw.min(floor),
        }
    } else {
        raw
    };
    Some(StopCandidate {
        price,
        reason: StopReason::StrategyTrail,
    })
}

/// Rule 4: once price has covered the trigger fraction of the stop-to-target
/// range, trail behind it by the trail fraction of that range.
pub fn aggressive_trail(
    position: &Position,
    view: &MarketView,
    config: &BotConfig,
) -> Option<StopCandidate> {
    if !config.features.universal_profit_trail {
        return None;
    }
    let range = (position.take_profit - position.stop_loss).abs();
    if range.is_zero() {
        return None;
    }
    let sign = position.side.sign();
    let progress = sign * (view.price - position.stop_loss) / range;
    if progress < config.management.aggressive_trigger_fraction {
        return None;
    }
    Some(StopCandidate {
        price: view.price - sign * config.management.aggressive_trail_fraction * range,
        reason: StopReason::AggressiveTrail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{config, long_position};
    use rust_decimal_macros::dec;

    #[test]
    fn breakeven_needs_three_fees_of_peak_profit() {
        let cfg = config();
        let mut pos = long_position();
        pos.observe(dec!(100.1), dec!(100.1), dec!(100.1));
        assert!(breakeven(&pos, &cfg).is_none());
        pos.observe(dec!(100.12), dec!(100.12), dec!(100.12));
        let c = breakeven(&pos, &cfg).unwrap();
        assert_eq!(c.price, dec!(100.04));
        pos.breakeven_set = true;
        assert!(breakeven(&pos, &cfg).is_none());
    }

    #[test]
    fn profit_tiers_ratchet_and_fire_once() {
        let cfg = config();
        let mut pos = long_position();
        pos.observe(dec!(100.2), dec!(100.2), dec!(100.2));
        assert!(profit_secure(&pos, &cfg, false).is_none());
        let c = profit_secure(&pos, &cfg, true).unwrap();
        assert_eq!(c.reason, StopReason::ProfitSecure(5));
        assert_eq!(c.price, dec!(100.16));
        pos.secured_tier = 5;
        assert!(profit_secure(&pos, &cfg, true).is_none());
        pos.observe(dec!(100.4), dec!(100.4), dec!(100.4));
        let c = profit_secure(&pos, &cfg, true).unwrap();
        assert_eq!(c.reason, StopReason::ProfitSecure(10));
        assert_eq!(c.price, dec!(100.36));
    }

    #[test]
    fn profit_ladder_keeps_climbing_with_large_runs() {
        let cfg = config();
        let mut pos = long_position();
        pos.secured_tier = 10;
        pos.observe(dec!(102), dec!(102), dec!(102));
        let c = profit_secure(&pos, &cfg, true).unwrap();
        assert_eq!(c.reason, StopReason::ProfitSecure(50));
        assert_eq!(c.price, dec!(101.96));
    }

    #[test]
    fn aggressive_trail_triggers_halfway_to_target() {
        let cfg = config();
        let pos = long_position();
        assert!(aggressive_trail(&pos, &MarketView::at(dec!(101.9)), &cfg).is_none());
        let c = aggressive_trail(&pos, &MarketView::at(dec!(102)), &cfg).unwrap();
        assert_eq!(c.price, dec!(100));
        let mut off = config();
        off.features.universal_profit_trail = false;
        assert!(aggressive_trail(&pos, &MarketView::at(dec!(105)), &off).is_none());
    }
}
