// In crates/trade-manager/src/lifecycle.rs

//! Position lifecycle rules shared by the live orchestrator and the replay engine.

use core_types::{BotConfig, CooldownPolicy, ExitReason, Kline, Position, Side, TradeRecord};
use rust_decimal::Decimal;
use strategies::Strategy;

/// Stop or target touched by a bar (or tick) spanning `low..=high`.
///
/// The stop is checked first, so a bar that breaches both exits at the stop.
/// When `open` already gapped through a level, the fill is at the open.
pub fn touch_exit(
    position: &Position,
    open: Option<Decimal>,
    low: Decimal,
    high: Decimal,
) -> Option<(ExitReason, Decimal)> {
    let open_or = |level: Decimal, gapped: bool| match open {
        Some(o) if gapped => o,
        _ => level,
    };
    if position.stop_touched(low, high) {
        let gapped = open.is_some_and(|o| match position.side {
            Side::Long => o < position.stop_loss,
            Side::Short => o > position.stop_loss,
        });
        return Some((ExitReason::StopLoss, open_or(position.stop_loss, gapped)));
    }
    if position.target_touched(low, high) {
        let gapped = open.is_some_and(|o| match position.side {
            Side::Long => o > position.take_profit,
            Side::Short => o < position.take_profit,
        });
        return Some((ExitReason::TakeProfit, open_or(position.take_profit, gapped)));
    }
    None
}

/// Whether the invalidation re-check should run now.
///
/// It runs once per loss streak while the position is underwater past the
/// configured bar count. `loss_recheck_fired` resets when the position returns
/// to profit; with `recheck_rearm_bars` set it also re-arms after that many bars.
pub fn invalidation_due(position: &Position, price: Decimal, config: &BotConfig) -> bool {
    if !config.features.invalidation_recheck || !position.is_underwater(price) {
        return false;
    }
    if position.bars_since_entry <= config.lifecycle.recheck_after_bars {
        return false;
    }
    if !position.loss_recheck_fired {
        return true;
    }
    match (config.lifecycle.recheck_rearm_bars, position.last_recheck_bar) {
        (Some(rearm), Some(last)) => position.bars_since_entry.saturating_sub(last) >= rearm,
        _ => false,
    }
}

/// Runs the invalidation re-check if due. Returns a close reason when the
/// strategy's fresh bias no longer supports the held side.
pub fn invalidation_check(
    position: &mut Position,
    price: Decimal,
    klines: &[Kline],
    htf: Option<&[Kline]>,
    strategy: &dyn Strategy,
    config: &BotConfig,
) -> Option<String> {
    if !invalidation_due(position, price, config) {
        return None;
    }
    position.loss_recheck_fired = true;
    position.last_recheck_bar = Some(position.bars_since_entry);

    match strategy.bias(klines, config, htf) {
        Some(side) if side == position.side => None,
        Some(side) => Some(format!(
            "underwater after {} bars and strategy now favours {}",
            position.bars_since_entry, side
        )),
        None => Some(format!(
            "underwater after {} bars and strategy no longer supports {}",
            position.bars_since_entry, position.side
        )),
    }
}

/// Exhaustion veto before re-entering in the direction of a just-closed winner.
pub fn reentry_veto(
    last_trade: Option<&TradeRecord>,
    side: Side,
    klines: &[Kline],
    strategy: &dyn Strategy,
    config: &BotConfig,
) -> Option<String> {
    if !config.lifecycle.exhaustion_veto {
        return None;
    }
    let last = last_trade?;
    if !last.is_win() || last.side != side {
        return None;
    }
    strategy.exhaustion_veto(side, klines)
}

/// Whether a closed trade puts the bot into cooldown.
pub fn cooldown_applies(config: &BotConfig, record: &TradeRecord) -> bool {
    match config.lifecycle.cooldown_policy {
        CooldownPolicy::Never => false,
        CooldownPolicy::Always => true,
        CooldownPolicy::AfterLoss => !record.is_win(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{config, long_position, NoSignals, TrailAt};
    use core_types::ExitReason;
    use rust_decimal_macros::dec;

    #[test]
    fn stop_wins_a_same_bar_tie_regardless_of_open() {
        let pos = long_position();
        for open in [dec!(97), dec!(100), dec!(107)] {
            let (reason, _) = touch_exit(&pos, Some(open), dec!(97.5), dec!(106.5)).unwrap();
            assert_eq!(reason, ExitReason::StopLoss);
        }
    }

    #[test]
    fn gaps_fill_at_the_open() {
        let pos = long_position();
        assert_eq!(
            touch_exit(&pos, Some(dec!(97)), dec!(96), dec!(97.5)),
            Some((ExitReason::StopLoss, dec!(97)))
        );
        assert_eq!(
            touch_exit(&pos, Some(dec!(101)), dec!(97.9), dec!(101)),
            Some((ExitReason::StopLoss, dec!(98)))
        );
        assert_eq!(
            touch_exit(&pos, Some(dec!(107)), dec!(106.5), dec!(108)),
            Some((ExitReason::TakeProfit, dec!(107)))
        );
        assert_eq!(touch_exit(&pos, None, dec!(99), dec!(105)), None);
    }

    #[test]
    fn recheck_fires_once_per_loss_streak() {
        let cfg = config();
        let mut pos = long_position();
        pos.bars_since_entry = 6;
        let against = TrailAt(None, None);
        assert!(invalidation_check(&mut pos, dec!(99), &[], None, &against, &cfg).is_some());
        assert!(pos.loss_recheck_fired);
        assert!(!invalidation_due(&pos, dec!(99), &cfg));

        // Back in profit re-arms it.
        pos.observe(dec!(100.5), dec!(100.5), dec!(100.5));
        pos.bars_since_entry = 9;
        assert!(invalidation_due(&pos, dec!(99), &cfg));
    }

    #[test]
    fn recheck_waits_for_the_bar_threshold_and_respects_bias() {
        let cfg = config();
        let mut pos = long_position();
        pos.bars_since_entry = 5;
        assert!(!invalidation_due(&pos, dec!(99), &cfg));
        pos.bars_since_entry = 6;
        assert!(!invalidation_due(&pos, dec!(100.5), &cfg));
        // Bias still long: no close, but the check is spent.
        assert!(invalidation_check(&mut pos, dec!(99), &[], None, &NoSignals, &cfg).is_none());
        assert!(pos.loss_recheck_fired);
    }

    #[test]
    fn optional_rearm_after_elapsed_bars() {
        let mut cfg = config();
        cfg.lifecycle.recheck_rearm_bars = Some(3);
        let mut pos = long_position();
        pos.bars_since_entry = 6;
        invalidation_check(&mut pos, dec!(99), &[], None, &NoSignals, &cfg);
        pos.bars_since_entry = 8;
        assert!(!invalidation_due(&pos, dec!(99), &cfg));
        pos.bars_since_entry = 9;
        assert!(invalidation_due(&pos, dec!(99), &cfg));
    }

    #[test]
    fn cooldown_policy_follows_trade_outcome() {
        let mut cfg = config();
        let pos = long_position();
        let win = pos.close(dec!(103), 1, dec!(0), dec!(0), ExitReason::TakeProfit);
        let loss = pos.close(dec!(98), 1, dec!(0), dec!(0), ExitReason::StopLoss);
        assert!(!cooldown_applies(&cfg, &win));
        assert!(cooldown_applies(&cfg, &loss));
        cfg.lifecycle.cooldown_policy = CooldownPolicy::Always;
        assert!(cooldown_applies(&cfg, &win));
        cfg.lifecycle.cooldown_policy = CooldownPolicy::Never;
        assert!(!cooldown_applies(&cfg, &loss));
    }

    #[test]
    fn reentry_veto_only_after_a_same_side_winner() {
        let cfg = config();
        let pos = long_position();
        let win = pos.close(dec!(103), 1, dec!(0), dec!(0), ExitReason::TakeProfit);
        let loss = pos.close(dec!(98), 1, dec!(0), dec!(0), ExitReason::StopLoss);
        let veto = TrailAt(None, None);
        assert!(reentry_veto(Some(&win), Side::Long, &[], &veto, &cfg).is_some());
        assert!(reentry_veto(Some(&win), Side::Short, &[], &veto, &cfg).is_none());
        assert!(reentry_veto(Some(&loss), Side::Long, &[], &veto, &cfg).is_none());
        assert!(reentry_veto(None, Side::Long, &[], &veto, &cfg).is_none());
    }
}
