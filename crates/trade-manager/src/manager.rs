// In crates/trade-manager/src/manager.rs

use crate::rules;
use crate::types::{MarketView, StopCandidate, Verdict};
use core_types::{BotConfig, Kline, Position, Side, StopReason};
use strategies::Strategy;

/// Runs the stop-tightening hierarchy against an open position.
///
/// Live ticks and replay bars go through the same `manage` call, so both paths
/// make identical decisions on identical data.
#[derive(Debug, Default, Clone, Copy)]
pub struct TradeManager;

impl TradeManager {
    pub fn new() -> Self {
        Self
    }

    /// All candidates proposed by the four rules, before arbitration.
    pub fn candidates(
        &self,
        position: &Position,
        view: &MarketView,
        klines: &[Kline],
        strategy: &dyn Strategy,
        config: &BotConfig,
    ) -> Vec<StopCandidate> {
        let breakeven_locked = position.breakeven_set;
        [
            rules::breakeven(position, config),
            rules::profit_secure(position, config, breakeven_locked),
            rules::strategy_trail(position, klines, strategy, config),
            rules::aggressive_trail(position, view, config),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Picks the tightest candidate that is strictly tighter than the current
    /// stop and still valid at the current price.
    pub fn arbitrate(
        &self,
        position: &Position,
        view: &MarketView,
        candidates: &[StopCandidate],
    ) -> Option<StopCandidate> {
        candidates
            .iter()
            .filter(|c| position.is_tighter(c.price) && position.is_valid_stop(c.price, view.price))
            .copied()
            .reduce(|best, c| {
                let tighter = match position.side {
                    Side::Long => c.price > best.price,
                    Side::Short => c.price < best.price,
                };
                if tighter { c } else { best }
            })
    }

    /// Folds `view` into the position, checks the strategy's exit, then adopts
    /// the best stop improvement, if any.
    pub fn manage(
        &self,
        position: &mut Position,
        view: MarketView,
        klines: &[Kline],
        strategy: &dyn Strategy,
        config: &BotConfig,
    ) -> Verdict {
        position.observe(view.price, view.high, view.low);

        if let Some(reason) = strategy.exit_signal(position, klines) {
            return Verdict::Close { reason };
        }

        let candidates = self.candidates(position, &view, klines, strategy, config);

        // One-way flags follow their rule's threshold, even when another rule wins:
        // the adopted stop is then at least as tight as the level they represent.
        for candidate in &candidates {
            let reached = position.is_valid_stop(candidate.price, view.price)
                || !position.is_tighter(candidate.price);
            match candidate.reason {
                StopReason::Breakeven if reached => position.breakeven_set = true,
                StopReason::ProfitSecure(tier) if reached => {
                    position.secured_tier = position.secured_tier.max(tier)
                }
                _ => {}
            }
        }

        let Some(best) = self.arbitrate(position, &view, &candidates) else {
            return Verdict::Hold;
        };
        let from = position.stop_loss;
        if position.tighten_stop(best.price, best.reason, view.price) {
            Verdict::Tightened {
                from,
                to: best.price,
                reason: best.reason,
            }
        } else {
            Verdict::Hold
        }
    }
}
