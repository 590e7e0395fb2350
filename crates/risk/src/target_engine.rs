// In crates/risk/src/target_engine.rs

use crate::fees::{profit_floor_distance, round_trip_fee_per_unit};
use crate::sizing::position_size;
use crate::types::{PlanRequest, TargetPlan};
use crate::{Error, Result, RiskManager};
use core_types::{BotConfig, Side, StopReason};
use rust_decimal::Decimal;
use strategies::Strategy;

/// Hierarchical stop/target derivation.
///
/// Precedence, in order:
/// 1. the strategy's native stop (ignored if on the wrong side of entry);
/// 2. widened to the minimum stop distance;
/// 3. overridden by the hard loss cap when the cap is closer to entry;
/// 4. target at the stop distance times the reward multiple;
/// 5. target pushed out to clear the fee floor;
/// 6. fallback to the minimum-distance levels if anything ended up on the wrong side.
#[derive(Debug, Default, Clone, Copy)]
pub struct TargetEngine;

impl TargetEngine {
    pub fn new() -> Self {
        Self
    }
}

fn on_correct_side(side: Side, entry: Decimal, stop: Decimal, target: Decimal) -> bool {
    match side {
        Side::Long => stop > Decimal::ZERO && stop < entry && target > entry,
        Side::Short => stop > entry && target > Decimal::ZERO && target < entry,
    }
}

impl RiskManager for TargetEngine {
    fn name(&self) -> &'static str {
        "TargetEngine"
    }

    fn plan(
        &self,
        request: &PlanRequest<'_>,
        strategy: &dyn Strategy,
        config: &BotConfig,
    ) -> Result<TargetPlan> {
        let side = request.side;
        let entry = request.entry_price;
        let sign = side.sign();
        let precision = &config.precision;

        if request.klines.is_empty() {
            return Err(Error::InsufficientData("no kline history".into()));
        }
        let quantity = match request.quantity {
            Some(q) if q > Decimal::ZERO => q,
            Some(q) => return Err(Error::InsufficientData(format!("non-positive size {}", q))),
            None => position_size(entry, config)?,
        };

        // --- 1. Strategy stop ---
        let strategy_stop = strategy
            .native_stop(side, entry, request.klines)
            .filter(|s| sign * (entry - *s) > Decimal::ZERO);

        // --- 2. Minimum distance ---
        let min_distance = entry * config.risk.min_stop_distance_pct;
        let min_stop = entry - sign * min_distance;
        let widened = match strategy_stop {
            Some(s) if sign * (entry - s) >= min_distance => s,
            _ => min_stop,
        };

        // --- 3. Hard loss cap ---
        let cap_distance = config.risk.max_loss_fraction * config.allocated_capital / quantity;
        if cap_distance < precision.tick_size {
            return Err(Error::HardCapUnachievable {
                distance: cap_distance,
                tick_size: precision.tick_size,
            });
        }
        let (raw_stop, stop_reason) = if cap_distance < sign * (entry - widened) {
            (entry - sign * cap_distance, StopReason::HardCap)
        } else {
            (widened, StopReason::Initial)
        };
        let stop_loss = precision.round_stop(side, raw_stop);

        // --- 4. Reward multiple ---
        let reward_multiple = config.effective_reward_multiple();
        let stop_distance = sign * (entry - stop_loss);
        let mut reward_distance = stop_distance * reward_multiple;

        // --- 5. Fee floor ---
        let round_trip_fee = round_trip_fee_per_unit(entry, config.fee_rate);
        let floor = profit_floor_distance(entry, config.fee_rate, config.risk.fee_floor_multiple);
        if reward_distance < floor {
            reward_distance = floor;
        }
        let take_profit = precision.round_target(side, entry + sign * reward_distance);

        // --- 6. Sanity pass ---
        if on_correct_side(side, entry, stop_loss, take_profit) {
            return Ok(TargetPlan {
                side,
                entry_price: entry,
                quantity,
                stop_loss,
                take_profit,
                stop_reason,
                strategy_stop,
                round_trip_fee,
            });
        }

        let fallback_distance = min_distance.min(cap_distance);
        let fallback_stop = precision.round_stop(side, entry - sign * fallback_distance);
        let fallback_reward = (sign * (entry - fallback_stop) * reward_multiple).max(floor);
        let fallback_target = precision.round_target(side, entry + sign * fallback_reward);
        if !on_correct_side(side, entry, fallback_stop, fallback_target) {
            return Err(Error::InvalidTargets(format!(
                "{} entry {}: stop {} target {}",
                side, entry, fallback_stop, fallback_target
            )));
        }
        Ok(TargetPlan {
            side,
            entry_price: entry,
            quantity,
            stop_loss: fallback_stop,
            take_profit: fallback_target,
            stop_reason: if fallback_distance < min_distance {
                StopReason::HardCap
            } else {
                StopReason::Initial
            },
            strategy_stop,
            round_trip_fee,
        })
    }
}

/// Vetoes a plan whose net-of-fee reward/risk falls below `minimum`.
pub fn check_reward_risk(plan: &TargetPlan, minimum: Option<Decimal>) -> Result<()> {
    let Some(minimum) = minimum else {
        return Ok(());
    };
    let ratio = plan.net_reward_risk();
    if ratio < minimum {
        return Err(Error::RiskRewardTooLow {
            ratio: ratio.round_dp(4),
            minimum,
        });
    }
    Ok(())
}
