// In crates/analytics/src/engine.rs

use crate::types::{EquityPoint, PerformanceReport};
use core_types::TradeRecord;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;

const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;

/// A trade within this fraction of its entry notional counts as breakeven.
const BREAKEVEN_BAND: Decimal = dec!(0.0001);

/// The engine responsible for calculating performance metrics from trade data.
#[derive(Default)]
pub struct AnalyticsEngine;

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculates a full performance report from a set of trades and an equity curve.
    pub fn calculate(
        &self,
        initial_capital: Decimal,
        trades: &[TradeRecord],
        equity_curve: &[EquityPoint],
    ) -> PerformanceReport {
        let mut report = PerformanceReport::new();
        self.drawdown(&mut report, initial_capital, equity_curve);
        if trades.is_empty() {
            return report;
        }

        // --- Counts and money ---
        report.total_trades = trades.len() as u32;
        for trade in trades {
            let band = trade.entry_notional().abs() * BREAKEVEN_BAND;
            if trade.net_pnl > band {
                report.wins += 1;
            } else if trade.net_pnl < -band {
                report.losses += 1;
            } else {
                report.breakevens += 1;
            }
            if trade.net_pnl > Decimal::ZERO {
                report.gross_profit += trade.net_pnl;
            } else {
                report.gross_loss += -trade.net_pnl;
            }
            *report.exit_reasons.entry(trade.exit_reason.to_string()).or_insert(0) += 1;
        }

        report.net_pnl_absolute = report.gross_profit - report.gross_loss;
        if initial_capital > Decimal::ZERO {
            report.net_pnl_percentage = to_f64(report.net_pnl_absolute / initial_capital) * 100.0;
        }
        report.expectancy = report.net_pnl_absolute / Decimal::from(trades.len());
        report.win_rate = report.wins as f64 / report.total_trades as f64 * 100.0;
        report.profit_factor = if report.gross_loss > Decimal::ZERO {
            to_f64(report.gross_profit / report.gross_loss)
        } else if report.gross_profit > Decimal::ZERO {
            f64::INFINITY
        } else {
            0.0
        };

        let total_secs: i64 = trades.iter().map(|t| (t.exit_time - t.entry_time) / 1000).sum();
        report.avg_trade_duration_secs = total_secs as f64 / trades.len() as f64;

        // --- Risk-adjusted returns ---
        let years = span_secs(trades, equity_curve) / SECONDS_PER_YEAR;
        let returns: Vec<f64> = trades.iter().map(|t| to_f64(t.return_fraction())).collect();
        // Per-trade ratios are annualized by the number of trades per year.
        let scale = if years > 0.0 {
            (returns.len() as f64 / years).sqrt()
        } else {
            1.0
        };
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;

        if returns.len() > 1 {
            let variance =
                returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
            let std_dev = variance.sqrt();
            if std_dev > 0.0 {
                report.sharpe_ratio = mean / std_dev * scale;
            }
        }

        let downside =
            (returns.iter().map(|r| r.min(0.0).powi(2)).sum::<f64>() / returns.len() as f64).sqrt();
        report.sortino_ratio = if downside > 0.0 {
            mean / downside * scale
        } else if mean > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        if report.max_drawdown_percentage > 0.0 && years > 0.0 {
            let annualized_return = report.net_pnl_percentage / years;
            report.calmar_ratio = annualized_return / report.max_drawdown_percentage;
        }

        report
    }

    fn drawdown(&self, report: &mut PerformanceReport, initial_capital: Decimal, equity_curve: &[EquityPoint]) {
        let mut peak = initial_capital;
        let mut drawdown_start = None;
        let mut longest = chrono::Duration::zero();

        for point in equity_curve {
            if point.value >= peak {
                if let Some(start) = drawdown_start.take() {
                    longest = longest.max(point.timestamp - start);
                }
                peak = point.value;
                continue;
            }
            if drawdown_start.is_none() {
                drawdown_start = Some(point.timestamp);
            }
            let drawdown = peak - point.value;
            if drawdown > report.max_drawdown_absolute {
                report.max_drawdown_absolute = drawdown;
                if peak > Decimal::ZERO {
                    report.max_drawdown_percentage = to_f64(drawdown / peak) * 100.0;
                }
            }
        }
        // Still under water at the end of the curve.
        if let (Some(start), Some(last)) = (drawdown_start, equity_curve.last()) {
            longest = longest.max(last.timestamp - start);
        }
        report.drawdown_duration_secs = longest.num_seconds();
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Length of the replay window in seconds: the equity curve if it has one,
/// otherwise first entry to last exit.
fn span_secs(trades: &[TradeRecord], equity_curve: &[EquityPoint]) -> f64 {
    if let (Some(first), Some(last)) = (equity_curve.first(), equity_curve.last()) {
        let secs = (last.timestamp - first.timestamp).num_seconds();
        if secs > 0 {
            return secs as f64;
        }
    }
    let first = trades.iter().map(|t| t.entry_time).min().unwrap_or(0);
    let last = trades.iter().map(|t| t.exit_time).max().unwrap_or(0);
    ((last - first) / 1000).max(0) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{ExitReason, Side, StopReason};

    const DAY_MS: i64 = 86_400_000;

    fn trade(day: i64, net: Decimal, reason: ExitReason) -> TradeRecord {
        TradeRecord {
            position_id: day as u64,
            symbol: "BTCUSDT".into(),
            side: Side::Long,
            entry_time: day * DAY_MS,
            exit_time: day * DAY_MS + 3_600_000,
            entry_price: dec!(100),
            exit_price: dec!(100) + net / dec!(10),
            quantity: dec!(10),
            gross_pnl: net,
            fees: Decimal::ZERO,
            net_pnl: net,
            slippage: Decimal::ZERO,
            exit_reason: reason,
            stop_reason_at_exit: StopReason::Initial,
            entry_rationale: vec![],
        }
    }

    fn curve(values: &[Decimal]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| EquityPoint::at_millis(i as i64 * DAY_MS, *v))
            .collect()
    }

    #[test]
    fn empty_log_gives_an_empty_report() {
        let report = AnalyticsEngine::new().calculate(dec!(1000), &[], &[]);
        assert_eq!(report, PerformanceReport::default());
    }

    #[test]
    fn counts_money_and_ratios() {
        let trades = vec![
            trade(0, dec!(30), ExitReason::TakeProfit),
            trade(1, dec!(-10), ExitReason::StopLoss),
            trade(2, dec!(20), ExitReason::TakeProfit),
            // Within one basis point of a 1000 notional.
            trade(3, dec!(0.05), ExitReason::StrategyExit),
        ];
        let equity = curve(&[dec!(1000), dec!(1030), dec!(1020), dec!(1040), dec!(1040.05)]);
        let report = AnalyticsEngine::new().calculate(dec!(1000), &trades, &equity);

        assert_eq!(report.total_trades, 4);
        assert_eq!((report.wins, report.losses, report.breakevens), (2, 1, 1));
        assert_eq!(report.gross_profit, dec!(50.05));
        assert_eq!(report.gross_loss, dec!(10));
        assert_eq!(report.net_pnl_absolute, dec!(40.05));
        assert!((report.profit_factor - 5.005).abs() < 1e-9);
        assert!((report.win_rate - 50.0).abs() < 1e-9);
        assert_eq!(report.expectancy, dec!(10.0125));
        assert_eq!(report.max_drawdown_absolute, dec!(10));
        assert!((report.avg_trade_duration_secs - 3600.0).abs() < 1e-9);
        assert_eq!(report.exit_reasons.get(&ExitReason::TakeProfit.to_string()), Some(&2));
        assert!(report.sharpe_ratio > 0.0);
    }

    #[test]
    fn no_losses_means_infinite_profit_factor() {
        let trades = vec![trade(0, dec!(5), ExitReason::TakeProfit), trade(1, dec!(7), ExitReason::TakeProfit)];
        let report = AnalyticsEngine::new().calculate(dec!(1000), &trades, &[]);
        assert!(report.profit_factor.is_infinite());
        assert!(report.sortino_ratio.is_infinite());
    }

    #[test]
    fn drawdown_is_measured_from_the_running_peak() {
        let equity = curve(&[dec!(1000), dec!(1200), dec!(900), dec!(1100), dec!(1300)]);
        let report = AnalyticsEngine::new().calculate(dec!(1000), &[], &equity);
        assert_eq!(report.max_drawdown_absolute, dec!(300));
        assert!((report.max_drawdown_percentage - 25.0).abs() < 1e-9);
        // Under water from day 2 until the new high on day 4.
        assert_eq!(report.drawdown_duration_secs, 2 * 86_400);
    }

    #[test]
    fn report_serializes_to_json() {
        let trades = vec![trade(0, dec!(-5), ExitReason::StopLoss)];
        let report = AnalyticsEngine::new().calculate(dec!(1000), &trades, &[]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total_trades"], 1);
        assert_eq!(json["losses"], 1);
    }
}
