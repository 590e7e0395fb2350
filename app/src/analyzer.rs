// In app/src/analyzer.rs

use crate::optimizer::OptimizationRun;
use analytics::PerformanceReport;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RankedReport {
    pub score: f64,
    pub run: OptimizationRun,
}

/// Scores the runs of an optimization job, drops those below `min_trades` and
/// sorts the rest best first.
pub fn rank_results(runs: Vec<OptimizationRun>, min_trades: u32) -> Vec<RankedReport> {
    let total_reports = runs.len();

    let mut ranked_reports: Vec<RankedReport> = runs
        .into_iter()
        .filter(|run| run.report.total_trades >= min_trades)
        .map(|run| RankedReport {
            score: calculate_score(&run.report),
            run,
        })
        .collect();

    tracing::info!(
        total_reports,
        passing_reports = ranked_reports.len(),
        "Finished scoring reports."
    );

    // Higher is better.
    ranked_reports.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked_reports
}

/// The multi-objective scoring function.
/// Higher scores are better.
fn calculate_score(report: &PerformanceReport) -> f64 {
    const PROFIT_FACTOR_WEIGHT: f64 = 40.0;
    const SHARPE_RATIO_WEIGHT: f64 = 30.0;
    const MAX_DRAWDOWN_WEIGHT: f64 = -35.0;
    const CALMAR_RATIO_WEIGHT: f64 = 15.0;

    // Capped so one outlier metric cannot dominate.
    let capped_profit_factor = report.profit_factor.min(5.0);
    let capped_sharpe = report.sharpe_ratio.min(5.0);
    let capped_calmar = report.calmar_ratio.min(10.0);
    let normalized_drawdown = report.max_drawdown_percentage / 100.0;

    let score = (capped_profit_factor * PROFIT_FACTOR_WEIGHT)
        + (capped_sharpe * SHARPE_RATIO_WEIGHT)
        + (normalized_drawdown * MAX_DRAWDOWN_WEIGHT)
        + (capped_calmar * CALMAR_RATIO_WEIGHT);

    if score.is_finite() { score } else { f64::MIN }
}
