// In crates/backtester/src/lib.rs

//! Deterministic replay of one bot configuration over historical bars.
//!
//! Entries are decided on the coarse (native) series and filled at the next
//! bar's open; open positions are managed bar by bar on the fine series with
//! the same trade manager and lifecycle rules the live orchestrator uses.

pub mod error;
pub mod logger;

pub use error::{Error, Result};
pub use logger::TradeLogger;

use analytics::{AnalyticsEngine, EquityPoint, PerformanceReport};
use core_types::{BotConfig, ExitReason, Kline, NewPosition, Position, Side, TradeRecord};
use risk::{check_reward_risk, fees, PlanRequest, RiskManager, TargetEngine};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strategies::Strategy;
use trade_manager::{
    cooldown_applies, invalidation_check, reentry_veto, touch_exit, MarketView, TradeManager, Verdict,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSettings {
    /// Coarse bars skipped before the first decision. Zero uses the strategy's own warmup.
    pub warmup_bars: usize,
    /// Adverse slippage fraction applied to market fills (entries, stops, strategy exits).
    pub slippage_percent: Decimal,
    /// Starting equity. Defaults to the bot's allocated capital.
    pub initial_equity: Option<Decimal>,
}

/// The data of one replay. Every series must be sorted by `open_time`.
#[derive(Debug, Clone, Copy)]
pub struct BacktestInputs<'a> {
    pub config: &'a BotConfig,
    pub coarse: &'a [Kline],
    pub fine: &'a [Kline],
    pub htf: Option<&'a [Kline]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub trades: Vec<TradeRecord>,
    /// One sample per coarse bar, at its close.
    pub equity_curve: Vec<EquityPoint>,
    pub report: PerformanceReport,
}

/// The main engine for running historical backtests.
pub struct Backtester {
    strategy: Box<dyn Strategy>,
    risk: Box<dyn RiskManager>,
    manager: TradeManager,
    settings: BacktestSettings,
}

impl Backtester {
    pub fn new(strategy: Box<dyn Strategy>, settings: BacktestSettings) -> Self {
        Self {
            strategy,
            risk: Box::new(TargetEngine::new()),
            manager: TradeManager::new(),
            settings,
        }
    }

    /// Builds the strategy named in `config` through the factory.
    pub fn from_config(config: &BotConfig, settings: BacktestSettings) -> Result<Self> {
        config.validate()?;
        let strategy = strategies::create_strategy(&config.strategy)?;
        Ok(Self::new(strategy, settings))
    }

    pub fn with_risk_manager(mut self, risk: Box<dyn RiskManager>) -> Self {
        self.risk = risk;
        self
    }

    pub fn warmup(&self) -> usize {
        let bars = if self.settings.warmup_bars > 0 {
            self.settings.warmup_bars
        } else {
            self.strategy.warmup_bars()
        };
        bars.max(1)
    }

    /// Replays `inputs` and aggregates the result. Identical inputs always give
    /// identical output.
    pub fn run(&self, inputs: &BacktestInputs<'_>) -> Result<BacktestResult> {
        let config = inputs.config;
        config.validate()?;
        check_order("coarse", inputs.coarse)?;
        check_order("fine", inputs.fine)?;
        if let Some(htf) = inputs.htf {
            check_order("htf", htf)?;
        }

        let warmup = self.warmup();
        if inputs.coarse.len() <= warmup {
            return Err(Error::NotEnoughData {
                have: inputs.coarse.len(),
                warmup,
            });
        }

        let initial_equity = self.settings.initial_equity.unwrap_or(config.allocated_capital);
        tracing::info!(
            symbol = %config.symbol,
            interval = %config.interval,
            strategy = self.strategy.name(),
            coarse = inputs.coarse.len(),
            fine = inputs.fine.len(),
            warmup,
            "Starting replay."
        );

        let mut replay = Replay {
            strategy: self.strategy.as_ref(),
            risk: self.risk.as_ref(),
            manager: &self.manager,
            slippage: self.settings.slippage_percent,
            config,
            coarse: inputs.coarse,
            fine: inputs.fine,
            htf: inputs.htf,
            logger: TradeLogger::new(initial_equity),
            position: None,
            last_trade: None,
            cooldown_until: None,
            next_id: 1,
            fine_cursor: 0,
        };
        for i in warmup..inputs.coarse.len() {
            replay.step(i);
        }
        replay.finish();

        let (trades, equity_curve) = replay.logger.into_parts();
        let report = AnalyticsEngine::new().calculate(initial_equity, &trades, &equity_curve);
        tracing::info!(trades = trades.len(), net_pnl = %report.net_pnl_absolute, "Replay finished.");
        Ok(BacktestResult {
            trades,
            equity_curve,
            report,
        })
    }
}

fn check_order(series: &'static str, klines: &[Kline]) -> Result<()> {
    if klines.windows(2).all(|w| w[0].open_time < w[1].open_time) {
        Ok(())
    } else {
        Err(Error::Unordered(series))
    }
}

/// The mutable state of one run.
struct Replay<'a> {
    strategy: &'a dyn Strategy,
    risk: &'a dyn RiskManager,
    manager: &'a TradeManager,
    slippage: Decimal,
    config: &'a BotConfig,
    coarse: &'a [Kline],
    fine: &'a [Kline],
    htf: Option<&'a [Kline]>,

    logger: TradeLogger,
    position: Option<Position>,
    last_trade: Option<TradeRecord>,
    cooldown_until: Option<i64>,
    next_id: u64,
    fine_cursor: usize,
}

impl<'a> Replay<'a> {
    fn step(&mut self, i: usize) {
        if self.position.is_none() {
            self.try_enter(i);
        }
        if self.position.is_some() {
            self.manage_bar(i);
        }
        let coarse = self.coarse;
        let bar = &coarse[i];
        self.logger.mark(bar.close_time, self.position.as_ref(), bar.close);
    }

    /// The native history a live bot would hold when the bar at `end` opens.
    fn window(&self, end: usize) -> &'a [Kline] {
        let start = end.saturating_sub(self.config.lifecycle.history_size);
        &self.coarse[start..end]
    }

    /// HTF bars fully closed at `time`.
    fn htf_until(&self, time: i64) -> Option<&'a [Kline]> {
        self.config.htf_interval()?;
        let htf = self.htf?;
        let visible = htf.partition_point(|k| k.close_time <= time);
        Some(&htf[..visible])
    }

    /// Adverse fill for a market order.
    fn slipped(&self, buying: bool, price: Decimal) -> Decimal {
        if self.slippage.is_zero() {
            return price;
        }
        let precision = &self.config.precision;
        if buying {
            precision.ceil_price(price * (Decimal::ONE + self.slippage))
        } else {
            precision.floor_price(price * (Decimal::ONE - self.slippage))
        }
    }

    // --- Entries ---

    fn try_enter(&mut self, i: usize) {
        let history = self.window(i);
        let Some(decided) = history.last() else {
            return;
        };
        let decision_time = decided.close_time;
        if self.cooldown_until.is_some_and(|until| decision_time < until) {
            return;
        }

        let signal = self.strategy.evaluate(history, self.config, self.htf_until(decision_time));
        let Some(side) = signal.side() else {
            return;
        };
        if let Some(reason) = reentry_veto(self.last_trade.as_ref(), side, history, self.strategy, self.config) {
            tracing::debug!(%side, %reason, decision_time, "Re-entry vetoed.");
            return;
        }

        let coarse = self.coarse;
        let bar = &coarse[i];
        let fill = self.slipped(side == Side::Long, bar.open);
        let request = PlanRequest {
            side,
            entry_price: fill,
            klines: history,
            quantity: None,
        };
        let plan = match self.risk.plan(&request, self.strategy, self.config) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::debug!(error = %e, decision_time, "Risk engine declined the entry.");
                return;
            }
        };
        if let Err(e) = check_reward_risk(&plan, self.config.features.min_risk_reward) {
            tracing::debug!(error = %e, decision_time, "Entry vetoed on reward/risk.");
            return;
        }

        let opened = Position::open(NewPosition {
            id: self.next_id,
            symbol: self.config.symbol.clone(),
            side,
            entry_price: fill,
            entry_time: bar.open_time,
            quantity: plan.quantity,
            leverage: self.config.leverage,
            stop_loss: plan.stop_loss,
            take_profit: plan.take_profit,
            stop_reason: plan.stop_reason,
            strategy_stop: plan.strategy_stop,
            fee_rate: self.config.fee_rate,
            entry_rationale: signal.rationale,
        });
        match opened {
            Ok(position) => {
                tracing::debug!(id = position.id, %side, entry = %fill, stop = %position.stop_loss, target = %position.take_profit, "Replay entry.");
                self.next_id += 1;
                self.position = Some(position);
            }
            Err(e) => tracing::warn!(error = %e, decision_time, "Plan produced an invalid position."),
        }
    }

    // --- Management ---

    fn manage_bar(&mut self, i: usize) {
        let coarse = self.coarse;
        let bar = &coarse[i];
        let during = self.window(i);

        let fine = self.fine;
        while self.fine_cursor < fine.len() && fine[self.fine_cursor].open_time < bar.open_time {
            self.fine_cursor += 1;
        }
        let begin = self.fine_cursor;
        while self.fine_cursor < fine.len() && fine[self.fine_cursor].close_time <= bar.close_time {
            self.fine_cursor += 1;
        }
        // A hole in the fine series falls back to the coarse bar itself.
        let covered = &fine[begin..self.fine_cursor];
        let management: &[Kline] = if covered.is_empty() {
            std::slice::from_ref(bar)
        } else {
            covered
        };
        for mbar in management {
            if self.manage_on(mbar, during) {
                return;
            }
        }
        if !covered.is_empty() && self.touch_uncovered(bar, covered) {
            return;
        }

        // The coarse bar has closed.
        let closed = self.window(i + 1);
        let htf = self.htf_until(bar.close_time);
        let Some(pos) = self.position.as_mut() else {
            return;
        };
        pos.bars_since_entry += 1;
        if let Verdict::Close { reason } =
            self.manager
                .manage(pos, MarketView::from_kline(bar), closed, self.strategy, self.config)
        {
            tracing::debug!(%reason, "Strategy exit at bar close.");
            self.close(ExitReason::StrategyExit, bar.close, bar.close_time);
            return;
        }
        if let Some(reason) = invalidation_check(pos, bar.close, closed, htf, self.strategy, self.config) {
            tracing::debug!(%reason, "Entry thesis invalidated.");
            self.close(ExitReason::Invalidation, bar.close, bar.close_time);
        }
    }

    /// Stop and target touches in the parts of `bar` its fine bars do not cover.
    /// Only coarse extremes the fine bars cannot account for are tested.
    fn touch_uncovered(&mut self, bar: &Kline, covered: &[Kline]) -> bool {
        let Some(pos) = self.position.as_ref() else {
            return true;
        };
        let low = match covered.iter().map(|k| k.low).min() {
            Some(seen) if bar.low < seen => bar.low,
            _ => bar.close,
        };
        let high = match covered.iter().map(|k| k.high).max() {
            Some(seen) if bar.high > seen => bar.high,
            _ => bar.close,
        };
        let Some((reason, level)) = touch_exit(pos, None, low, high) else {
            return false;
        };
        tracing::debug!(%reason, %level, "Exit level touched outside fine coverage.");
        self.close(reason, level, bar.close_time);
        true
    }

    /// Stop and target first, then the trade manager. Returns `true` once flat.
    fn manage_on(&mut self, mbar: &Kline, klines: &[Kline]) -> bool {
        let Some(pos) = self.position.as_mut() else {
            return true;
        };
        if let Some((reason, level)) = touch_exit(pos, Some(mbar.open), mbar.low, mbar.high) {
            self.close(reason, level, mbar.close_time);
            return true;
        }
        match self
            .manager
            .manage(pos, MarketView::from_kline(mbar), klines, self.strategy, self.config)
        {
            Verdict::Close { reason } => {
                tracing::debug!(%reason, "Strategy exit.");
                self.close(ExitReason::StrategyExit, mbar.close, mbar.close_time);
                true
            }
            Verdict::Tightened { from, to, reason } => {
                tracing::trace!(%from, %to, %reason, "Stop tightened.");
                false
            }
            Verdict::Hold => false,
        }
    }

    fn close(&mut self, reason: ExitReason, reference: Decimal, time: i64) {
        let Some(position) = self.position.take() else {
            return;
        };
        let market = matches!(
            reason,
            ExitReason::StopLoss | ExitReason::StrategyExit | ExitReason::Invalidation
        );
        let price = if market {
            // Closing a long sells.
            self.slipped(position.side == Side::Short, reference)
        } else {
            reference
        };
        let slippage = (price - reference).abs() * position.quantity;
        let fee = fees::fill_fee(price, position.quantity, position.fee_rate);
        let record = position.close(price, time, fee, slippage, reason);

        self.cooldown_until = if cooldown_applies(self.config, &record) {
            Some(time + self.config.cooldown_ms())
        } else {
            None
        };
        self.last_trade = Some(record.clone());
        self.logger.record_trade(record);
    }

    fn finish(&mut self) {
        if self.position.is_none() {
            return;
        }
        let coarse = self.coarse;
        if let Some(last) = coarse.last() {
            self.close(ExitReason::EndOfReplay, last.close, last.close_time);
            self.logger.restate_last();
        }
    }
}

/// Helper function to print the performance report in a readable format.
pub fn print_report(report: &PerformanceReport) {
    println!("\n--- Backtest Performance Report ---");
    println!("-----------------------------------");
    println!("Net P&L:               ${:.2} ({:.2}%)", report.net_pnl_absolute, report.net_pnl_percentage);
    println!("Max Drawdown:          ${:.2} ({:.2}%)", report.max_drawdown_absolute, report.max_drawdown_percentage);
    println!("Sharpe Ratio:          {:.3}", report.sharpe_ratio);
    println!("Profit Factor:         {:.2}", report.profit_factor);
    println!("Win Rate:              {:.2}%", report.win_rate);
    println!(
        "Trades:                {} ({} W / {} L / {} BE)",
        report.total_trades, report.wins, report.losses, report.breakevens
    );
    println!("-----------------------------------");
    println!("Sortino Ratio:         {:.3}", report.sortino_ratio);
    println!("Calmar Ratio:          {:.3}", report.calmar_ratio);
    println!("Avg. Trade Duration:   {:.1}s", report.avg_trade_duration_secs);
    println!("Expectancy:            ${:.2}", report.expectancy);
    println!("Max Drawdown Duration: {}s", report.drawdown_duration_secs);
    println!("-----------------------------------");
    if !report.exit_reasons.is_empty() {
        println!("Exits:");
        for (reason, count) in &report.exit_reasons {
            println!("  - {:<20} {}", reason, count);
        }
        println!("-----------------------------------");
    }
}
