// In crates/engine/src/bot.rs

use crate::cache::MarketDataCache;
use crate::history::{KlineHistory, Upsert};
use crate::reconciler::{reconcile, Reconciliation};
use crate::state::{BotState, BotStatus};
use crate::{Error, Result};
use chrono::Utc;
use core_types::{BotConfig, ExitReason, Interval, Kline, NewPosition, Position, Side, Signal, TradeRecord};
use events::{
    Alert, EngineEvent, Notifier, PositionOpened, PreviewSignal, Severity, StateChange, StopAdjusted,
    TradeClosed, TradeRecorder,
};
use execution::{EntryRequest, Executor};
use risk::{check_reward_risk, fees, PlanRequest, RiskManager, TargetEngine};
use rust_decimal::Decimal;
use std::sync::Arc;
use strategies::Strategy;
use trade_manager::{
    cooldown_applies, invalidation_check, reentry_veto, touch_exit, MarketView, TradeManager, Verdict,
};

/// A native stream silent for this many intervals is reported as stale.
const STALE_AFTER_INTERVALS: i64 = 3;

/// Collaborators shared by every bot.
#[derive(Clone)]
pub struct BotServices {
    pub notifier: Arc<dyn Notifier>,
    pub recorder: Arc<dyn TradeRecorder>,
    pub cache: MarketDataCache,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tick {
    price: Decimal,
    time: i64,
}

/// The price range traded since the stop last moved.
///
/// A bar that began before `since` may only be touch-checked against this
/// range; its earlier extremes predate the current stop.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TouchWindow {
    since: i64,
    low: Decimal,
    high: Decimal,
}

impl TouchWindow {
    fn starting(since: i64, price: Decimal) -> Self {
        Self {
            since,
            low: price,
            high: price,
        }
    }

    fn include(&mut self, low: Decimal, high: Decimal) {
        self.low = self.low.min(low);
        self.high = self.high.max(high);
    }
}

enum CloseOutcome {
    Closed(TradeRecord),
    Failed,
    Partial,
    NothingOpen,
}

fn htf_window<'a>(config: &BotConfig, htf: &'a Option<KlineHistory>) -> Option<&'a [Kline]> {
    match (config.htf_interval(), htf) {
        (Some(_), Some(history)) => Some(history.klines()),
        _ => None,
    }
}

/// One instrument's position lifecycle.
///
/// A `Bot` is owned by exactly one task and every handler runs to completion,
/// so it is the single writer of its position. The `in_flight` guard keeps a
/// second entry or close from being issued while one is outstanding.
pub struct Bot {
    /// A unique identifier for this bot instance (e.g., "BTCUSDT_1h_supertrend").
    id: String,
    config: Arc<BotConfig>,
    strategy: Box<dyn Strategy>,
    risk: Box<dyn RiskManager>,
    manager: TradeManager,
    executor: Box<dyn Executor>,
    services: BotServices,

    state: BotState,
    position: Option<Position>,
    next_position_id: u64,
    last_trade: Option<TradeRecord>,
    cooldown_until: Option<i64>,
    /// A close the venue refused, retried with the same parameters on the next event.
    pending_exit: Option<(ExitReason, Decimal)>,
    in_flight: bool,
    touch_window: Option<TouchWindow>,

    // --- Market data ---
    native: KlineHistory,
    fine: KlineHistory,
    htf: Option<KlineHistory>,
    preview: Option<Kline>,
    preview_signal: Option<Signal>,
    last_evaluated_open: Option<i64>,
    last_tick: Option<Tick>,
    /// Wall-clock receipt time of the last final native bar.
    last_native_at: Option<i64>,
    stale_warned: bool,
}

impl Bot {
    pub fn new(
        config: BotConfig,
        strategy: Box<dyn Strategy>,
        executor: Box<dyn Executor>,
        services: BotServices,
    ) -> Self {
        let id = config.bot_id();
        let size = config.lifecycle.history_size;
        tracing::info!(bot_id = %id, strategy = strategy.name(), executor = executor.name(), "Creating new bot instance.");
        Self {
            id,
            strategy,
            risk: Box::new(TargetEngine::new()),
            manager: TradeManager::new(),
            executor,
            services,
            state: BotState::Starting,
            position: None,
            next_position_id: 1,
            last_trade: None,
            cooldown_until: None,
            pending_exit: None,
            in_flight: false,
            touch_window: None,
            native: KlineHistory::new(size),
            fine: KlineHistory::new(size),
            htf: config.htf_interval().map(|_| KlineHistory::new(size)),
            preview: None,
            preview_signal: None,
            last_evaluated_open: None,
            last_tick: None,
            last_native_at: None,
            stale_warned: false,
            config: Arc::new(config),
        }
    }

    /// Validates `config` and builds its strategy through the factory.
    pub fn from_config(config: BotConfig, executor: Box<dyn Executor>, services: BotServices) -> Result<Self> {
        config.validate()?;
        let strategy = strategies::create_strategy(&config.strategy)?;
        Ok(Self::new(config, strategy, executor, services))
    }

    // --- Accessors ---

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &BotState {
        &self.state
    }

    pub fn config(&self) -> &Arc<BotConfig> {
        &self.config
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn last_trade(&self) -> Option<&TradeRecord> {
        self.last_trade.as_ref()
    }

    /// The stream intervals this bot consumes: native, fine and (if enabled) HTF.
    pub fn intervals(&self) -> Vec<Interval> {
        let mut intervals = vec![self.config.interval];
        if self.config.lifecycle.fine_interval != self.config.interval {
            intervals.push(self.config.lifecycle.fine_interval);
        }
        if let Some(htf) = self.config.htf_interval() {
            if !intervals.contains(&htf) {
                intervals.push(htf);
            }
        }
        intervals
    }

    pub fn status(&self) -> BotStatus {
        BotStatus {
            bot_id: self.id.clone(),
            state: self.state.clone(),
            position: self.position.clone(),
            last_trade: self.last_trade.clone(),
            preview: self.preview_signal.clone(),
        }
    }

    /// The newer of the latest tick and the latest final native close.
    pub fn mark_price(&self) -> Option<(Decimal, i64)> {
        let bar = self.native.last().map(|k| (k.close, k.close_time));
        let tick = self.last_tick.map(|t| (t.price, t.time));
        match (bar, tick) {
            (Some(b), Some(t)) => Some(if t.1 >= b.1 { t } else { b }),
            (b, t) => b.or(t),
        }
    }

    /// Market time: the newest tick or native close, falling back to `wall`
    /// before any data has arrived. Cooldowns and exit times use this clock.
    fn market_time(&self, wall: i64) -> i64 {
        self.mark_price().map_or(wall, |(_, time)| time)
    }

    // --- Lifecycle commands ---

    /// Derives the initial state from the venue's position report.
    pub async fn start(&mut self, now: i64) {
        if self.state != BotState::Starting {
            return;
        }
        tracing::info!(bot_id = %self.id, "Starting bot.");
        self.rederive(now).await;
    }

    /// Stops acting on events. An open position keeps its stop and target,
    /// which are still enforced while paused.
    pub fn pause(&mut self) -> Result<()> {
        if !self.state.can_transition_to(&BotState::Paused) {
            return Err(Error::IllegalTransition {
                from: self.state.clone(),
                to: BotState::Paused,
            });
        }
        self.transition(BotState::Paused);
        if let Some(pos) = &self.position {
            tracing::info!(bot_id = %self.id, position_id = pos.id, stop = %pos.stop_loss, "Paused with an open position; stop and target stay enforced.");
        }
        Ok(())
    }

    /// Resumes a paused bot from current venue facts and the cooldown clock.
    pub async fn resume(&mut self, now: i64) -> Result<()> {
        if self.state != BotState::Paused {
            return Err(Error::IllegalTransition {
                from: self.state.clone(),
                to: BotState::Monitoring,
            });
        }
        self.rederive(now).await;
        Ok(())
    }

    /// Operator intervention: forgets any outstanding retry and re-derives the state.
    pub async fn reset(&mut self, now: i64) -> Result<()> {
        if self.state.is_terminal() {
            return Err(Error::IllegalTransition {
                from: self.state.clone(),
                to: BotState::Monitoring,
            });
        }
        tracing::warn!(bot_id = %self.id, state = %self.state, "Operator reset requested.");
        self.pending_exit = None;
        self.in_flight = false;
        self.rederive(now).await;
        Ok(())
    }

    /// Closes any open position and stops the bot for good.
    pub async fn stop(&mut self, now: i64) {
        if self.state.is_terminal() {
            return;
        }
        let now = self.market_time(now);
        if let Some(pos) = &self.position {
            let hint = self.mark_price().map(|(p, _)| p).unwrap_or(pos.entry_price);
            match self.close_position(ExitReason::ManualStop, hint, now).await {
                CloseOutcome::Closed(_) | CloseOutcome::NothingOpen => {}
                CloseOutcome::Failed => {
                    let reason = "stop requested but the closing order failed".to_string();
                    self.alert(Severity::Critical, reason.clone());
                    self.transition(BotState::Error { reason });
                    return;
                }
                CloseOutcome::Partial => return,
            }
        }
        self.transition(BotState::Stopped);
        tracing::info!(bot_id = %self.id, "Bot stopped.");
    }

    /// Swaps in a new configuration snapshot and rebuilds the strategy.
    pub fn update_config(&mut self, config: BotConfig) -> Result<()> {
        if config.symbol != self.config.symbol || config.interval != self.config.interval {
            return Err(Error::ConfigMismatch {
                expected: format!("{} {}", self.config.symbol, self.config.interval),
                got: format!("{} {}", config.symbol, config.interval),
            });
        }
        config.validate()?;
        let strategy = strategies::create_strategy(&config.strategy)?;

        let size = config.lifecycle.history_size;
        if size != self.config.lifecycle.history_size {
            let mut native = KlineHistory::new(size);
            native.replace_all(self.native.klines().to_vec());
            self.native = native;
            let mut fine = KlineHistory::new(size);
            fine.replace_all(self.fine.klines().to_vec());
            self.fine = fine;
        }
        if config.htf_interval() != self.config.htf_interval() {
            self.htf = config.htf_interval().map(|_| KlineHistory::new(size));
        }

        tracing::info!(bot_id = %self.id, strategy = strategy.name(), "Configuration updated.");
        self.strategy = strategy;
        self.config = Arc::new(config);
        Ok(())
    }

    // --- Market data handlers ---

    pub async fn on_kline(&mut self, interval: Interval, kline: Kline) {
        if self.state.is_terminal() {
            return;
        }
        if interval == self.config.interval {
            self.on_native_kline(kline).await;
        } else if interval == self.config.lifecycle.fine_interval {
            self.on_fine_kline(kline).await;
        } else if Some(interval) == self.config.htf_interval() {
            if let (true, Some(htf)) = (kline.is_final, self.htf.as_mut()) {
                htf.upsert(kline);
            }
        } else {
            tracing::debug!(bot_id = %self.id, %interval, "Ignoring kline for an unrelated interval.");
        }
    }

    /// The gateway re-delivered the full window for `interval`.
    pub fn on_reconnect(&mut self, interval: Interval, history: Vec<Kline>) {
        tracing::info!(bot_id = %self.id, %interval, bars = history.len(), "Re-synchronizing history after reconnect.");
        if interval == self.config.interval {
            self.native.replace_all(history);
            self.preview = None;
            self.preview_signal = None;
            // Re-delivered bars are history, not fresh closes.
            if let Some(last) = self.native.last() {
                self.last_evaluated_open = Some(last.open_time);
            }
        } else if interval == self.config.lifecycle.fine_interval {
            self.fine.replace_all(history);
        } else if Some(interval) == self.config.htf_interval() {
            if let Some(htf) = self.htf.as_mut() {
                htf.replace_all(history);
            }
        }
    }

    pub async fn on_tick(&mut self, price: Decimal, time: i64) {
        if self.state.is_terminal() {
            return;
        }
        if self.last_tick.is_some_and(|t| t.time > time) {
            tracing::debug!(bot_id = %self.id, %price, time, "Dropping out-of-order tick.");
            return;
        }
        self.last_tick = Some(Tick { price, time });
        if let Some(window) = self.touch_window.as_mut() {
            window.include(price, price);
        }
        if self.state == BotState::Paused {
            self.protect_while_paused(price, price, time).await;
            return;
        }
        if !self.state.is_active() || self.in_flight {
            return;
        }

        if let BotState::Cooldown { until } = self.state {
            if time >= until {
                self.transition(BotState::Monitoring);
            }
            return;
        }
        if self.state != BotState::PositionOpen {
            return;
        }
        if self.retry_pending_exit(time).await || self.check_touch(price, price, time).await {
            return;
        }
        self.manage(MarketView::at(price), time).await;
    }

    /// Periodic housekeeping: cooldown expiry, stale data, venue reconciliation.
    ///
    /// `now` is wall-clock time. It is only compared with the wall-clock receipt
    /// of the last native bar; cooldowns run on market time.
    pub async fn on_watchdog(&mut self, now: i64) {
        if !self.state.is_active() || self.in_flight {
            return;
        }
        let market_now = self.market_time(now);

        if let BotState::Cooldown { until } = self.state {
            if market_now >= until {
                tracing::info!(bot_id = %self.id, "Cooldown expired.");
                self.transition(BotState::Monitoring);
            }
        }

        if let Some(seen) = self.last_native_at {
            let silent_for = now - seen;
            if silent_for > STALE_AFTER_INTERVALS * self.config.interval.duration_ms() && !self.stale_warned {
                self.stale_warned = true;
                tracing::warn!(bot_id = %self.id, silent_for_ms = silent_for, "Native kline stream looks stale.");
                self.alert(Severity::Warning, format!("no {} kline for {} ms", self.config.interval, silent_for));
            }
        }

        self.reconcile_with_venue(market_now).await;
    }

    async fn on_native_kline(&mut self, kline: Kline) {
        if !kline.is_final {
            self.update_preview(kline);
            return;
        }
        let open_time = kline.open_time;
        let close_time = kline.close_time;
        let view = MarketView::from_kline(&kline);
        match self.native.upsert(kline) {
            Upsert::Stale => {
                tracing::debug!(bot_id = %self.id, open_time, "Dropping stale kline.");
                return;
            }
            Upsert::Replaced => tracing::debug!(bot_id = %self.id, open_time, "Replaced duplicate kline."),
            Upsert::Appended => {}
        }
        if self.preview.as_ref().is_some_and(|p| p.open_time <= open_time) {
            self.preview = None;
            self.preview_signal = None;
        }
        self.stale_warned = false;
        self.last_native_at = Some(Utc::now().timestamp_millis());

        // Each bar is acted on once, however often it is delivered.
        if self.last_evaluated_open.is_some_and(|t| t >= open_time) {
            return;
        }
        self.last_evaluated_open = Some(open_time);

        if self.state == BotState::Paused {
            if let Some(pos) = self.position.as_mut() {
                pos.bars_since_entry += 1;
            }
            let (low, high) = self.touch_range(open_time, &view);
            self.protect_while_paused(low, high, close_time).await;
            return;
        }

        if !self.state.is_active() || self.in_flight {
            return;
        }
        if self.retry_pending_exit(close_time).await {
            return;
        }

        match self.state.clone() {
            BotState::Cooldown { until } => {
                if close_time >= until {
                    tracing::info!(bot_id = %self.id, "Cooldown expired.");
                    self.transition(BotState::Monitoring);
                    self.try_enter(close_time).await;
                }
            }
            BotState::Monitoring => self.try_enter(close_time).await,
            BotState::PositionOpen => self.manage_on_native_bar(close_time).await,
            _ => {}
        }
    }

    async fn on_fine_kline(&mut self, kline: Kline) {
        if !kline.is_final {
            return;
        }
        let view = MarketView::from_kline(&kline);
        let open_time = kline.open_time;
        let time = kline.close_time;
        if self.fine.upsert(kline) == Upsert::Stale {
            return;
        }
        if self.position.is_none() || self.in_flight {
            return;
        }
        let (low, high) = self.touch_range(open_time, &view);
        match self.state {
            BotState::Paused => self.protect_while_paused(low, high, time).await,
            BotState::PositionOpen => {
                if self.retry_pending_exit(time).await || self.check_touch(low, high, time).await {
                    return;
                }
                self.manage(view, time).await;
            }
            _ => {}
        }
    }

    fn update_preview(&mut self, kline: Kline) {
        if self.native.last().is_some_and(|last| kline.open_time <= last.open_time) {
            return;
        }
        let mut window = self.native.klines().to_vec();
        window.push(kline.clone());
        if window.len() < self.strategy.warmup_bars() {
            self.preview = Some(kline);
            return;
        }
        let signal = self.strategy.evaluate(&window, &self.config, htf_window(&self.config, &self.htf));
        tracing::debug!(bot_id = %self.id, open_time = kline.open_time, ?signal, "Preview signal updated.");
        self.services.notifier.notify(EngineEvent::PreviewSignal(PreviewSignal {
            bot_id: self.id.clone(),
            kline_open_time: kline.open_time,
            signal: signal.clone(),
        }));
        self.preview = Some(kline);
        self.preview_signal = Some(signal);
    }

    // --- Entry pipeline ---

    async fn try_enter(&mut self, time: i64) {
        if self.in_flight {
            return;
        }
        let klines = self.native.klines();
        if klines.len() < self.strategy.warmup_bars() {
            tracing::debug!(bot_id = %self.id, have = klines.len(), need = self.strategy.warmup_bars(), "Warming up.");
            return;
        }

        // --- 1. Strategy evaluation ---
        let signal = self.strategy.evaluate(klines, &self.config, htf_window(&self.config, &self.htf));
        let Some(side) = signal.side() else {
            tracing::debug!(bot_id = %self.id, rationale = ?signal.rationale, "Holding.");
            return;
        };
        tracing::info!(bot_id = %self.id, %side, rationale = ?signal.rationale, "Strategy generated a signal.");

        // --- 2. Re-entry exhaustion veto ---
        if let Some(reason) =
            reentry_veto(self.last_trade.as_ref(), side, klines, self.strategy.as_ref(), &self.config)
        {
            tracing::info!(bot_id = %self.id, %side, %reason, "Re-entry vetoed.");
            return;
        }

        if self.transition(BotState::ExecutingEntry) {
            self.execute_entry(side, signal, time).await;
        }
    }

    async fn execute_entry(&mut self, side: Side, signal: Signal, time: i64) {
        // --- 3. Price acquisition ---
        let Some(price) = self.acquire_price().await else {
            tracing::warn!(bot_id = %self.id, "No price available; holding until the next event.");
            self.settle_flat(time);
            return;
        };

        // --- 4. Sizing and targets ---
        let request = PlanRequest {
            side,
            entry_price: price,
            klines: self.native.klines(),
            quantity: None,
        };
        let plan = match self.risk.plan(&request, self.strategy.as_ref(), &self.config) {
            Ok(plan) => plan,
            Err(e) if e.is_recoverable() => {
                tracing::warn!(bot_id = %self.id, error = %e, "Risk engine declined the entry.");
                self.settle_flat(time);
                return;
            }
            Err(e) => {
                self.fail(format!("target computation failed: {}", e));
                return;
            }
        };

        // --- 5. Reward/risk veto ---
        if let Err(e) = check_reward_risk(&plan, self.config.features.min_risk_reward) {
            tracing::info!(bot_id = %self.id, error = %e, "Entry vetoed on reward/risk.");
            self.settle_flat(time);
            return;
        }

        // --- 6. Place the order ---
        let order = EntryRequest {
            symbol: self.config.symbol.clone(),
            side,
            quantity: plan.quantity,
            leverage: self.config.leverage,
            price_hint: price,
            fee_rate: self.config.fee_rate,
            time,
        };
        tracing::info!(bot_id = %self.id, ?plan, "Signal approved by risk engine.");
        self.in_flight = true;
        let result = self.executor.place_entry(&order).await;
        self.in_flight = false;
        let fill = match result {
            Ok(fill) => fill,
            Err(e) => {
                tracing::error!(bot_id = %self.id, error = %e, "Entry execution failed; no position created.");
                self.alert(Severity::Warning, format!("entry failed: {}", e));
                self.enter_cooldown(time);
                return;
            }
        };
        if fill.is_partial() {
            tracing::warn!(bot_id = %self.id, requested = %fill.requested_quantity, filled = %fill.quantity, "Entry partially filled; managing the filled size.");
        }

        // --- 7. Targets at the real fill ---
        let request = PlanRequest {
            side,
            entry_price: fill.price,
            klines: self.native.klines(),
            quantity: Some(fill.quantity),
        };
        let plan = match self.risk.plan(&request, self.strategy.as_ref(), &self.config) {
            Ok(plan) => plan,
            Err(e) => {
                self.fail(format!("entry filled at {} but targets could not be derived: {}", fill.price, e));
                return;
            }
        };
        let opened = Position::open(NewPosition {
            id: self.next_position_id,
            symbol: self.config.symbol.clone(),
            side,
            entry_price: fill.price,
            entry_time: time,
            quantity: fill.quantity,
            leverage: self.config.leverage,
            stop_loss: plan.stop_loss,
            take_profit: plan.take_profit,
            stop_reason: plan.stop_reason,
            strategy_stop: plan.strategy_stop,
            fee_rate: self.config.fee_rate,
            entry_rationale: signal.rationale,
        });
        let mut position = match opened {
            Ok(position) => position,
            Err(e) => {
                self.fail(format!("entry filled at {} but the position is invalid: {}", fill.price, e));
                return;
            }
        };
        position.entry_fee = fill.fee;
        self.next_position_id += 1;

        tracing::info!(
            bot_id = %self.id,
            position_id = position.id,
            %side,
            entry = %position.entry_price,
            quantity = %position.quantity,
            stop = %position.stop_loss,
            target = %position.take_profit,
            stop_reason = %position.stop_reason,
            "Position opened."
        );
        self.services.notifier.notify(EngineEvent::PositionOpened(PositionOpened {
            bot_id: self.id.clone(),
            position: position.clone(),
        }));
        self.touch_window = Some(TouchWindow::starting(time, position.entry_price));
        self.position = Some(position);
        if self.state != BotState::Paused {
            self.transition(BotState::PositionOpen);
        }
    }

    async fn acquire_price(&self) -> Option<Decimal> {
        if let Some((price, _)) = self.mark_price() {
            return Some(price);
        }
        self.services.cache.last_price(&self.config.symbol).await
    }

    // --- Position management ---

    async fn manage_on_native_bar(&mut self, time: i64) {
        let Some(bar) = self.native.last().cloned() else {
            return;
        };
        if let Some(pos) = self.position.as_mut() {
            pos.bars_since_entry += 1;
        }
        let view = MarketView::from_kline(&bar);
        let (low, high) = self.touch_range(bar.open_time, &view);
        if self.check_touch(low, high, time).await {
            return;
        }
        if !self.manage(view, time).await {
            return;
        }

        let Some(pos) = self.position.as_mut() else {
            return;
        };
        let htf = htf_window(&self.config, &self.htf);
        if let Some(reason) =
            invalidation_check(pos, bar.close, self.native.klines(), htf, self.strategy.as_ref(), &self.config)
        {
            tracing::info!(bot_id = %self.id, position_id = pos.id, %reason, "Entry thesis invalidated.");
            self.exit(ExitReason::Invalidation, bar.close, time).await;
        }
    }

    /// Runs the trade manager. Returns `false` once the position is gone.
    async fn manage(&mut self, view: MarketView, time: i64) -> bool {
        let Some(pos) = self.position.as_mut() else {
            return false;
        };
        let verdict = self
            .manager
            .manage(pos, view, self.native.klines(), self.strategy.as_ref(), &self.config);
        let position_id = pos.id;
        match verdict {
            Verdict::Hold => true,
            Verdict::Tightened { from, to, reason } => {
                tracing::info!(bot_id = %self.id, position_id, %from, %to, %reason, "Stop tightened.");
                self.touch_window = Some(TouchWindow::starting(time, view.price));
                self.services.notifier.notify(EngineEvent::StopAdjusted(StopAdjusted {
                    bot_id: self.id.clone(),
                    position_id,
                    from,
                    to,
                    reason,
                }));
                true
            }
            Verdict::Close { reason } => {
                tracing::info!(bot_id = %self.id, position_id, %reason, "Strategy exit signal.");
                self.exit(ExitReason::StrategyExit, view.price, time).await;
                false
            }
        }
    }

    /// The part of `bar` that traded under the current stop. A bar that began
    /// before the stop last moved contributes only its close.
    fn touch_range(&mut self, open_time: i64, bar: &MarketView) -> (Decimal, Decimal) {
        match self.touch_window.as_mut() {
            Some(window) if open_time < window.since => {
                window.include(bar.price, bar.price);
                (window.low, window.high)
            }
            Some(window) => {
                window.include(bar.low, bar.high);
                (bar.low, bar.high)
            }
            None => (bar.low, bar.high),
        }
    }

    /// Closes on a stop or target touch within `low..=high`.
    async fn check_touch(&mut self, low: Decimal, high: Decimal, time: i64) -> bool {
        let Some(pos) = self.position.as_ref() else {
            return false;
        };
        let Some((reason, level)) = touch_exit(pos, None, low, high) else {
            return false;
        };
        tracing::info!(bot_id = %self.id, position_id = pos.id, %reason, %level, stop_reason = %pos.stop_reason, "Exit level touched.");
        self.exit(reason, level, time).await;
        true
    }

    /// While paused only the protective levels act: a stop or target touch
    /// still closes the position, and the bot stays paused.
    async fn protect_while_paused(&mut self, low: Decimal, high: Decimal, time: i64) {
        if self.position.is_none() || self.in_flight {
            return;
        }
        if !self.retry_pending_exit(time).await {
            self.check_touch(low, high, time).await;
        }
    }

    async fn retry_pending_exit(&mut self, time: i64) -> bool {
        let Some((reason, hint)) = self.pending_exit else {
            return false;
        };
        tracing::info!(bot_id = %self.id, %reason, %hint, "Retrying close.");
        self.exit(reason, hint, time).await;
        true
    }

    async fn exit(&mut self, reason: ExitReason, hint: Decimal, time: i64) {
        match self.close_position(reason, hint, time).await {
            CloseOutcome::Closed(record) => self.after_close(&record, time),
            CloseOutcome::Failed => self.pending_exit = Some((reason, hint)),
            CloseOutcome::Partial | CloseOutcome::NothingOpen => {}
        }
    }

    async fn close_position(&mut self, reason: ExitReason, hint: Decimal, time: i64) -> CloseOutcome {
        let Some(position) = self.position.clone() else {
            return CloseOutcome::NothingOpen;
        };
        if self.in_flight {
            return CloseOutcome::Failed;
        }
        self.in_flight = true;
        let result = self.executor.close(&position, reason, hint).await;
        self.in_flight = false;

        let fill = match result {
            Ok(fill) => fill,
            Err(e) => {
                tracing::error!(bot_id = %self.id, position_id = position.id, error = %e, "Close failed; retrying on the next event.");
                self.alert(Severity::Warning, format!("close failed: {}", e));
                return CloseOutcome::Failed;
            }
        };
        self.pending_exit = None;

        if fill.is_partial() {
            let mut filled_part = position.clone();
            filled_part.reduce_quantity(fill.unfilled());
            let record = filled_part.close(fill.price, time, fill.fee, fill.slippage, reason);
            self.finish_trade(&record);
            if let Some(pos) = self.position.as_mut() {
                pos.reduce_quantity(fill.quantity);
            }
            self.fail(format!(
                "partial close: {} of {} filled, {} left open for manual reconciliation",
                fill.quantity,
                fill.requested_quantity,
                fill.unfilled()
            ));
            return CloseOutcome::Partial;
        }

        let record = position.close(fill.price, time, fill.fee, fill.slippage, reason);
        self.position = None;
        self.touch_window = None;
        self.finish_trade(&record);
        CloseOutcome::Closed(record)
    }

    /// Books a closed trade: recorder, notification, re-entry memory.
    fn finish_trade(&mut self, record: &TradeRecord) {
        tracing::info!(
            bot_id = %self.id,
            position_id = record.position_id,
            exit_reason = %record.exit_reason,
            exit = %record.exit_price,
            net_pnl = %record.net_pnl,
            "Trade closed."
        );
        self.services.recorder.record_closed_trade(record);
        self.services.notifier.notify(EngineEvent::TradeClosed(TradeClosed {
            bot_id: self.id.clone(),
            record: record.clone(),
        }));
        self.last_trade = Some(record.clone());
    }

    fn after_close(&mut self, record: &TradeRecord, time: i64) {
        self.arm_cooldown(cooldown_applies(&self.config, record), time);
        self.settle_flat(time);
    }

    fn enter_cooldown(&mut self, time: i64) {
        self.arm_cooldown(true, time);
        self.settle_flat(time);
    }

    fn arm_cooldown(&mut self, applies: bool, time: i64) {
        let length = self.config.cooldown_ms();
        self.cooldown_until = (applies && length > 0).then(|| time + length);
    }

    /// Flat again. A paused bot stays paused; resuming re-derives from the cooldown clock.
    fn settle_flat(&mut self, now: i64) {
        if self.state != BotState::Paused {
            self.derive_flat(now);
        }
    }

    fn derive_flat(&mut self, now: i64) {
        match self.cooldown_until {
            Some(until) if until > now => {
                self.transition(BotState::Cooldown { until });
            }
            _ => {
                self.cooldown_until = None;
                self.transition(BotState::Monitoring);
            }
        }
    }

    // --- Venue reconciliation ---

    async fn reconcile_with_venue(&mut self, now: i64) {
        let venue = match self.executor.venue_position(&self.config.symbol).await {
            Ok(venue) => venue,
            Err(e) => {
                tracing::warn!(bot_id = %self.id, error = %e, "Could not fetch venue position; will retry.");
                return;
            }
        };
        match reconcile(self.position.as_ref(), venue.as_ref()) {
            Reconciliation::InSync | Reconciliation::Flat => {}
            Reconciliation::ClosedOnVenue => {
                if let Some(record) = self.finalize_locally(ExitReason::VenueClosed, now) {
                    self.after_close(&record, now);
                }
            }
            desync => self.force_close_desync(desync, now),
        }
    }

    /// Re-derives the state purely from venue facts and the cooldown clock.
    async fn rederive(&mut self, now: i64) {
        let now = self.market_time(now);
        let venue = match self.executor.venue_position(&self.config.symbol).await {
            Ok(venue) => venue,
            Err(e) => {
                tracing::warn!(bot_id = %self.id, error = %e, "Venue position unavailable; state left unchanged.");
                return;
            }
        };
        match reconcile(self.position.as_ref(), venue.as_ref()) {
            Reconciliation::InSync => {
                self.transition(BotState::PositionOpen);
            }
            Reconciliation::Flat => self.derive_flat(now),
            Reconciliation::ClosedOnVenue => {
                if let Some(record) = self.finalize_locally(ExitReason::VenueClosed, now) {
                    self.arm_cooldown(cooldown_applies(&self.config, &record), now);
                }
                self.derive_flat(now);
            }
            desync => self.force_close_desync(desync, now),
        }
    }

    /// Drops the local position at the best-known price without touching the venue.
    fn finalize_locally(&mut self, reason: ExitReason, now: i64) -> Option<TradeRecord> {
        let price = self.mark_price().map(|(p, _)| p);
        let position = self.position.take()?;
        self.touch_window = None;
        let price = price.unwrap_or(position.stop_loss);
        let exit_fee = fees::fill_fee(price, position.quantity, position.fee_rate);
        let record = position.close(price, now, exit_fee, Decimal::ZERO, reason);
        self.pending_exit = None;
        self.finish_trade(&record);
        Some(record)
    }

    fn force_close_desync(&mut self, detail: Reconciliation, now: i64) {
        let description = match &detail {
            Reconciliation::Orphaned(v) => format!("venue reports an unknown {} {} position", v.side, v.quantity),
            Reconciliation::Mismatch { local, venue } => format!("local {} vs venue {}", local, venue),
            other => format!("{:?}", other),
        };
        self.finalize_locally(ExitReason::Desync, now);
        self.fail(format!("state desync: {}", description));
    }

    // --- State plumbing ---

    /// Enters `Error` with an operator alert.
    fn fail(&mut self, reason: String) {
        tracing::error!(bot_id = %self.id, %reason, "Bot halted.");
        self.alert(Severity::Critical, reason.clone());
        self.transition(BotState::Error { reason });
    }

    fn alert(&self, severity: Severity, message: String) {
        self.services.notifier.notify(EngineEvent::Alert(Alert {
            bot_id: self.id.clone(),
            severity,
            message,
        }));
    }

    /// Moves to `next` if the edge is legal. Illegal edges are logged and refused.
    fn transition(&mut self, next: BotState) -> bool {
        if self.state == next {
            return true;
        }
        if !self.state.can_transition_to(&next) {
            tracing::error!(bot_id = %self.id, from = %self.state, to = %next, "Refusing illegal state transition.");
            return false;
        }
        tracing::info!(bot_id = %self.id, from = %self.state, to = %next, "State changed.");
        self.services.notifier.notify(EngineEvent::StateChanged(StateChange {
            bot_id: self.id.clone(),
            from: self.state.to_string(),
            to: next.to_string(),
            timestamp: Utc::now(),
        }));
        self.state = next;
        true
    }
}
