// In crates/engine/src/task.rs

use crate::bot::Bot;
use crate::state::{BotState, BotStatus};
use crate::{Error, Result};
use chrono::Utc;
use core_types::{BotConfig, Interval, Kline};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

/// Everything that can be asked of a running bot.
#[derive(Debug)]
pub enum BotCommand {
    Kline { interval: Interval, kline: Kline },
    Tick { price: Decimal, time: i64 },
    Reconnected { interval: Interval, history: Vec<Kline> },
    Pause,
    Resume,
    Reset,
    UpdateConfig {
        config: Box<BotConfig>,
        reply: oneshot::Sender<Result<()>>,
    },
    Stop,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// The only way to reach a running bot: a command queue plus a status feed.
#[derive(Debug, Clone)]
pub struct BotHandle {
    id: String,
    tx: mpsc::Sender<BotCommand>,
    status: watch::Receiver<BotStatus>,
}

impl BotHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> BotStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BotStatus> {
        self.status.clone()
    }

    pub async fn send(&self, command: BotCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| Error::BotGone(self.id.clone()))
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(BotCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.send(BotCommand::Resume).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.send(BotCommand::Reset).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(BotCommand::Stop).await
    }

    /// Sends a new config snapshot and waits for the bot to accept or refuse it.
    pub async fn update_config(&self, config: BotConfig) -> Result<()> {
        let (reply, answer) = oneshot::channel();
        self.send(BotCommand::UpdateConfig {
            config: Box::new(config),
            reply,
        })
        .await?;
        answer.await.map_err(|_| Error::BotGone(self.id.clone()))?
    }

    /// Waits until the bot reports a state matching `predicate`.
    pub async fn wait_for(&mut self, predicate: impl Fn(&BotState) -> bool) -> Result<BotStatus> {
        let status = self
            .status
            .wait_for(|s| predicate(&s.state))
            .await
            .map_err(|_| Error::BotGone(self.id.clone()))?;
        Ok((*status).clone())
    }
}

/// A self-contained task that owns one bot and serves its command queue and watchdog.
pub struct TradingTask {
    bot: Bot,
    rx: mpsc::Receiver<BotCommand>,
    status_tx: watch::Sender<BotStatus>,
    watchdog_period: Duration,
}

impl TradingTask {
    pub fn new(bot: Bot, capacity: usize, watchdog_period: Duration) -> (Self, BotHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (status_tx, status) = watch::channel(BotStatus::starting(bot.id()));
        let handle = BotHandle {
            id: bot.id().to_string(),
            tx,
            status,
        };
        let task = Self {
            bot,
            rx,
            status_tx,
            watchdog_period,
        };
        (task, handle)
    }

    /// The main, long-running loop for this trading task.
    ///
    /// Each command or watchdog tick is handled to completion before the next
    /// one is taken, so the bot never sees interleaved mutations.
    pub async fn run(mut self) -> anyhow::Result<BotStatus> {
        let id = self.bot.id().to_string();
        tracing::info!(bot_id = %id, "Starting trading task.");

        self.bot.start(now_ms()).await;
        self.publish();

        let mut watchdog = tokio::time::interval(self.watchdog_period);
        watchdog.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        watchdog.tick().await;

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => {
                        tracing::warn!(bot_id = %id, "Command channel closed; stopping bot.");
                        self.bot.stop(now_ms()).await;
                        self.publish();
                        break;
                    }
                },
                _ = watchdog.tick() => self.bot.on_watchdog(now_ms()).await,
            }
            self.publish();
            if self.bot.state().is_terminal() {
                break;
            }
        }

        tracing::info!(bot_id = %id, "Trading task finished.");
        Ok(self.bot.status())
    }

    async fn handle(&mut self, command: BotCommand) {
        match command {
            BotCommand::Kline { interval, kline } => self.bot.on_kline(interval, kline).await,
            BotCommand::Tick { price, time } => self.bot.on_tick(price, time).await,
            BotCommand::Reconnected { interval, history } => self.bot.on_reconnect(interval, history),
            BotCommand::Pause => {
                if let Err(e) = self.bot.pause() {
                    tracing::warn!(bot_id = %self.bot.id(), error = %e, "Pause refused.");
                }
            }
            BotCommand::Resume => {
                if let Err(e) = self.bot.resume(now_ms()).await {
                    tracing::warn!(bot_id = %self.bot.id(), error = %e, "Resume refused.");
                }
            }
            BotCommand::Reset => {
                if let Err(e) = self.bot.reset(now_ms()).await {
                    tracing::warn!(bot_id = %self.bot.id(), error = %e, "Reset refused.");
                }
            }
            BotCommand::UpdateConfig { config, reply } => {
                let result = self.bot.update_config(*config);
                if let Err(e) = &result {
                    tracing::warn!(bot_id = %self.bot.id(), error = %e, "Config update refused.");
                }
                // The caller may have given up waiting.
                let _ = reply.send(result);
            }
            BotCommand::Stop => self.bot.stop(now_ms()).await,
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.bot.status());
    }
}
