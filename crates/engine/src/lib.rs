// In crates/engine/src/lib.rs

pub mod bot;
pub mod cache;
pub mod error;
pub mod gateway;
pub mod history;
pub mod reconciler;
mod router;
pub mod state;
pub mod subscriptions;
pub mod task;

pub use bot::{Bot, BotServices};
pub use cache::{MarketDataCache, SymbolSnapshot};
pub use error::{Error, Result};
pub use gateway::{GatewayEvent, MarketDataGateway};
pub use reconciler::{reconcile, Reconciliation};
pub use state::{BotState, BotStatus};
pub use subscriptions::SubscriptionRegistry;
pub use task::{BotCommand, BotHandle, TradingTask};

use crate::router::{Finished, Route, Router};
use app_config::{EngineSettings, LiveConfig};
use core_types::{BotConfig, ExecutionMode, Symbol};
use execution::{Executor, SimulatedExecutor, SimulationSettings};
use futures::future;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Builds the executor for one bot.
pub type ExecutorFactory = Box<dyn Fn(&BotConfig) -> anyhow::Result<Box<dyn Executor>> + Send + Sync>;

/// The portfolio-level orchestrator for all trading activities.
pub struct Engine {
    live_config: LiveConfig,
    settings: EngineSettings,
    executors: ExecutorFactory,
    services: BotServices,
}

impl Engine {
    pub fn new(
        live_config: LiveConfig,
        settings: EngineSettings,
        executors: ExecutorFactory,
        services: BotServices,
    ) -> Self {
        Self {
            live_config,
            settings,
            executors,
            services,
        }
    }

    /// An executor factory backed by one simulated portfolio per bot. Live bots
    /// are refused because they need a venue client.
    pub fn simulated_executors(settings: SimulationSettings) -> ExecutorFactory {
        Box::new(move |config: &BotConfig| match config.mode {
            ExecutionMode::Simulated => Ok(Box::new(SimulatedExecutor::new(
                settings.clone(),
                config.allocated_capital,
            )) as Box<dyn Executor>),
            ExecutionMode::Live => anyhow::bail!(
                "Bot '{}' is configured for live execution, which needs a venue client.",
                config.bot_id()
            ),
        })
    }

    /// Spawns a `TradingTask` for each enabled bot and the router that feeds them.
    pub async fn start(self, mut gateway: Box<dyn MarketDataGateway>) -> anyhow::Result<RunningEngine> {
        tracing::info!("Initializing Portfolio Orchestrator Engine...");

        let mut registry = SubscriptionRegistry::new();
        let mut routes: HashMap<Symbol, Vec<Route>> = HashMap::new();
        let mut handles = Vec::new();
        let mut tasks = Vec::new();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let watchdog = Duration::from_secs(self.settings.watchdog_secs.max(1));

        for config in self.live_config.enabled() {
            let config = config.clone();
            let bot_id = config.bot_id();
            tracing::info!(bot_id = %bot_id, "Setting up trading task.");

            let executor = match (self.executors)(&config) {
                Ok(executor) => executor,
                Err(e) => {
                    tracing::error!(bot_id = %bot_id, error = %e, "No executor for bot. Skipping.");
                    continue;
                }
            };
            self.services
                .cache
                .set_precision(&config.symbol, config.precision.clone())
                .await;
            let bot = match Bot::from_config(config, executor, self.services.clone()) {
                Ok(bot) => bot,
                Err(e) => {
                    tracing::error!(bot_id = %bot_id, error = %e, "Invalid bot configuration. Skipping.");
                    continue;
                }
            };

            let symbol = bot.config().symbol.clone();
            let intervals = bot.intervals();
            for &interval in &intervals {
                if registry.acquire(&symbol, interval) {
                    gateway.subscribe(&symbol, interval).await?;
                }
            }

            let (task, handle) = TradingTask::new(bot, self.settings.channel_capacity, watchdog);
            let done = done_tx.clone();
            let finished = Finished {
                bot_id,
                symbol: symbol.clone(),
                intervals: intervals.clone(),
            };
            tasks.push(tokio::spawn(async move {
                let result = task.run().await;
                // The router may already be gone at shutdown.
                let _ = done.send(finished);
                result
            }));

            routes.entry(symbol).or_default().push(Route {
                handle: handle.clone(),
                intervals,
            });
            handles.push(handle);
        }
        drop(done_tx);

        if tasks.is_empty() {
            anyhow::bail!("No trading tasks were started. Check your live.toml configuration.");
        }
        tracing::info!(count = tasks.len(), "All trading tasks have been spawned.");

        let router = Router {
            gateway,
            registry,
            routes,
            cache: self.services.cache.clone(),
            done: done_rx,
        };
        let router = tokio::spawn(router.run());

        Ok(RunningEngine {
            handles,
            tasks,
            router,
        })
    }

    /// Starts every bot and runs until the feed ends or every bot has stopped.
    pub async fn run(self, gateway: Box<dyn MarketDataGateway>) -> anyhow::Result<Vec<BotStatus>> {
        self.start(gateway).await?.join().await
    }
}

/// A started engine: the bot handles plus the tasks to join.
pub struct RunningEngine {
    handles: Vec<BotHandle>,
    tasks: Vec<JoinHandle<anyhow::Result<BotStatus>>>,
    router: JoinHandle<anyhow::Result<()>>,
}

impl RunningEngine {
    pub fn handles(&self) -> &[BotHandle] {
        &self.handles
    }

    pub fn handle(&self, bot_id: &str) -> Option<&BotHandle> {
        self.handles.iter().find(|h| h.id() == bot_id)
    }

    /// Asks every bot to close out and stop. Bots that already finished are skipped.
    pub async fn stop_all(&self) {
        Self::stop(&self.handles).await;
    }

    /// Waits for the market data feed to end, then stops every bot and collects
    /// their final status.
    pub async fn join(self) -> anyhow::Result<Vec<BotStatus>> {
        let Self {
            handles,
            tasks,
            router,
        } = self;

        match router.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Market data router failed."),
            Err(e) => tracing::error!(error = %e, "Market data router panicked."),
        }

        Self::stop(&handles).await;
        Self::collect(tasks).await
    }

    /// Stops every bot without waiting for the feed to end.
    pub async fn shutdown(self) -> anyhow::Result<Vec<BotStatus>> {
        Self::stop(&self.handles).await;
        let statuses = Self::collect(self.tasks).await;
        // With every bot gone the router has nothing left to feed.
        self.router.abort();
        statuses
    }

    async fn stop(handles: &[BotHandle]) {
        for handle in handles {
            if let Err(e) = handle.stop().await {
                tracing::debug!(bot_id = %handle.id(), error = %e, "Bot already finished.");
            }
        }
    }

    async fn collect(tasks: Vec<JoinHandle<anyhow::Result<BotStatus>>>) -> anyhow::Result<Vec<BotStatus>> {
        let results = future::join_all(tasks).await;
        let mut statuses = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(Ok(status)) => {
                    tracing::info!(bot_id = %status.bot_id, state = %status.state, "Trading task finished.");
                    statuses.push(status);
                }
                Ok(Err(e)) => tracing::error!(error = %e, "A trading task failed."),
                Err(e) => tracing::error!(error = %e, "A trading task panicked."),
            }
        }
        if statuses.is_empty() {
            anyhow::bail!("Every trading task terminated abnormally.");
        }
        Ok(statuses)
    }
}
