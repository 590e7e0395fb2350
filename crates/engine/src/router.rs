// In crates/engine/src/router.rs

use crate::cache::MarketDataCache;
use crate::gateway::{GatewayEvent, MarketDataGateway};
use crate::subscriptions::SubscriptionRegistry;
use crate::task::{BotCommand, BotHandle};
use core_types::{Interval, Symbol};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Sent by a trading task wrapper once its bot has finished.
#[derive(Debug)]
pub(crate) struct Finished {
    pub bot_id: String,
    pub symbol: Symbol,
    pub intervals: Vec<Interval>,
}

pub(crate) struct Route {
    pub handle: BotHandle,
    pub intervals: Vec<Interval>,
}

/// Owns the gateway: pulls events, keeps the cache current, fans events out to
/// the bots of each symbol and closes streams nobody listens to anymore.
pub(crate) struct Router {
    pub gateway: Box<dyn MarketDataGateway>,
    pub registry: SubscriptionRegistry,
    pub routes: HashMap<Symbol, Vec<Route>>,
    pub cache: MarketDataCache,
    pub done: mpsc::UnboundedReceiver<Finished>,
}

impl Router {
    fn live_bots(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        tracing::info!(gateway = self.gateway.name(), bots = self.live_bots(), "Market data router started.");
        loop {
            tokio::select! {
                event = self.gateway.next_event() => match event {
                    Ok(Some(event)) => Self::dispatch(&self.routes, &self.cache, event).await,
                    Ok(None) => {
                        tracing::info!("Market data feed ended.");
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Market data gateway failed.");
                        return Err(e.into());
                    }
                },
                Some(finished) = self.done.recv() => {
                    self.retire(finished).await;
                    if self.live_bots() == 0 {
                        tracing::info!("All bots have finished; closing market data router.");
                        return Ok(());
                    }
                }
            }
        }
    }

    // Borrows only the shareable parts; the gateway itself is `Send` but not `Sync`.
    async fn dispatch(routes: &HashMap<Symbol, Vec<Route>>, cache: &MarketDataCache, event: GatewayEvent) {
        let Some(routes) = routes.get(event.symbol()) else {
            tracing::debug!(symbol = %event.symbol(), "Dropping event for a symbol without bots.");
            return;
        };

        match &event {
            GatewayEvent::Tick { symbol, price, time } => {
                cache.update_price(symbol, *price, *time).await;
            }
            GatewayEvent::Kline { symbol, kline, .. } if kline.is_final => {
                cache.update_price(symbol, kline.close, kline.close_time).await;
            }
            _ => {}
        }

        for route in routes {
            let command = match &event {
                GatewayEvent::Tick { price, time, .. } => BotCommand::Tick {
                    price: *price,
                    time: *time,
                },
                GatewayEvent::Kline { interval, kline, .. } if route.intervals.contains(interval) => BotCommand::Kline {
                    interval: *interval,
                    kline: kline.clone(),
                },
                GatewayEvent::Reconnected { interval, history, .. } if route.intervals.contains(interval) => {
                    BotCommand::Reconnected {
                        interval: *interval,
                        history: history.clone(),
                    }
                }
                _ => continue,
            };
            // A finished bot is removed once its `Finished` message arrives.
            if let Err(e) = route.handle.send(command).await {
                tracing::debug!(error = %e, "Bot is no longer receiving events.");
            }
        }
    }

    async fn retire(&mut self, finished: Finished) {
        tracing::info!(bot_id = %finished.bot_id, "Retiring bot from market data routing.");
        if let Some(routes) = self.routes.get_mut(&finished.symbol) {
            routes.retain(|r| r.handle.id() != finished.bot_id);
            if routes.is_empty() {
                self.routes.remove(&finished.symbol);
            }
        }
        for interval in finished.intervals {
            if self.registry.release(&finished.symbol, interval) {
                if let Err(e) = self.gateway.unsubscribe(&finished.symbol, interval).await {
                    tracing::warn!(symbol = %finished.symbol, %interval, error = %e, "Unsubscribe failed.");
                }
            }
        }
    }
}
