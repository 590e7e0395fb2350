// In app/src/paper_feed.rs

use crate::data_loader::load_klines;
use async_trait::async_trait;
use core_types::{Interval, Kline, Symbol};
use engine::{Error, GatewayEvent, MarketDataGateway, Result};
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::time::Duration;

/// A market data gateway that replays recorded klines for paper trading.
///
/// Each subscribed stream reads `{dir}/{symbol}_{interval}.csv`. Streams are
/// merged in close-time order; every bar is delivered as a final kline followed
/// by a tick at its close.
pub struct PaperFeed {
    dir: PathBuf,
    pace: Duration,
    streams: BTreeMap<(Symbol, Interval), VecDeque<Kline>>,
    pending: VecDeque<GatewayEvent>,
}

impl PaperFeed {
    pub fn new(dir: impl Into<PathBuf>, pace: Duration) -> Self {
        Self {
            dir: dir.into(),
            pace,
            streams: BTreeMap::new(),
            pending: VecDeque::new(),
        }
    }

    fn path(&self, symbol: &Symbol, interval: Interval) -> PathBuf {
        self.dir.join(format!("{}_{}.csv", symbol, interval))
    }

    /// The stream whose next bar closes first. Finer intervals win ties.
    fn next_stream(&self) -> Option<(Symbol, Interval)> {
        self.streams
            .iter()
            .filter_map(|(key, bars)| bars.front().map(|k| (k.close_time, key.1.duration_ms(), key)))
            .min_by_key(|(close, width, _)| (*close, *width))
            .map(|(_, _, key)| key.clone())
    }
}

#[async_trait]
impl MarketDataGateway for PaperFeed {
    fn name(&self) -> &'static str {
        "paper-feed"
    }

    async fn subscribe(&mut self, symbol: &Symbol, interval: Interval) -> Result<()> {
        let path = self.path(symbol, interval);
        let bars = load_klines(&path).map_err(|e| Error::Gateway(format!("{:#}", e)))?;
        tracing::info!(%symbol, %interval, bars = bars.len(), "Paper stream subscribed.");
        self.streams.insert((symbol.clone(), interval), bars.into());
        Ok(())
    }

    async fn unsubscribe(&mut self, symbol: &Symbol, interval: Interval) -> Result<()> {
        if self.streams.remove(&(symbol.clone(), interval)).is_some() {
            tracing::info!(%symbol, %interval, "Paper stream closed.");
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<GatewayEvent>> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }
        let Some(key) = self.next_stream() else {
            tracing::info!("Paper feed exhausted.");
            return Ok(None);
        };
        let Some(mut kline) = self.streams.get_mut(&key).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };
        if !self.pace.is_zero() {
            tokio::time::sleep(self.pace).await;
        }

        let (symbol, interval) = key;
        kline.is_final = true;
        self.pending.push_back(GatewayEvent::Tick {
            symbol: symbol.clone(),
            price: kline.close,
            time: kline.close_time,
        });
        Ok(Some(GatewayEvent::Kline {
            symbol,
            interval,
            kline,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_series(dir: &std::path::Path, name: &str, rows: &[(i64, i64, &str)]) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        writeln!(file, "open_time,open,high,low,close,volume,close_time").unwrap();
        for (open, close, price) in rows {
            writeln!(file, "{open},{price},{price},{price},{price},1,{close}").unwrap();
        }
    }

    #[tokio::test]
    async fn merges_streams_by_close_time_with_finer_bars_first() {
        let dir = tempfile::tempdir().unwrap();
        write_series(dir.path(), "BTCUSDT_1h.csv", &[(0, 3_599_999, "100")]);
        write_series(
            dir.path(),
            "BTCUSDT_30m.csv",
            &[(0, 1_799_999, "99"), (1_800_000, 3_599_999, "101")],
        );

        let mut feed = PaperFeed::new(dir.path(), Duration::ZERO);
        let symbol = Symbol::from("BTCUSDT");
        feed.subscribe(&symbol, Interval::H1).await.unwrap();
        feed.subscribe(&symbol, Interval::M30).await.unwrap();

        let mut order = Vec::new();
        while let Some(event) = feed.next_event().await.unwrap() {
            if let GatewayEvent::Kline { interval, kline, .. } = event {
                order.push((interval, kline.close_time));
            }
        }
        assert_eq!(
            order,
            vec![
                (Interval::M30, 1_799_999),
                (Interval::M30, 3_599_999),
                (Interval::H1, 3_599_999),
            ]
        );
    }

    #[tokio::test]
    async fn missing_recordings_are_gateway_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut feed = PaperFeed::new(dir.path(), Duration::ZERO);
        let err = feed.subscribe(&Symbol::from("ETHUSDT"), Interval::M1).await.unwrap_err();
        assert!(matches!(err, Error::Gateway(_)));
    }
}
