// In crates/engine/src/cache.rs

use core_types::{PrecisionRules, Symbol};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolSnapshot {
    pub last_price: Option<Decimal>,
    /// Market time of `last_price`, unix ms.
    pub updated_at: i64,
    /// Exchange metadata, when known.
    pub precision: Option<PrecisionRules>,
}

/// Read-mostly market data shared by every bot: recent prices and exchange
/// metadata. Writers take the lock briefly; readers never block each other.
#[derive(Debug, Clone, Default)]
pub struct MarketDataCache {
    inner: Arc<RwLock<HashMap<Symbol, SymbolSnapshot>>>,
}

impl MarketDataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a price unless a newer one is already held.
    pub async fn update_price(&self, symbol: &Symbol, price: Decimal, time: i64) {
        let mut map = self.inner.write().await;
        let entry = map.entry(symbol.clone()).or_default();
        if entry.last_price.is_none() || time >= entry.updated_at {
            entry.last_price = Some(price);
            entry.updated_at = time;
        }
    }

    pub async fn set_precision(&self, symbol: &Symbol, precision: PrecisionRules) {
        self.inner.write().await.entry(symbol.clone()).or_default().precision = Some(precision);
    }

    pub async fn last_price(&self, symbol: &Symbol) -> Option<Decimal> {
        self.inner.read().await.get(symbol).and_then(|s| s.last_price)
    }

    pub async fn precision(&self, symbol: &Symbol) -> Option<PrecisionRules> {
        self.inner.read().await.get(symbol).and_then(|s| s.precision.clone())
    }

    pub async fn snapshot(&self, symbol: &Symbol) -> Option<SymbolSnapshot> {
        self.inner.read().await.get(symbol).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn older_prices_do_not_overwrite_newer_ones() {
        let cache = MarketDataCache::new();
        let sym = Symbol::from("BTCUSDT");
        cache.update_price(&sym, dec!(100), 2_000).await;
        cache.update_price(&sym, dec!(99), 1_000).await;
        assert_eq!(cache.last_price(&sym).await, Some(dec!(100)));
        cache.update_price(&sym, dec!(101), 3_000).await;
        assert_eq!(cache.last_price(&sym).await, Some(dec!(101)));
        assert!(cache.precision(&sym).await.is_none());
    }
}
