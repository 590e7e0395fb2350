// In crates/engine/src/subscriptions.rs

use core_types::{Interval, Symbol};
use std::collections::HashMap;

pub type StreamKey = (Symbol, Interval);

/// Reference-counted market data subscriptions. Bots that need the same
/// `(symbol, interval)` stream share one upstream subscription.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionRegistry {
    counts: HashMap<StreamKey, usize>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber. Returns `true` when this is the first one, i.e. the
    /// upstream stream has to be opened.
    pub fn acquire(&mut self, symbol: &Symbol, interval: Interval) -> bool {
        let count = self.counts.entry((symbol.clone(), interval)).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Drops a subscriber. Returns `true` when it was the last one, i.e. the
    /// upstream stream can be closed.
    pub fn release(&mut self, symbol: &Symbol, interval: Interval) -> bool {
        let key = (symbol.clone(), interval);
        match self.counts.get_mut(&key) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.counts.remove(&key);
                true
            }
            None => false,
        }
    }

    pub fn subscribers(&self, symbol: &Symbol, interval: Interval) -> usize {
        self.counts.get(&(symbol.clone(), interval)).copied().unwrap_or(0)
    }

    pub fn streams(&self) -> impl Iterator<Item = &StreamKey> {
        self.counts.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_streams_open_once_and_close_with_the_last_subscriber() {
        let mut reg = SubscriptionRegistry::new();
        let sym = Symbol::from("ETHUSDT");
        assert!(reg.acquire(&sym, Interval::M1));
        assert!(!reg.acquire(&sym, Interval::M1));
        assert!(reg.acquire(&sym, Interval::H1));
        assert_eq!(reg.subscribers(&sym, Interval::M1), 2);

        assert!(!reg.release(&sym, Interval::M1));
        assert!(reg.release(&sym, Interval::M1));
        assert!(!reg.release(&sym, Interval::M1));
        assert_eq!(reg.streams().count(), 1);
    }
}
