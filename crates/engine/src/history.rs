// In crates/engine/src/history.rs

use core_types::Kline;
use std::collections::VecDeque;

/// What an upsert did to the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Appended,
    /// A bar with the same `open_time` was already held and has been replaced.
    Replaced,
    /// Older than the newest bar and not held: dropped.
    Stale,
}

/// A bounded, time-ordered window of final klines for one interval.
///
/// The buffer is kept contiguous after every mutation so [`KlineHistory::klines`]
/// can hand out a plain slice.
#[derive(Debug, Clone)]
pub struct KlineHistory {
    capacity: usize,
    bars: VecDeque<Kline>,
}

impl KlineHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            bars: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Inserts `kline`, replacing a held bar with the same `open_time`.
    pub fn upsert(&mut self, kline: Kline) -> Upsert {
        let outcome = match self.bars.back() {
            None => {
                self.bars.push_back(kline);
                Upsert::Appended
            }
            Some(last) if kline.open_time > last.open_time => {
                self.bars.push_back(kline);
                if self.bars.len() > self.capacity {
                    self.bars.pop_front();
                }
                Upsert::Appended
            }
            Some(_) => match self.bars.iter().rposition(|b| b.open_time == kline.open_time) {
                Some(idx) => {
                    self.bars[idx] = kline;
                    Upsert::Replaced
                }
                None => Upsert::Stale,
            },
        };
        self.bars.make_contiguous();
        outcome
    }

    /// Replaces the whole window, e.g. after a gateway reconnect.
    pub fn replace_all(&mut self, mut klines: Vec<Kline>) {
        klines.retain(|k| k.is_final);
        klines.sort_by_key(|k| k.open_time);
        klines.dedup_by(|later, earlier| {
            if later.open_time == earlier.open_time {
                std::mem::swap(later, earlier);
                true
            } else {
                false
            }
        });
        let skip = klines.len().saturating_sub(self.capacity);
        self.bars = klines.into_iter().skip(skip).collect();
        self.bars.make_contiguous();
    }

    pub fn klines(&self) -> &[Kline] {
        self.bars.as_slices().0
    }

    pub fn last(&self) -> Option<&Kline> {
        self.bars.back()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}
