// In crates/core-types/src/interval.rs

use crate::error::{Error, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A kline interval supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    D1,
}

const MINUTE_MS: i64 = 60_000;

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M3 => "3m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H2 => "2h",
            Interval::H4 => "4h",
            Interval::D1 => "1d",
        }
    }

    pub fn duration_ms(&self) -> i64 {
        let minutes = match self {
            Interval::M1 => 1,
            Interval::M3 => 3,
            Interval::M5 => 5,
            Interval::M15 => 15,
            Interval::M30 => 30,
            Interval::H1 => 60,
            Interval::H2 => 120,
            Interval::H4 => 240,
            Interval::D1 => 1440,
        };
        minutes * MINUTE_MS
    }

    /// Reward multiple used when the bot does not configure one.
    /// Faster bars get smaller multiples.
    pub fn default_reward_multiple(&self) -> Decimal {
        match self.duration_ms() {
            d if d <= MINUTE_MS => dec!(1.5),
            d if d <= 5 * MINUTE_MS => dec!(2.0),
            d if d <= 30 * MINUTE_MS => dec!(2.5),
            _ => dec!(3.0),
        }
    }

    /// Number of bars of this interval per 365-day year.
    pub fn bars_per_year(&self) -> f64 {
        (365 * 24 * 60 * MINUTE_MS) as f64 / self.duration_ms() as f64
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1m" => Ok(Interval::M1),
            "3m" => Ok(Interval::M3),
            "5m" => Ok(Interval::M5),
            "15m" => Ok(Interval::M15),
            "30m" => Ok(Interval::M30),
            "1h" => Ok(Interval::H1),
            "2h" => Ok(Interval::H2),
            "4h" => Ok(Interval::H4),
            "1d" => Ok(Interval::D1),
            other => Err(Error::UnknownInterval(other.to_string())),
        }
    }
}

impl TryFrom<String> for Interval {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.as_str().to_string()
    }
}
