// In crates/app-config/src/types.rs

use core_types::BotConfig;
use execution::SimulationSettings;
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// The application's general settings.
    pub app: AppSettings,
    #[serde(default)]
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub backtest: BacktestDefaults,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppSettings {
    /// The environment the application is running in (e.g., "development", "production").
    pub environment: String,
    /// The log level for the application.
    pub log_level: String,

    pub optimizer_cores: u32,
}

/// Tuning of the per-bot tasks.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    /// Period of the reconciliation and staleness watchdog.
    pub watchdog_secs: u64,
    /// Capacity of each bot's command queue.
    pub channel_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            watchdog_secs: 5,
            channel_capacity: 1024,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct BacktestDefaults {
    /// Bars skipped before the first entry. Zero means the strategy's own warmup.
    pub warmup_bars: usize,
    /// Starting equity of the replay. Defaults to the bot's allocated capital.
    pub initial_equity: Option<Decimal>,
}

// --- Structs for live.toml Configuration ---

/// The set of bots for a live or paper trading run.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct LiveConfig {
    #[serde(default)]
    pub bots: Vec<BotEntry>,
}

impl LiveConfig {
    pub fn enabled(&self) -> impl Iterator<Item = &BotConfig> {
        self.bots.iter().filter(|b| b.enabled).map(|b| &b.config)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct BotEntry {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub config: BotConfig,
}

fn default_enabled() -> bool {
    true
}
