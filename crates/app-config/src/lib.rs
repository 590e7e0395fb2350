// In crates/app-config/src/lib.rs

use config::{Config, Environment, File};
use std::collections::HashSet;
use std::path::Path;

pub mod error;
pub mod types;

// Re-export the most important types for easy access.
pub use error::{Error, Result};
pub use types::{AppSettings, BacktestDefaults, BotEntry, EngineSettings, LiveConfig, Settings};

/// Loads the application settings from various sources.
///
/// This function orchestrates the layered configuration loading:
/// 1. Reads from a default `base.toml` file.
/// 2. Merges settings from an environment-specific file (e.g., `development.toml`).
/// 3. Merges settings from environment variables.
pub fn load_settings() -> Result<Settings> {
    load_settings_from("config")
}

/// Same layering as [`load_settings`], rooted at `dir`.
pub fn load_settings_from(dir: impl AsRef<Path>) -> Result<Settings> {
    let dir = dir.as_ref();
    // Get the current environment. Default to "development" if not set.
    let environment = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".into());

    let settings = Config::builder()
        .add_source(File::with_name(&dir.join("base").to_string_lossy()))
        .add_source(File::with_name(&dir.join(&environment).to_string_lossy()).required(false))
        // e.g. `APP__ENGINE__WATCHDOG_SECS=10`
        .add_source(Environment::with_prefix("APP").prefix_separator("__").separator("__"))
        .build()?;

    let settings: Settings = settings.try_deserialize()?;
    Ok(settings)
}

/// Loads the live trading configuration from `config/live.toml`.
pub fn load_live_config() -> Result<LiveConfig> {
    load_live_config_from("config/live.toml")
}

/// Parses a live configuration file and validates every enabled bot.
pub fn load_live_config_from(path: impl AsRef<Path>) -> Result<LiveConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_live_config(&content)
}

pub fn parse_live_config(content: &str) -> Result<LiveConfig> {
    let config: LiveConfig = toml::from_str(content)?;

    let mut seen = HashSet::new();
    for bot in config.enabled() {
        bot.validate()?;
        let id = bot.bot_id();
        if !seen.insert(id.clone()) {
            return Err(Error::DuplicateBot(id));
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{ExecutionMode, Interval};
    use rust_decimal_macros::dec;
    use std::fs;

    const BASE: &str = r#"
        [app]
        environment = "test"
        log_level = "info"
        optimizer_cores = 2

        [simulation]
        slippage_percent = 0.001

        [engine]
        watchdog_secs = 9
    "#;

    const LIVE: &str = r#"
        [[bots]]
        symbol = "BTCUSDT"
        interval = "1h"
        allocated_capital = 1000.0
        mode = "simulated"

        [bots.strategy]
        name = "supertrend"
        params = { period = 10, multiplier = 3.0 }

        [[bots]]
        enabled = false
        symbol = "ETHUSDT"
        interval = "15m"
        allocated_capital = 500.0

        [bots.strategy]
        name = "ma_crossover"
    "#;

    #[test]
    fn settings_are_layered_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("base.toml"), BASE).unwrap();

        let settings = load_settings_from(dir.path()).unwrap();
        assert_eq!(settings.app.optimizer_cores, 2);
        assert_eq!(settings.simulation.slippage_percent, dec!(0.001));
        assert_eq!(settings.engine.watchdog_secs, 9);
        // Untouched sections keep their defaults.
        assert_eq!(settings.engine.channel_capacity, 1024);
        assert_eq!(settings.backtest, BacktestDefaults::default());
    }

    #[test]
    fn missing_base_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_settings_from(dir.path()), Err(Error::LoadError(_))));
    }

    #[test]
    fn live_config_keeps_disabled_bots_out_of_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.toml");
        fs::write(&path, LIVE).unwrap();

        let live = load_live_config_from(&path).unwrap();
        assert_eq!(live.bots.len(), 2);
        let enabled: Vec<_> = live.enabled().collect();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].interval, Interval::H1);
        assert_eq!(enabled[0].mode, ExecutionMode::Simulated);
        assert_eq!(enabled[0].allocated_capital, dec!(1000));
    }

    #[test]
    fn duplicate_bots_are_refused() {
        let bot = r#"
            [[bots]]
            symbol = "BTCUSDT"
            interval = "1h"
            allocated_capital = 1000.0

            [bots.strategy]
            name = "supertrend"
        "#;
        let doubled = format!("{bot}\n{bot}");
        assert!(matches!(parse_live_config(&doubled), Err(Error::DuplicateBot(_))));
    }

    #[test]
    fn invalid_bot_is_refused() {
        let bad = LIVE.replace("allocated_capital = 1000.0", "allocated_capital = 0.0");
        assert!(matches!(parse_live_config(&bad), Err(Error::InvalidBot(_))));
    }

    #[test]
    fn htf_sharing_the_bot_interval_is_refused() {
        let htf = LIVE.replacen(
            "mode = \"simulated\"",
            "mode = \"simulated\"\n\n        [bots.features]\n        htf_confirmation = true\n        htf_interval = \"1h\"",
            1,
        );
        assert!(matches!(parse_live_config(&htf), Err(Error::InvalidBot(_))));
        let coarser = htf.replace("htf_interval = \"1h\"", "htf_interval = \"4h\"");
        assert!(parse_live_config(&coarser).is_ok());
    }
}
