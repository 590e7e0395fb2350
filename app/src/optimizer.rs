// In app/src/optimizer.rs

use crate::data_loader::MarketData;
use analytics::PerformanceReport;
use anyhow::{Context, Result};
use backtester::{BacktestSettings, Backtester};
use core_types::{BotConfig, StrategyConfig};
use itertools::Itertools;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use toml::Value;

// --- Structs for deserializing optimizer.toml ---

#[derive(Deserialize, Debug)]
pub struct OptimizerConfig {
    pub job: JobSettings,

    // Every other top-level table, keyed by name (e.g. "supertrend_params").
    #[serde(flatten)]
    pub strategy_params: HashMap<String, Value>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct JobSettings {
    pub name: String,
    /// Id (or index) of the bot in live.toml whose config is swept.
    pub bot: String,
    pub strategy_to_optimize: String,
    pub coarse: PathBuf,
    pub fine: PathBuf,
    #[serde(default)]
    pub htf: Option<PathBuf>,
    /// Runs with fewer trades are not ranked.
    #[serde(default = "default_min_trades")]
    pub min_trades: u32,
}

fn default_min_trades() -> u32 {
    30
}

/// One finished replay of the sweep.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationRun {
    pub parameters: Value,
    pub report: PerformanceReport,
}

// --- Public API for the Optimizer Module ---

pub fn load_optimizer_config(path: &Path) -> Result<OptimizerConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Expands a `{ start, end, step }` table into its values; anything else is fixed.
/// Integer bounds give integers, any float bound gives floats.
fn expand_value(key: &str, value: &Value) -> Result<Vec<Value>> {
    let Some(table) = value.as_table() else {
        return Ok(vec![value.clone()]);
    };
    let (Some(start), Some(end)) = (table.get("start"), table.get("end")) else {
        return Ok(vec![value.clone()]);
    };
    let step = table.get("step");

    if let (Value::Integer(start), Value::Integer(end)) = (start, end) {
        let step = match step {
            None => 1,
            Some(Value::Integer(s)) if *s > 0 => *s,
            Some(other) => anyhow::bail!("'{}': integer range needs a positive integer step, got {}", key, other),
        };
        return Ok((*start..=*end).step_by(step as usize).map(Value::Integer).collect());
    }

    let as_float = |v: &Value| v.as_float().or_else(|| v.as_integer().map(|i| i as f64));
    let (Some(start), Some(end)) = (as_float(start), as_float(end)) else {
        anyhow::bail!("'{}': range bounds must be numbers", key);
    };
    let step = match step.map(as_float) {
        None => 1.0,
        Some(Some(s)) if s > 0.0 => s,
        Some(_) => anyhow::bail!("'{}': range step must be a positive number", key),
    };
    let count = ((end - start) / step + 1e-9).floor().max(-1.0) as i64 + 1;
    // Computed from the index so float error never accumulates.
    Ok((0..count)
        .map(|i| Value::Float(((start + i as f64 * step) * 1e9).round() / 1e9))
        .collect())
}

/// Builds every parameter table of the sweep for the job's strategy. Sets the
/// strategy factory rejects are dropped with a warning.
pub fn generate_parameter_sets(config: &OptimizerConfig) -> Result<Vec<Value>> {
    let strategy = &config.job.strategy_to_optimize;
    let strategy_key = format!("{}_params", strategy);

    let params_value = config.strategy_params.get(&strategy_key).ok_or_else(|| {
        anyhow::anyhow!(
            "Parameter table '{}' not found in optimizer.toml. Available tables are: {:?}",
            strategy_key,
            config.strategy_params.keys().collect::<Vec<_>>()
        )
    })?;
    let params_table = params_value
        .as_table()
        .ok_or_else(|| anyhow::anyhow!("'{}' must be a TOML table.", strategy_key))?;

    let keys: Vec<&String> = params_table.keys().collect();
    let value_lists = params_table
        .iter()
        .map(|(k, v)| expand_value(k, v))
        .collect::<Result<Vec<_>>>()?;

    let tables: Vec<Value> = if keys.is_empty() {
        vec![Value::Table(Default::default())]
    } else {
        value_lists
            .into_iter()
            .multi_cartesian_product()
            .map(|combo| {
                let table: toml::map::Map<String, Value> =
                    keys.iter().map(|k| (*k).clone()).zip(combo).collect();
                Value::Table(table)
            })
            .collect()
    };

    let total = tables.len();
    let valid: Vec<Value> = tables
        .into_iter()
        .filter(|params| {
            match strategies::create_strategy(&StrategyConfig::new(strategy.clone(), params.clone())) {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!(%params, error = %e, "Skipping invalid parameter set.");
                    false
                }
            }
        })
        .collect();
    tracing::info!(total, valid = valid.len(), strategy = %strategy, "Generated parameter sets.");
    Ok(valid)
}

/// Replays every parameter set in parallel on a dedicated pool.
pub fn run_optimization(
    cores: u32,
    base: &BotConfig,
    data: &MarketData,
    settings: &BacktestSettings,
    strategy: &str,
    param_sets: Vec<Value>,
) -> Result<Vec<OptimizationRun>> {
    tracing::info!(cores, runs = param_sets.len(), "Configuring Rayon thread pool.");
    let pool = ThreadPoolBuilder::new()
        .num_threads(cores.max(1) as usize)
        .build()
        .context("Failed to build Rayon thread pool")?;

    let runs = pool.install(|| {
        param_sets
            .into_par_iter()
            .filter_map(|parameters| {
                let mut config = base.clone();
                config.strategy = StrategyConfig::new(strategy, parameters.clone());
                let result = Backtester::from_config(&config, settings.clone())
                    .and_then(|runner| runner.run(&data.inputs(&config)));
                match result {
                    Ok(result) => Some(OptimizationRun {
                        parameters,
                        report: result.report,
                    }),
                    Err(e) => {
                        tracing::error!(%parameters, error = %e, "A single backtest run failed.");
                        None
                    }
                }
            })
            .collect()
    });
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(text: &str) -> OptimizerConfig {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn integer_and_float_ranges_expand_into_a_grid() {
        let cfg = config(
            r#"
            [job]
            name = "st-sweep"
            bot = "BTCUSDT_1h_supertrend"
            strategy_to_optimize = "supertrend"
            coarse = "data/BTCUSDT_1h.csv"
            fine = "data/BTCUSDT_1m.csv"

            [supertrend_params]
            period = { start = 10, end = 14, step = 2 }
            multiplier = { start = 2.0, end = 3.0, step = 0.5 }
            "#,
        );

        let sets = generate_parameter_sets(&cfg).unwrap();

        assert_eq!(sets.len(), 9);
        let periods: Vec<i64> = sets.iter().filter_map(|s| s["period"].as_integer()).unique().collect();
        assert_eq!(periods, vec![10, 12, 14]);
        let multipliers: Vec<f64> = sets.iter().filter_map(|s| s["multiplier"].as_float()).collect();
        assert!(multipliers.contains(&2.5));
        assert_eq!(cfg.job.min_trades, 30);
    }

    #[test]
    fn missing_parameter_table_is_an_error() {
        let cfg = config(
            r#"
            [job]
            name = "x"
            bot = "0"
            strategy_to_optimize = "ma_crossover"
            coarse = "a.csv"
            fine = "b.csv"
            "#,
        );
        let err = generate_parameter_sets(&cfg).unwrap_err();
        assert!(err.to_string().contains("ma_crossover_params"));
    }

    #[test]
    fn fixed_values_pass_through() {
        let fixed = Value::Integer(7);
        assert_eq!(expand_value("k", &fixed).unwrap(), vec![fixed]);
        let bad = toml::from_str::<Value>("r = { start = 1, end = 3, step = 0 }").unwrap();
        assert!(expand_value("r", &bad["r"]).is_err());
    }
}
