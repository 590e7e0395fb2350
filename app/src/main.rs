// In app/src/main.rs

mod analyzer;
mod data_loader;
mod optimizer;
mod paper_feed;
mod tracing_layer;

use crate::analyzer::{rank_results, RankedReport};
use crate::data_loader::{write_trades_csv, MarketData};
use crate::optimizer::{generate_parameter_sets, load_optimizer_config, run_optimization};
use crate::paper_feed::PaperFeed;
use crate::tracing_layer::EventBroadcastLayer;
use analytics::AnalyticsEngine;
use anyhow::{Context, Result};
use app_config::{LiveConfig, Settings};
use backtester::{BacktestSettings, Backtester};
use clap::{Parser, Subcommand};
use core_types::BotConfig;
use engine::{BotServices, Engine, MarketDataCache};
use events::{BroadcastNotifier, EngineEvent, InMemoryTradeRecorder};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task;
use tracing_subscriber::prelude::*;

// --- Command-Line Interface Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = "A position lifecycle orchestrator for directional trading bots.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs every enabled bot in live.toml against a recorded paper feed.
    Run {
        /// Directory holding `{symbol}_{interval}.csv` recordings.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Delay between replayed events, in milliseconds.
        #[arg(long, default_value_t = 0)]
        pace_ms: u64,
    },

    /// Runs a historical backtest of one bot from live.toml.
    Backtest {
        /// The bot id (e.g. "BTCUSDT_1h_supertrend") or its index in live.toml.
        #[arg(short, long)]
        bot: String,

        /// Klines on the bot's own interval.
        #[arg(long)]
        coarse: PathBuf,

        /// Klines on the bot's fine (exit-fidelity) interval.
        #[arg(long)]
        fine: PathBuf,

        /// Optional higher-timeframe klines.
        #[arg(long)]
        htf: Option<PathBuf>,

        /// Writes the trade log as CSV.
        #[arg(long)]
        trades_out: Option<PathBuf>,

        /// Prints the report as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Runs a full parameter optimization job.
    Optimize {
        #[arg(long, default_value = "config/optimizer.toml")]
        config: PathBuf,
    },
}

// --- Main Application Entry Point ---

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from a .env file, if it exists.
    dotenvy::dotenv().ok();

    // --- Event channel and Tracing Setup ---
    let (event_tx, _) = broadcast::channel::<EngineEvent>(1024);
    let default_level = app_config::load_settings()
        .ok()
        .and_then(|s| s.app.log_level.parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::INFO);
    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(
        tracing_subscriber::filter::Targets::new()
            .with_target("backtester", tracing::Level::INFO)
            .with_default(default_level),
    );
    let event_layer = EventBroadcastLayer::new(event_tx.clone()).with_filter(
        tracing_subscriber::filter::Targets::new().with_default(tracing::Level::INFO),
    );
    tracing_subscriber::registry().with(fmt_layer).with(event_layer).init();

    // Parse command-line arguments.
    let cli = Cli::parse();

    tracing::info!("Starting application.");

    match cli.command {
        Commands::Run { data_dir, pace_ms } => {
            run_app(data_dir, Duration::from_millis(pace_ms), event_tx).await?;
        }
        Commands::Backtest {
            bot,
            coarse,
            fine,
            htf,
            trades_out,
            json,
        } => {
            handle_backtest(&bot, MarketFiles { coarse, fine, htf }, trades_out, json).await?;
        }
        Commands::Optimize { config } => {
            handle_optimize(config).await?;
        }
    }

    tracing::info!("Application has finished successfully.");
    Ok(())
}

struct MarketFiles {
    coarse: PathBuf,
    fine: PathBuf,
    htf: Option<PathBuf>,
}

/// Finds a bot by id, or by its position in live.toml.
fn find_bot<'a>(live: &'a LiveConfig, selector: &str) -> Result<&'a BotConfig> {
    if let Some(entry) = live.bots.iter().find(|b| b.config.bot_id() == selector) {
        return Ok(&entry.config);
    }
    selector
        .parse::<usize>()
        .ok()
        .and_then(|i| live.bots.get(i))
        .map(|entry| &entry.config)
        .ok_or_else(|| {
            let ids: Vec<String> = live.bots.iter().map(|b| b.config.bot_id()).collect();
            anyhow::anyhow!("No bot '{}' in live.toml. Known bots: {:?}", selector, ids)
        })
}

fn backtest_settings(settings: &Settings) -> BacktestSettings {
    BacktestSettings {
        warmup_bars: settings.backtest.warmup_bars,
        slippage_percent: settings.simulation.slippage_percent,
        initial_equity: settings.backtest.initial_equity,
    }
}

// --- "Run" Subcommand Logic ---

/// Runs every enabled bot until the paper feed is exhausted or Ctrl-C.
async fn run_app(data_dir: PathBuf, pace: Duration, event_tx: broadcast::Sender<EngineEvent>) -> Result<()> {
    let settings = app_config::load_settings()?;
    tracing::info!(environment = %settings.app.environment, "Application settings loaded successfully.");
    let live_config = app_config::load_live_config()?;
    let initial_capital: rust_decimal::Decimal = live_config.enabled().map(|b| b.allocated_capital).sum();

    let notifier = BroadcastNotifier::from_sender(event_tx);
    let recorder = InMemoryTradeRecorder::new();
    let services = BotServices {
        notifier: Arc::new(notifier.clone()),
        recorder: Arc::new(recorder.clone()),
        cache: MarketDataCache::new(),
    };

    // Engine events other than log lines are echoed as JSON.
    let mut rx = notifier.subscribe();
    let event_printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(EngineEvent::Log(_)) => {}
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => println!("{}", json),
                    Err(e) => tracing::warn!(error = %e, "Unprintable engine event."),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event printer lagged.");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let trading_engine = Engine::new(
        live_config,
        settings.engine.clone(),
        Engine::simulated_executors(settings.simulation.clone()),
        services,
    );
    let running = trading_engine
        .start(Box::new(PaperFeed::new(data_dir, pace)))
        .await?;

    let handles = running.handles().to_vec();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received. Stopping all bots.");
            for handle in &handles {
                let _ = handle.stop().await;
            }
        }
    });

    let statuses = running.join().await?;
    event_printer.abort();

    for status in &statuses {
        tracing::info!(bot_id = %status.bot_id, state = %status.state, "Final bot state.");
    }
    let trades = recorder.trades();
    let report = AnalyticsEngine::new().calculate(initial_capital, &trades, &[]);
    backtester::print_report(&report);
    Ok(())
}

// --- "Backtest" Subcommand Logic ---

/// Handles the logic for the `backtest` subcommand.
async fn handle_backtest(selector: &str, files: MarketFiles, trades_out: Option<PathBuf>, json: bool) -> Result<()> {
    let settings = app_config::load_settings()?;
    let live_config = app_config::load_live_config()?;
    let config = find_bot(&live_config, selector)?.clone();
    config.validate()?;

    tracing::info!(bot_id = %config.bot_id(), "Loading historical data for backtest...");
    let data = MarketData::load(&files.coarse, &files.fine, files.htf.as_deref())?;
    tracing::info!(coarse = data.coarse.len(), fine = data.fine.len(), "Historical data loaded.");

    let replay_settings = backtest_settings(&settings);
    // Replays are CPU-bound.
    let result = task::spawn_blocking(move || {
        let runner = Backtester::from_config(&config, replay_settings)?;
        runner.run(&data.inputs(&config))
    })
    .await??;

    if let Some(path) = trades_out {
        write_trades_csv(&path, &result.trades)?;
        tracing::info!(path = %path.display(), trades = result.trades.len(), "Trade log written.");
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&result.report)?);
    } else {
        backtester::print_report(&result.report);
    }
    Ok(())
}

// --- "Optimize" Subcommand Logic ---

/// Handles the logic for the `optimize` subcommand.
async fn handle_optimize(path: PathBuf) -> Result<()> {
    let start_time = Instant::now();
    tracing::info!("Starting optimization job...");

    let optimizer_config = load_optimizer_config(&path)?;
    let settings = app_config::load_settings()?;
    let live_config = app_config::load_live_config()?;
    let base = find_bot(&live_config, &optimizer_config.job.bot)?.clone();

    let param_sets = generate_parameter_sets(&optimizer_config)?;
    if param_sets.is_empty() {
        anyhow::bail!("No valid parameter sets were generated.");
    }
    let job = optimizer_config.job;
    tracing::info!(job = %job.name, sets = param_sets.len(), "Starting optimization.");

    let data = MarketData::load(&job.coarse, &job.fine, job.htf.as_deref())
        .context("Failed to load optimizer market data")?;
    let replay_settings = backtest_settings(&settings);
    let cores = settings.app.optimizer_cores;
    let strategy = job.strategy_to_optimize.clone();

    // The heavy, parallel work runs on a blocking thread.
    let runs = task::spawn_blocking(move || {
        run_optimization(cores, &base, &data, &replay_settings, &strategy, param_sets)
    })
    .await??;

    let ranked_results = rank_results(runs, job.min_trades);
    print_optimization_report(&ranked_results);

    tracing::info!(duration = ?start_time.elapsed(), "Optimization job and analysis finished.");
    Ok(())
}

/// Helper function to print the final optimization summary.
fn print_optimization_report(results: &[RankedReport]) {
    println!("\n--- Optimization Job Complete ---");
    println!("---------------------------------");
    println!("Top 5 Parameter Sets by Score:");
    println!("---------------------------------");

    for (i, ranked_report) in results.iter().take(5).enumerate() {
        println!("\n[Rank {} | Score: {:.2}]", i + 1, ranked_report.score);
        println!("  - Parameters: {}", ranked_report.run.parameters);

        let report = &ranked_report.run.report;
        println!(
            "  - P&L: ${:.2} ({:.2}%) | Max Drawdown: {:.2}% | Sharpe: {:.2} | Trades: {}",
            report.net_pnl_absolute,
            report.net_pnl_percentage,
            report.max_drawdown_percentage,
            report.sharpe_ratio,
            report.total_trades
        );
    }
    println!("\n---------------------------------");

    if let Some(best) = results.first() {
        println!("Recommendation: The parameter set with the highest score is:");
        println!("  {}", best.run.parameters);
    } else {
        println!("Recommendation: No parameter sets passed the minimum threshold.");
    }
}
