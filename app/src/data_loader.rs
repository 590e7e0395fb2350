// In app/src/data_loader.rs

use anyhow::{Context, Result};
use backtester::BacktestInputs;
use core_types::{BotConfig, Kline, TradeRecord};
use std::path::Path;

/// Reads klines from a CSV file with the header
/// `open_time,open,high,low,close,volume,close_time` (times in unix milliseconds).
pub fn load_klines(path: &Path) -> Result<Vec<Kline>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open kline file {}", path.display()))?;
    let mut klines = Vec::new();
    for (line, row) in reader.deserialize::<Kline>().enumerate() {
        let kline = row.with_context(|| format!("{}: bad kline on row {}", path.display(), line + 1))?;
        klines.push(kline);
    }
    tracing::debug!(path = %path.display(), count = klines.len(), "Loaded klines.");
    Ok(klines)
}

/// The three series of one replay, loaded once and shared by every run.
#[derive(Debug, Clone)]
pub struct MarketData {
    pub coarse: Vec<Kline>,
    pub fine: Vec<Kline>,
    pub htf: Option<Vec<Kline>>,
}

impl MarketData {
    pub fn load(coarse: &Path, fine: &Path, htf: Option<&Path>) -> Result<Self> {
        Ok(Self {
            coarse: load_klines(coarse)?,
            fine: load_klines(fine)?,
            htf: htf.map(load_klines).transpose()?,
        })
    }

    pub fn inputs<'a>(&'a self, config: &'a BotConfig) -> BacktestInputs<'a> {
        BacktestInputs {
            config,
            coarse: &self.coarse,
            fine: &self.fine,
            htf: self.htf.as_deref(),
        }
    }
}

/// Writes the trade log as CSV for external analysis tools.
pub fn write_trades_csv(path: &Path, trades: &[TradeRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    wtr.write_record([
        "position_id",
        "side",
        "entry_time",
        "entry_price",
        "exit_time",
        "exit_price",
        "quantity",
        "gross_pnl",
        "fees",
        "slippage",
        "net_pnl",
        "exit_reason",
        "stop_reason_at_exit",
    ])?;
    for t in trades {
        wtr.write_record([
            t.position_id.to_string(),
            t.side.to_string(),
            t.entry_time.to_string(),
            t.entry_price.to_string(),
            t.exit_time.to_string(),
            t.exit_price.to_string(),
            t.quantity.to_string(),
            t.gross_pnl.to_string(),
            t.fees.to_string(),
            t.slippage.to_string(),
            t.net_pnl.to_string(),
            t.exit_reason.to_string(),
            t.stop_reason_at_exit.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
