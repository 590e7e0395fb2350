// In crates/backtester/tests/replay.rs

use backtester::{BacktestInputs, BacktestSettings, Backtester, Error};
use core_types::{BotConfig, ExitReason, Kline, Side, Signal};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Mutex;
use strategies::Strategy;

const HOUR: i64 = 3_600_000;
const QUARTER: i64 = 900_000;

// --- Test strategies ---

/// Buys once, on the close of the bar opening at `n` hours.
struct BuyAt(i64);

impl Strategy for BuyAt {
    fn name(&self) -> &'static str {
        "buy_at"
    }
    fn warmup_bars(&self) -> usize {
        1
    }
    fn evaluate(&self, klines: &[Kline], _: &BotConfig, _: Option<&[Kline]>) -> Signal {
        match klines.last() {
            Some(k) if k.open_time == self.0 * HOUR => Signal::buy(vec!["scheduled".into()]),
            _ => Signal::hold(),
        }
    }
    fn bias(&self, _: &[Kline], _: &BotConfig, _: Option<&[Kline]>) -> Option<Side> {
        Some(Side::Long)
    }
    fn native_stop(&self, _: Side, _: Decimal, _: &[Kline]) -> Option<Decimal> {
        None
    }
}

/// Never trades; records how much HTF history each decision could see.
#[derive(Default)]
struct HtfRecorder {
    seen: Mutex<Vec<(i64, Option<usize>, Option<i64>)>>,
}

impl Strategy for HtfRecorder {
    fn name(&self) -> &'static str {
        "htf_recorder"
    }
    fn warmup_bars(&self) -> usize {
        1
    }
    fn evaluate(&self, klines: &[Kline], _: &BotConfig, htf: Option<&[Kline]>) -> Signal {
        let decided = klines.last().map_or(0, |k| k.close_time);
        let last_htf = htf.and_then(|h| h.last()).map(|k| k.close_time);
        self.seen.lock().unwrap().push((decided, htf.map(|h| h.len()), last_htf));
        Signal::hold()
    }
    fn bias(&self, _: &[Kline], _: &BotConfig, _: Option<&[Kline]>) -> Option<Side> {
        None
    }
    fn native_stop(&self, _: Side, _: Decimal, _: &[Kline]) -> Option<Decimal> {
        None
    }
}

// --- Fixtures ---

/// Stop 10% below a 100 entry, target at 1.5R, no fees, no trailing.
fn config(extra: &str) -> BotConfig {
    toml::from_str(&format!(
        r#"
        symbol = "BTCUSDT"
        interval = "1h"
        allocated_capital = 1000.0
        fee_rate = 0.0

        [strategy]
        name = "buy_at"

        [features]
        invalidation_recheck = false
        universal_profit_trail = false
        {extra}

        [risk]
        max_loss_fraction = 0.1
        min_stop_distance_pct = 0.1
        reward_multiple = 1.5

        [lifecycle]
        cooldown_bars = 2
        fine_interval = "15m"
        "#
    ))
    .unwrap()
}

fn kline(open_time: i64, span: i64, o: Decimal, h: Decimal, l: Decimal, c: Decimal) -> Kline {
    Kline {
        open_time,
        open: o,
        high: h,
        low: l,
        close: c,
        volume: dec!(10),
        close_time: open_time + span - 1,
        is_final: true,
    }
}

fn hour(i: i64, o: Decimal, h: Decimal, l: Decimal, c: Decimal) -> Kline {
    kline(i * HOUR, HOUR, o, h, l, c)
}

fn flat_hour(i: i64) -> Kline {
    hour(i, dec!(100), dec!(100.5), dec!(99.5), dec!(100))
}

/// The `q`-th quarter of hour `i`.
fn quarter(i: i64, q: i64, o: Decimal, h: Decimal, l: Decimal, c: Decimal) -> Kline {
    kline(i * HOUR + q * QUARTER, QUARTER, o, h, l, c)
}

fn settings() -> BacktestSettings {
    BacktestSettings {
        warmup_bars: 1,
        ..Default::default()
    }
}

fn replay(strategy: impl Strategy + 'static, cfg: &BotConfig, coarse: &[Kline], fine: &[Kline]) -> backtester::BacktestResult {
    Backtester::new(Box::new(strategy), settings())
        .run(&BacktestInputs {
            config: cfg,
            coarse,
            fine,
            htf: None,
        })
        .unwrap()
}

// --- Exits ---

#[test]
fn stop_wins_when_one_fine_bar_spans_both_levels() {
    let cfg = config("");
    let coarse: Vec<Kline> = (0..4).map(flat_hour).collect();
    let fine = vec![
        quarter(2, 0, dec!(100), dec!(101), dec!(99), dec!(100)),
        quarter(2, 1, dec!(100), dec!(115), dec!(90), dec!(100)),
        quarter(2, 2, dec!(100), dec!(100.5), dec!(99.5), dec!(100)),
        quarter(2, 3, dec!(100), dec!(100.5), dec!(99.5), dec!(100)),
    ];

    let result = replay(BuyAt(1), &cfg, &coarse, &fine);

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.side, Side::Long);
    assert_eq!(trade.entry_price, dec!(100));
    assert_eq!(trade.entry_time, 2 * HOUR);
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert_eq!(trade.exit_price, dec!(90));
    assert_eq!(trade.exit_time, 2 * HOUR + 2 * QUARTER - 1);
    assert_eq!(trade.net_pnl, dec!(-100));
}

#[test]
fn gap_through_the_stop_fills_at_the_open() {
    let cfg = config("");
    let coarse: Vec<Kline> = (0..4).map(flat_hour).collect();
    let fine = vec![
        quarter(2, 0, dec!(100), dec!(101), dec!(99), dec!(100)),
        quarter(2, 1, dec!(85), dec!(86), dec!(84), dec!(85)),
    ];

    let result = replay(BuyAt(1), &cfg, &coarse, &fine);

    let trade = &result.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert_eq!(trade.exit_price, dec!(85));
    assert_eq!(trade.net_pnl, dec!(-150));
}

#[test]
fn target_is_taken_at_its_level() {
    let cfg = config("");
    let coarse: Vec<Kline> = (0..4).map(flat_hour).collect();
    let fine = vec![quarter(2, 0, dec!(100), dec!(116), dec!(99.5), dec!(112))];

    let result = replay(BuyAt(1), &cfg, &coarse, &fine);

    let trade = &result.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
    assert_eq!(trade.exit_price, dec!(115));
    assert_eq!(trade.net_pnl, dec!(150));
    assert_eq!(result.report.wins, 1);
}

#[test]
fn missing_fine_bars_fall_back_to_the_coarse_bar() {
    let cfg = config("");
    let mut coarse: Vec<Kline> = (0..5).map(flat_hour).collect();
    coarse[2] = hour(2, dec!(100), dec!(101), dec!(89), dec!(95));

    let result = replay(BuyAt(1), &cfg, &coarse, &[]);

    let trade = &result.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert_eq!(trade.exit_price, dec!(90));
    assert_eq!(trade.exit_time, coarse[2].close_time);
}

#[test]
fn stop_hit_outside_partial_fine_coverage_is_caught_at_the_coarse_close() {
    let cfg = config("");
    let mut coarse: Vec<Kline> = (0..4).map(flat_hour).collect();
    coarse[2] = hour(2, dec!(100), dec!(100.5), dec!(85), dec!(95));
    // Only the first quarter of hour 2 has fine data, and it never reaches the stop.
    let fine = vec![quarter(2, 0, dec!(100), dec!(100.5), dec!(99.5), dec!(100))];

    let result = replay(BuyAt(1), &cfg, &coarse, &fine);

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert_eq!(trade.exit_price, dec!(90));
    assert_eq!(trade.exit_time, coarse[2].close_time);
    assert_eq!(trade.net_pnl, dec!(-100));
}

#[test]
fn open_position_is_closed_at_the_end_of_the_replay() {
    let mut cfg = config("");
    cfg.fee_rate = dec!(0.001);
    let coarse: Vec<Kline> = (0..5).map(flat_hour).collect();

    let result = replay(BuyAt(1), &cfg, &coarse, &[]);

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::EndOfReplay);
    assert_eq!(trade.exit_price, dec!(100));
    assert_eq!(trade.exit_time, coarse[4].close_time);
    // Two fills of 1000 notional at 10 bps.
    assert_eq!(trade.net_pnl, dec!(-2));
    assert_eq!(result.equity_curve.len(), 4);
    assert_eq!(result.equity_curve.last().unwrap().value, dec!(998));
}

// --- Entries ---

#[test]
fn entry_fills_at_the_next_open_with_adverse_slippage() {
    let cfg = config("");
    let mut coarse: Vec<Kline> = (0..4).map(flat_hour).collect();
    coarse[2] = hour(2, dec!(101), dec!(101.5), dec!(100.5), dec!(101));
    let settings = BacktestSettings {
        warmup_bars: 1,
        slippage_percent: dec!(0.001),
        initial_equity: None,
    };

    let result = Backtester::new(Box::new(BuyAt(1)), settings)
        .run(&BacktestInputs {
            config: &cfg,
            coarse: &coarse,
            fine: &[],
            htf: None,
        })
        .unwrap();

    let trade = &result.trades[0];
    assert_eq!(trade.entry_time, 2 * HOUR);
    assert_eq!(trade.entry_price, dec!(101.11));
    assert_eq!(trade.exit_reason, ExitReason::EndOfReplay);
    assert_eq!(trade.slippage, Decimal::ZERO);
}

#[test]
fn decisions_only_see_closed_higher_timeframe_bars() {
    let cfg = config(
        r#"htf_confirmation = true
        htf_interval = "4h""#,
    );
    let coarse: Vec<Kline> = (0..12).map(flat_hour).collect();
    let htf: Vec<Kline> = (0..3)
        .map(|i| kline(i * 4 * HOUR, 4 * HOUR, dec!(100), dec!(100.5), dec!(99.5), dec!(100)))
        .collect();
    let recorder = std::sync::Arc::new(HtfRecorder::default());

    struct Shared(std::sync::Arc<HtfRecorder>);
    impl Strategy for Shared {
        fn name(&self) -> &'static str {
            self.0.name()
        }
        fn warmup_bars(&self) -> usize {
            self.0.warmup_bars()
        }
        fn evaluate(&self, k: &[Kline], c: &BotConfig, h: Option<&[Kline]>) -> Signal {
            self.0.evaluate(k, c, h)
        }
        fn bias(&self, k: &[Kline], c: &BotConfig, h: Option<&[Kline]>) -> Option<Side> {
            self.0.bias(k, c, h)
        }
        fn native_stop(&self, s: Side, e: Decimal, k: &[Kline]) -> Option<Decimal> {
            self.0.native_stop(s, e, k)
        }
    }

    Backtester::new(Box::new(Shared(recorder.clone())), settings())
        .run(&BacktestInputs {
            config: &cfg,
            coarse: &coarse,
            fine: &[],
            htf: Some(&htf),
        })
        .unwrap();

    let seen = recorder.seen.lock().unwrap();
    assert_eq!(seen.len(), 11);
    for (i, (decided, visible, last_htf)) in seen.iter().enumerate() {
        // Decision on hour `i`, which closes at (i + 1) hours.
        assert_eq!(*visible, Some((i + 1) / 4));
        if let Some(last) = last_htf {
            assert!(last <= decided);
        }
    }
}

// --- Input validation ---

#[test]
fn short_or_unordered_series_are_refused() {
    let cfg = config("");
    let coarse = vec![flat_hour(0)];
    let err = Backtester::new(Box::new(BuyAt(0)), settings())
        .run(&BacktestInputs {
            config: &cfg,
            coarse: &coarse,
            fine: &[],
            htf: None,
        })
        .unwrap_err();
    assert!(matches!(err, Error::NotEnoughData { have: 1, warmup: 1 }));

    let coarse = vec![flat_hour(1), flat_hour(0), flat_hour(2)];
    let err = Backtester::new(Box::new(BuyAt(0)), settings())
        .run(&BacktestInputs {
            config: &cfg,
            coarse: &coarse,
            fine: &[],
            htf: None,
        })
        .unwrap_err();
    assert!(matches!(err, Error::Unordered("coarse")));
}

#[test]
fn unknown_strategy_names_fail_to_build() {
    let cfg = config("");
    assert!(matches!(
        Backtester::from_config(&cfg, settings()),
        Err(Error::Strategy(_))
    ));
}
