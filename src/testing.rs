//! Synthetic price histories shared by the unit tests.

use chrono::{Duration, NaiveDate};

use crate::config::ForecastConfig;
use crate::types::{PriceRecord, TimeSeriesFrame};

pub const OHLCV: [&str; 6] = ["Open", "High", "Low", "Close", "Adj Close", "Volume"];

pub fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()
}

/// Daily bars with a linear upward trend plus deterministic noise
pub fn trending_frame(rows: usize) -> TimeSeriesFrame {
    frame_with_columns(rows, &OHLCV)
}

/// Same series restricted to the named columns (which must come from `OHLCV`)
pub fn frame_with_columns(rows: usize, columns: &[&str]) -> TimeSeriesFrame {
    let records = (0..rows)
        .map(|i| {
            let bar = bar(i);
            let values: Vec<f64> = columns
                .iter()
                .map(|c| {
                    let j = OHLCV.iter().position(|name| name == c).unwrap();
                    bar[j]
                })
                .collect();
            PriceRecord::complete(start_date() + Duration::days(i as i64), &values)
        })
        .collect();
    TimeSeriesFrame::new(columns.iter().map(|c| c.to_string()).collect(), records).unwrap()
}

fn bar(i: usize) -> [f64; 6] {
    let t = i as f64;
    let noise = 0.3 * (t * 1.7).sin() + 0.1 * (t * 0.45).cos();
    let close = 10.0 + 0.05 * t + noise;
    let open = close - 0.1 + 0.05 * t.cos();
    let high = close.max(open) + 0.2 + 0.05 * (t * 0.9).sin().abs();
    let low = close.min(open) - 0.2 - 0.05 * (t * 1.3).cos().abs();
    let volume = 1_000_000.0 + 50_000.0 * (t * 0.3).sin() + 1_000.0 * t;
    [open, high, low, close, close * 0.98, volume]
}

/// Defaults with a small LSTM so tests stay fast
pub fn quick_config() -> ForecastConfig {
    let mut config = ForecastConfig::default();
    config.lstm.units = 8;
    config.lstm.epochs = 5;
    config.lstm.batch_size = 16;
    config
}
