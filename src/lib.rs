//! Closing-price forecaster for daily price histories.
//!
//! A run fetches one instrument's history, drops incomplete rows, min-max
//! scales every column, keeps the five columns with the strongest F-test
//! against the close, and splits the rows 80/20 in date order. A grid-searched
//! RBF support vector regressor and a stacked LSTM are trained on the first
//! segment, and their elementwise median is scored on the second.

pub mod config;
pub mod engine;
pub mod error;
pub mod ml;
pub mod source;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{forecast, ForecastPipeline, ForecastResult};
pub use error::{ForecastError, Result};
