use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::info;

use super::{csv_history::parse_history_csv, PriceSource};
use crate::types::TimeSeriesFrame;

/// Reads a previously downloaded history CSV. The ticker is only used for
/// logging; the file is assumed to hold that instrument.
#[derive(Debug, Clone)]
pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PriceSource for CsvFileSource {
    async fn fetch(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<TimeSeriesFrame> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("cannot read {}", self.path.display()))?;
        let frame = parse_history_csv(bytes.as_slice())
            .with_context(|| format!("unparseable history in {}", self.path.display()))?;
        let window = frame.window(start, end);

        info!(
            "Loaded {} of {} records for {} from {}",
            window.len(),
            frame.len(),
            ticker,
            self.path.display()
        );
        Ok(window)
    }

    fn name(&self) -> &str {
        "csv-file"
    }
}
