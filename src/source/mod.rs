pub mod csv_history;
pub mod yahoo;
pub mod file;

pub use csv_history::parse_history_csv;
pub use yahoo::YahooSource;
pub use file::CsvFileSource;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::types::TimeSeriesFrame;

/// Supplies the raw daily history for one instrument over `[start, end)`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<TimeSeriesFrame>;

    fn name(&self) -> &str;
}
