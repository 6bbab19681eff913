use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use super::{csv_history::parse_history_csv, PriceSource};
use crate::types::TimeSeriesFrame;

const YAHOO_QUOTES_API: &str = "https://query1.finance.yahoo.com";

/// Daily history downloads from the Yahoo Finance quotes endpoint.
#[derive(Debug, Clone)]
pub struct YahooSource {
    client: Client,
    base_url: String,
}

impl YahooSource {
    pub fn new() -> Result<Self> {
        Self::with_base_url(YAHOO_QUOTES_API)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("price-forecaster/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Download URL for `[start, end)`, both taken at midnight UTC
    pub fn history_url(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> String {
        format!(
            "{}/v7/finance/download/{}?period1={}&period2={}&interval=1d&events=history&includeAdjustedClose=true",
            self.base_url,
            ticker,
            midnight_timestamp(start),
            midnight_timestamp(end)
        )
    }
}

fn midnight_timestamp(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

#[async_trait]
impl PriceSource for YahooSource {
    async fn fetch(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<TimeSeriesFrame> {
        let url = self.history_url(ticker, start, end);
        debug!("GET {}", url);

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("history request for {} failed ({}): {}", ticker, status, body.trim()));
        }

        let body = resp.bytes().await?;
        let frame = parse_history_csv(body.as_ref())
            .with_context(|| format!("unparseable history for {}", ticker))?;

        info!("Fetched {} daily records for {} ({} to {})", frame.len(), ticker, start, end);
        Ok(frame)
    }

    fn name(&self) -> &str {
        "yahoo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_url_uses_midnight_timestamps() {
        let source = YahooSource::with_base_url("https://example.test/").unwrap();
        let url = source.history_url(
            "FSM",
            NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2021, 8, 11).unwrap(),
        );
        assert_eq!(
            url,
            "https://example.test/v7/finance/download/FSM?period1=1609459200&period2=1628640000&interval=1d&events=history&includeAdjustedClose=true"
        );
    }
}
