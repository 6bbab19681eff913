use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{ForecastError, Result};

/// Header of the date column in downloaded histories
pub const DATE_COLUMN: &str = "Date";

/// One trading day: a date plus the numeric fields in frame column order.
/// `None` marks a missing value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub values: Vec<Option<f64>>,
}

impl PriceRecord {
    pub fn new(date: NaiveDate, values: Vec<Option<f64>>) -> Self {
        Self { date, values }
    }

    pub fn complete(date: NaiveDate, values: &[f64]) -> Self {
        Self {
            date,
            values: values.iter().map(|&v| Some(v)).collect(),
        }
    }

    /// True when every field holds a finite number
    pub fn is_complete(&self) -> bool {
        self.values
            .iter()
            .all(|v| matches!(v, Some(x) if x.is_finite()))
    }
}

/// Daily price history for one instrument.
///
/// Records are sorted by ascending date with no duplicates and every record
/// has one value per column. Transforms produce new frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesFrame {
    columns: Vec<String>,
    records: Vec<PriceRecord>,
}

impl TimeSeriesFrame {
    pub fn new(columns: Vec<String>, records: Vec<PriceRecord>) -> Result<Self> {
        let mut seen = HashSet::new();
        for name in &columns {
            if name == DATE_COLUMN {
                return Err(ForecastError::SourceUnavailable(
                    "date column must not be listed as a value column".to_string(),
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(ForecastError::SourceUnavailable(format!(
                    "duplicate column '{}'",
                    name
                )));
            }
        }

        for (i, record) in records.iter().enumerate() {
            if record.values.len() != columns.len() {
                return Err(ForecastError::SourceUnavailable(format!(
                    "record {} ({}) has {} values, expected {}",
                    i,
                    record.date,
                    record.values.len(),
                    columns.len()
                )));
            }
        }

        for pair in records.windows(2) {
            if pair[0].date >= pair[1].date {
                return Err(ForecastError::SourceUnavailable(format!(
                    "dates not strictly ascending: {} then {}",
                    pair[0].date, pair[1].date
                )));
            }
        }

        Ok(Self { columns, records })
    }

    /// Sorts records by date before validating
    pub fn from_unsorted(columns: Vec<String>, mut records: Vec<PriceRecord>) -> Result<Self> {
        records.sort_by_key(|r| r.date);
        Self::new(columns, records)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[PriceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.records.iter().map(|r| r.date).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column_values(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.column_index(name)?;
        Some(self.records.iter().map(|r| r.values[idx]).collect())
    }

    pub fn missing_count(&self) -> usize {
        self.records.iter().filter(|r| !r.is_complete()).count()
    }

    /// Keeps the records matching `keep`. Order is preserved so the
    /// date invariants still hold.
    pub fn retain_records<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&PriceRecord) -> bool,
    {
        Self {
            columns: self.columns.clone(),
            records: self.records.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Records dated within `[start, end)`
    pub fn window(&self, start: NaiveDate, end: NaiveDate) -> Self {
        self.retain_records(|r| r.date >= start && r.date < end)
    }
}
