use chrono::NaiveDate;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::selection::FeatureSet;
use crate::error::{ForecastError, Result};
use crate::types::TimeSeriesFrame;

/// Drops every record holding a missing or non-finite value.
/// Dates travel with their record, so row alignment survives.
pub fn clean(frame: &TimeSeriesFrame) -> TimeSeriesFrame {
    let cleaned = frame.retain_records(|r| r.is_complete());
    let dropped = frame.len() - cleaned.len();
    if dropped > 0 {
        warn!("Cleaning dropped {} of {} records with missing values", dropped, frame.len());
    } else {
        debug!("Cleaning kept all {} records", frame.len());
    }
    cleaned
}

/// Per-column min-max scaler fitted on one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinMaxScaler {
    columns: Vec<String>,
    mins: Vec<f64>,
    maxs: Vec<f64>,
}

impl MinMaxScaler {
    pub fn fit(columns: &[String], values: &Array2<f64>) -> Result<Self> {
        if values.ncols() != columns.len() {
            return Err(ForecastError::Configuration(format!(
                "scaler got {} columns of data for {} names",
                values.ncols(),
                columns.len()
            )));
        }
        if values.nrows() == 0 {
            return Err(ForecastError::InsufficientData(
                "cannot fit a scaler on zero rows".to_string(),
            ));
        }

        let mins = values
            .axis_iter(Axis(1))
            .map(|col| col.iter().cloned().fold(f64::INFINITY, f64::min))
            .collect();
        let maxs = values
            .axis_iter(Axis(1))
            .map(|col| col.iter().cloned().fold(f64::NEG_INFINITY, f64::max))
            .collect();

        Ok(Self {
            columns: columns.to_vec(),
            mins,
            maxs,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn min(&self, column: &str) -> Option<f64> {
        self.index(column).map(|j| self.mins[j])
    }

    pub fn max(&self, column: &str) -> Option<f64> {
        self.index(column).map(|j| self.maxs[j])
    }

    fn index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Constant columns get range 1 so they map to 0
    fn range(&self, j: usize) -> f64 {
        let range = self.maxs[j] - self.mins[j];
        if range == 0.0 {
            1.0
        } else {
            range
        }
    }

    pub fn transform(&self, values: &Array2<f64>) -> Result<Array2<f64>> {
        if values.ncols() != self.columns.len() {
            return Err(ForecastError::Configuration(format!(
                "scaler fitted on {} columns, got {}",
                self.columns.len(),
                values.ncols()
            )));
        }
        let mut scaled = values.clone();
        for (j, mut col) in scaled.axis_iter_mut(Axis(1)).enumerate() {
            let (min, range) = (self.mins[j], self.range(j));
            col.mapv_inplace(|v| (v - min) / range);
        }
        Ok(scaled)
    }

    /// Maps normalized values of one column back into its original units
    pub fn inverse_transform_column(&self, column: &str, values: &Array1<f64>) -> Result<Array1<f64>> {
        let j = self.index(column).ok_or_else(|| {
            ForecastError::Configuration(format!("scaler has no column '{}'", column))
        })?;
        let (min, range) = (self.mins[j], self.range(j));
        Ok(values.mapv(|v| v * range + min))
    }
}

/// Cleaned frame with every value column scaled into [0, 1].
#[derive(Debug, Clone)]
pub struct NormalizedFrame {
    pub dates: Vec<NaiveDate>,
    pub columns: Vec<String>,
    pub values: Array2<f64>,
    pub scaler: MinMaxScaler,
}

impl NormalizedFrame {
    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| ForecastError::Configuration(format!("unknown column '{}'", name)))
    }

    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        let j = self.column_index(name)?;
        Ok(self.values.column(j))
    }

    /// Copies the named columns, in the given order, into a new matrix
    pub fn select(&self, names: &[String]) -> Result<Array2<f64>> {
        let indices = names
            .iter()
            .map(|n| self.column_index(n))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.values.select(Axis(1), &indices))
    }
}

/// Min-max scales every value column of a cleaned frame.
pub fn normalize(frame: &TimeSeriesFrame) -> Result<NormalizedFrame> {
    if frame.is_empty() {
        return Err(ForecastError::InsufficientData(
            "no records left to normalize".to_string(),
        ));
    }

    let n_rows = frame.len();
    let n_cols = frame.columns().len();
    let mut raw = Array2::<f64>::zeros((n_rows, n_cols));
    for (i, record) in frame.records().iter().enumerate() {
        for (j, value) in record.values.iter().enumerate() {
            raw[[i, j]] = value.filter(|v| v.is_finite()).ok_or_else(|| {
                ForecastError::Configuration(format!(
                    "normalize needs a cleaned frame, found a gap at {} / {}",
                    record.date,
                    frame.columns()[j]
                ))
            })?;
        }
    }

    let scaler = MinMaxScaler::fit(frame.columns(), &raw)?;
    let values = scaler.transform(&raw)?;
    debug!("Normalized {} rows x {} columns", n_rows, n_cols);

    Ok(NormalizedFrame {
        dates: frame.dates(),
        columns: frame.columns().to_vec(),
        values,
        scaler,
    })
}

/// Chronological train/test partition. Never shuffled.
#[derive(Debug, Clone)]
pub struct Split {
    pub train_x: Array2<f64>,
    pub train_y: Array1<f64>,
    pub test_x: Array2<f64>,
    pub test_y: Array1<f64>,
    pub train_dates: Vec<NaiveDate>,
    pub test_dates: Vec<NaiveDate>,
}

impl Split {
    /// The first `floor(rows * train_ratio)` rows train, the rest test
    pub fn chronological(frame: &NormalizedFrame, features: &FeatureSet, train_ratio: f64) -> Result<Self> {
        let n = frame.len();
        let train_size = (n as f64 * train_ratio).floor() as usize;
        if train_size == 0 || train_size >= n {
            return Err(ForecastError::InsufficientData(format!(
                "{} rows cannot be split {:.0}/{:.0} into non-empty train and test segments",
                n,
                train_ratio * 100.0,
                (1.0 - train_ratio) * 100.0
            )));
        }

        let x = frame.select(&features.columns)?;
        let y = frame.column(&features.target)?.to_owned();

        let split = Self {
            train_x: x.slice(ndarray::s![..train_size, ..]).to_owned(),
            train_y: y.slice(ndarray::s![..train_size]).to_owned(),
            test_x: x.slice(ndarray::s![train_size.., ..]).to_owned(),
            test_y: y.slice(ndarray::s![train_size..]).to_owned(),
            train_dates: frame.dates[..train_size].to_vec(),
            test_dates: frame.dates[train_size..].to_vec(),
        };

        info!(
            "Split {} rows: {} train ({} .. {}), {} test",
            n,
            split.train_len(),
            split.train_dates.first().map(|d| d.to_string()).unwrap_or_default(),
            split.train_dates.last().map(|d| d.to_string()).unwrap_or_default(),
            split.test_len()
        );
        Ok(split)
    }

    pub fn train_len(&self) -> usize {
        self.train_x.nrows()
    }

    pub fn test_len(&self) -> usize {
        self.test_x.nrows()
    }
}
