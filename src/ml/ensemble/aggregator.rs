use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ForecastError, Result};
use crate::ml::metrics::{mape, rmse};

/// Error of one prediction vector against the ground truth
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// Mean absolute percentage error, as a fraction
    pub mape: f64,
    pub rmse: f64,
}

impl Score {
    pub fn is_valid(&self) -> bool {
        self.mape.is_finite() && self.rmse.is_finite() && self.mape >= 0.0 && self.rmse >= 0.0
    }
}

/// Combines member predictions by elementwise median
pub struct Ensembler;

impl Ensembler {
    /// Per-row median over every member. An even member count averages the
    /// middle pair.
    pub fn combine(members: &[Array1<f64>]) -> Result<Array1<f64>> {
        let first = members
            .first()
            .ok_or_else(|| ForecastError::Configuration("ensemble needs at least one member".to_string()))?;
        let rows = first.len();
        if let Some(bad) = members.iter().find(|m| m.len() != rows) {
            return Err(ForecastError::Configuration(format!(
                "ensemble members disagree on length ({} vs {})",
                rows,
                bad.len()
            )));
        }

        let mut column = Vec::with_capacity(members.len());
        let combined = Array1::from_shape_fn(rows, |i| {
            column.clear();
            column.extend(members.iter().map(|m| m[i]));
            median(&mut column)
        });
        debug!("Ensembled {} members over {} rows", members.len(), rows);
        Ok(combined)
    }

    pub fn score(actual: ArrayView1<f64>, predicted: ArrayView1<f64>) -> Result<Score> {
        if actual.len() != predicted.len() {
            return Err(ForecastError::Configuration(format!(
                "cannot score {} predictions against {} actual values",
                predicted.len(),
                actual.len()
            )));
        }
        Ok(Score {
            mape: mape(actual, predicted),
            rmse: rmse(actual, predicted),
        })
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
