use chrono::NaiveDate;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::ml::lstm::TrainingHistory;
use crate::ml::svr::{GridCandidate, SvrParams};
use crate::ml::{FeatureSelection, MinMaxScaler, Score};

pub const RECOMMENDATION: &str = "Recommendation: use the combined model for decisions; \
it tends to give more accurate forecasts by drawing on the strengths of both SVM and LSTM.";

/// Test-segment vectors, all indexed like `dates`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionBundle {
    pub dates: Vec<NaiveDate>,
    pub actual: Array1<f64>,
    pub kernel: Array1<f64>,
    pub sequence: Array1<f64>,
    pub ensemble: Array1<f64>,
}

impl PredictionBundle {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Maps every vector from [0, 1] back into the units of `target`
    pub fn in_price_units(&self, scaler: &MinMaxScaler, target: &str) -> Result<Self> {
        Ok(Self {
            dates: self.dates.clone(),
            actual: scaler.inverse_transform_column(target, &self.actual)?,
            kernel: scaler.inverse_transform_column(target, &self.kernel)?,
            sequence: scaler.inverse_transform_column(target, &self.sequence)?,
            ensemble: scaler.inverse_transform_column(target, &self.ensemble)?,
        })
    }
}

/// MAPE and RMSE for each prediction vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub kernel: Score,
    pub sequence: Score,
    pub ensemble: Score,
}

impl MetricSet {
    pub fn values(&self) -> [f64; 6] {
        [
            self.kernel.mape,
            self.sequence.mape,
            self.ensemble.mape,
            self.kernel.rmse,
            self.sequence.rmse,
            self.ensemble.rmse,
        ]
    }

    pub fn is_valid(&self) -> bool {
        self.kernel.is_valid() && self.sequence.is_valid() && self.ensemble.is_valid()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvrSummary {
    pub params: SvrParams,
    pub grid: Vec<GridCandidate>,
    pub support_vectors: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmSummary {
    pub history: TrainingHistory,
    pub final_train_loss: Option<f64>,
    pub final_val_loss: Option<f64>,
}

/// Everything one forecast run produces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResult {
    pub ticker: String,
    pub rows_fetched: usize,
    pub rows_used: usize,
    pub train_rows: usize,
    pub selection: FeatureSelection,
    pub svr: SvrSummary,
    pub lstm: LstmSummary,
    pub scaler: MinMaxScaler,
    pub predictions: PredictionBundle,
    pub metrics: MetricSet,
}

impl ForecastResult {
    pub fn print_summary(&self) {
        println!("{}", self);
    }
}

impl fmt::Display for ForecastResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.metrics;
        writeln!(f, "{}", "=".repeat(72))?;
        writeln!(f, "                     FORECAST: {}", self.ticker)?;
        writeln!(f, "{}", "=".repeat(72))?;
        writeln!(
            f,
            "Rows:               {} fetched, {} complete, {} train / {} test",
            self.rows_fetched,
            self.rows_used,
            self.train_rows,
            self.predictions.len()
        )?;
        writeln!(f, "Features:           {}", self.selection.features.columns.join(", "))?;
        writeln!(
            f,
            "SVM:                C={} gamma={} ({} support vectors)",
            self.svr.params.c, self.svr.params.gamma, self.svr.support_vectors
        )?;
        if let Some(loss) = self.lstm.final_train_loss {
            writeln!(f, "LSTM final loss:    {:.6}", loss)?;
        }
        writeln!(f, "{}", "-".repeat(72))?;
        writeln!(f, "METRICS")?;
        writeln!(f, "  MAPE SVM:           {:.6}", m.kernel.mape)?;
        writeln!(f, "  MAPE LSTM:          {:.6}", m.sequence.mape)?;
        writeln!(f, "  MAPE combined:      {:.6}", m.ensemble.mape)?;
        writeln!(f, "  RMSE SVM:           {:.6}", m.kernel.rmse)?;
        writeln!(f, "  RMSE LSTM:          {:.6}", m.sequence.rmse)?;
        writeln!(f, "  RMSE combined:      {:.6}", m.ensemble.rmse)?;
        writeln!(f, "{}", "-".repeat(72))?;
        writeln!(f, "PREDICTIONS")?;
        writeln!(
            f,
            "  {:<12} {:>12} {:>12} {:>12} {:>12}",
            "Date", "Actual", "SVM", "LSTM", "Combined"
        )?;
        let p = &self.predictions;
        for (i, date) in p.dates.iter().enumerate() {
            writeln!(
                f,
                "  {:<12} {:>12.6} {:>12.6} {:>12.6} {:>12.6}",
                date.to_string(),
                p.actual[i],
                p.kernel[i],
                p.sequence[i],
                p.ensemble[i]
            )?;
        }
        writeln!(f, "{}", "-".repeat(72))?;
        writeln!(f, "{}", RECOMMENDATION)?;
        write!(f, "{}", "=".repeat(72))
    }
}
