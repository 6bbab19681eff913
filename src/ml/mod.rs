pub mod preprocessing;
pub mod selection;
pub mod metrics;
pub mod validation;
pub mod svr;
pub mod lstm;
pub mod ensemble;

use ndarray::{Array1, Array2};

use crate::error::Result;

pub use ensemble::{Ensembler, Score};
pub use lstm::{SequenceRegressor, TrainingHistory};
pub use preprocessing::{clean, normalize, MinMaxScaler, NormalizedFrame, Split};
pub use selection::{FeatureSelection, FeatureSelector, FeatureSet};
pub use svr::{KernelRegressor, SvrParams};

/// A regressor the ensembler can combine: fit on a feature matrix, then
/// produce one prediction per row.
pub trait Predictor: Send {
    fn name(&self) -> &str;

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}
