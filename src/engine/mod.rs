pub mod pipeline;
pub mod results;

pub use pipeline::{forecast, ForecastPipeline};
pub use results::{ForecastResult, MetricSet, PredictionBundle};
