use thiserror::Error;

/// Terminal failures of a forecast run. Every stage fails fast into one of these.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// The historical series could not be fetched or parsed
    #[error("price source unavailable: {0}")]
    SourceUnavailable(String),

    /// Too few rows survive cleaning for the configured split/fold/feature sizes
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Invalid or internally inconsistent parameters
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A model failed to fit or produced non-finite output
    #[error("training failure: {0}")]
    TrainingFailure(String),
}

impl ForecastError {
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::SourceUnavailable(_) => "SourceUnavailable",
            ForecastError::InsufficientData(_) => "InsufficientData",
            ForecastError::Configuration(_) => "Configuration",
            ForecastError::TrainingFailure(_) => "TrainingFailure",
        }
    }
}

impl From<ndarray::ShapeError> for ForecastError {
    fn from(e: ndarray::ShapeError) -> Self {
        ForecastError::Configuration(format!("shape mismatch: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;
