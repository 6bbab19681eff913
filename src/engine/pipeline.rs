use std::sync::Arc;

use chrono::NaiveDate;
use ndarray::Array1;
use tracing::{info, warn};

use super::results::{ForecastResult, LstmSummary, MetricSet, PredictionBundle, SvrSummary};
use crate::config::ForecastConfig;
use crate::error::{ForecastError, Result};
use crate::ml::preprocessing::{clean, normalize, Split};
use crate::ml::{Ensembler, FeatureSelector, KernelRegressor, Predictor, SequenceRegressor};
use crate::source::PriceSource;
use crate::types::TimeSeriesFrame;

/// One-shot forecast over a fetched history. Holds no state between runs.
pub struct ForecastPipeline {
    source: Arc<dyn PriceSource>,
    config: ForecastConfig,
}

impl ForecastPipeline {
    pub fn new(source: Arc<dyn PriceSource>, config: ForecastConfig) -> Self {
        Self { source, config }
    }

    /// Fetches `[start, end)` for `ticker` and runs every stage. Training
    /// happens on the blocking pool.
    pub async fn run(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<ForecastResult> {
        validate_config(&self.config)?;
        if start >= end {
            return Err(ForecastError::Configuration(format!(
                "start date {} must be before end date {}",
                start, end
            )));
        }

        info!("Fetching {} history {} .. {}", ticker, start, end);
        let frame = self
            .source
            .fetch(ticker, start, end)
            .await
            .map_err(|e| ForecastError::SourceUnavailable(format!("{:#}", e)))?;

        let config = self.config.clone();
        let ticker = ticker.to_string();
        tokio::task::spawn_blocking(move || forecast(&config, &ticker, frame))
            .await
            .map_err(|e| ForecastError::TrainingFailure(format!("forecast task aborted: {}", e)))?
    }
}

fn validate_config(config: &ForecastConfig) -> Result<()> {
    config
        .validate()
        .map_err(|errors| ForecastError::Configuration(errors.join("; ")))
}

/// Clean, normalize, select, split, train both regressors, ensemble and score.
pub fn forecast(config: &ForecastConfig, ticker: &str, frame: TimeSeriesFrame) -> Result<ForecastResult> {
    validate_config(config)?;
    let target = config.pipeline.target_column.as_str();
    let rows_fetched = frame.len();

    let cleaned = clean(&frame);
    if cleaned.is_empty() {
        return Err(ForecastError::InsufficientData(format!(
            "none of the {} fetched rows for {} is complete",
            rows_fetched, ticker
        )));
    }
    if cleaned.len() < config.min_rows() {
        return Err(ForecastError::InsufficientData(format!(
            "{} complete rows, {}-fold validation needs at least {}",
            cleaned.len(),
            config.svr.cv_folds,
            config.min_rows()
        )));
    }
    if cleaned.column_index(target).is_none() {
        return Err(ForecastError::Configuration(format!(
            "target column '{}' not in {:?}",
            target,
            cleaned.columns()
        )));
    }

    let normalized = normalize(&cleaned)?;
    let candidates: Vec<String> = normalized
        .columns
        .iter()
        .filter(|c| c.as_str() != target)
        .cloned()
        .collect();
    let selector = FeatureSelector::new(config.pipeline.num_features, config.selection.mi_neighbors);
    let selection = selector.select(
        &normalized.select(&candidates)?,
        &candidates,
        normalized.column(target)?,
        target,
    )?;

    let split = Split::chronological(&normalized, &selection.features, config.pipeline.train_ratio)?;
    if split.train_len() < config.svr.min_training_rows() {
        return Err(ForecastError::InsufficientData(format!(
            "{} training rows, {}-fold validation needs at least {}",
            split.train_len(),
            config.svr.cv_folds,
            config.svr.min_training_rows()
        )));
    }

    let mut kernel = KernelRegressor::new(config.svr.clone());
    let mut sequence = SequenceRegressor::new(config.lstm.clone());
    let (kernel_pred, sequence_pred) = rayon::join(
        || train_and_predict(&mut kernel, &split),
        || train_and_predict(&mut sequence, &split),
    );
    let kernel_pred = kernel_pred?;
    let sequence_pred = sequence_pred?;

    let ensemble_pred = Ensembler::combine(&[kernel_pred.clone(), sequence_pred.clone()])?;
    let actual = split.test_y.view();
    let metrics = MetricSet {
        kernel: Ensembler::score(actual, kernel_pred.view())?,
        sequence: Ensembler::score(actual, sequence_pred.view())?,
        ensemble: Ensembler::score(actual, ensemble_pred.view())?,
    };
    if !metrics.is_valid() {
        return Err(ForecastError::TrainingFailure(format!(
            "non-finite metrics {:?}",
            metrics.values()
        )));
    }
    info!(
        "{}: MAPE svm={:.4} lstm={:.4} combined={:.4}, RMSE svm={:.4} lstm={:.4} combined={:.4}",
        ticker,
        metrics.kernel.mape,
        metrics.sequence.mape,
        metrics.ensemble.mape,
        metrics.kernel.rmse,
        metrics.sequence.rmse,
        metrics.ensemble.rmse
    );

    let svr = match (kernel.best_params(), kernel.model()) {
        (Some(params), Some(model)) => SvrSummary {
            params,
            grid: kernel.search_results().to_vec(),
            support_vectors: model.n_support(),
        },
        _ => {
            return Err(ForecastError::TrainingFailure(
                "SVR finished without a fitted model".to_string(),
            ))
        }
    };
    let history = sequence.history().clone();

    Ok(ForecastResult {
        ticker: ticker.to_string(),
        rows_fetched,
        rows_used: cleaned.len(),
        train_rows: split.train_len(),
        svr,
        lstm: LstmSummary {
            final_train_loss: history.final_train_loss(),
            final_val_loss: history.final_val_loss(),
            history,
        },
        scaler: normalized.scaler.clone(),
        predictions: PredictionBundle {
            dates: split.test_dates.clone(),
            actual: split.test_y.clone(),
            kernel: kernel_pred,
            sequence: sequence_pred,
            ensemble: ensemble_pred,
        },
        metrics,
        selection,
    })
}

fn train_and_predict(model: &mut dyn Predictor, split: &Split) -> Result<Array1<f64>> {
    info!("Training {} on {} rows", model.name(), split.train_len());
    model.fit(&split.train_x, &split.train_y)?;
    let predictions = model.predict(&split.test_x)?;
    if predictions.len() != split.test_len() {
        warn!(
            "{} returned {} predictions for {} test rows",
            model.name(),
            predictions.len(),
            split.test_len()
        );
        return Err(ForecastError::TrainingFailure(format!(
            "{} prediction count mismatch",
            model.name()
        )));
    }
    Ok(predictions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockPriceSource;
    use crate::testing::{frame_with_columns, quick_config, start_date, trending_frame};
    use chrono::Duration;

    #[test]
    fn test_end_to_end_on_trending_series() {
        let result = forecast(&quick_config(), "TEST", trending_frame(100)).unwrap();

        let p = &result.predictions;
        assert_eq!(p.len(), 20);
        assert_eq!(p.kernel.len(), 20);
        assert_eq!(p.sequence.len(), 20);
        assert_eq!(p.ensemble.len(), 20);
        assert_eq!(result.train_rows, 80);

        for value in result.metrics.values() {
            assert!(value.is_finite() && value >= 0.0);
        }
        for i in 0..p.len() {
            let lo = p.kernel[i].min(p.sequence[i]);
            let hi = p.kernel[i].max(p.sequence[i]);
            assert!(p.ensemble[i] >= lo && p.ensemble[i] <= hi);
        }

        assert_eq!(result.selection.features.width(), 5);
        assert!(!result.selection.features.columns.contains(&"Close".to_string()));
        assert_eq!(result.lstm.history.train_loss.len(), 5);
    }

    #[test]
    fn test_training_dates_precede_test_dates() {
        let result = forecast(&quick_config(), "TEST", trending_frame(60)).unwrap();
        let first_test = result.predictions.dates[0];
        assert!(first_test > start_date() + Duration::days(result.train_rows as i64 - 1));
    }

    #[test]
    fn test_too_few_feature_columns_is_configuration() {
        let frame = frame_with_columns(100, &["Open", "High", "Low", "Close", "Volume"]);
        let err = forecast(&quick_config(), "TEST", frame).unwrap_err();
        assert!(matches!(err, ForecastError::Configuration(_)), "{}", err);
    }

    #[test]
    fn test_short_series_is_insufficient_data() {
        let err = forecast(&quick_config(), "TEST", trending_frame(24)).unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientData(_)), "{}", err);
    }

    #[test]
    fn test_short_training_segment_is_insufficient_data() {
        // 30 complete rows pass the row floor but split into 24 training rows
        let err = forecast(&quick_config(), "TEST", trending_frame(30)).unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientData(_)), "{}", err);
    }

    #[test]
    fn test_missing_target_is_configuration() {
        let mut config = quick_config();
        config.pipeline.target_column = "Settle".to_string();
        let err = forecast(&config, "TEST", trending_frame(40)).unwrap_err();
        assert!(matches!(err, ForecastError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_run_maps_fetch_failure() {
        let mut source = MockPriceSource::new();
        source
            .expect_fetch()
            .returning(|_, _, _| Err(anyhow::anyhow!("HTTP 404 Not Found")));

        let pipeline = ForecastPipeline::new(Arc::new(source), quick_config());
        let err = pipeline
            .run("NOPE", start_date(), start_date() + Duration::days(30))
            .await
            .unwrap_err();
        assert!(matches!(err, ForecastError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_run_rejects_inverted_range_without_fetching() {
        let mut source = MockPriceSource::new();
        source.expect_fetch().never();

        let pipeline = ForecastPipeline::new(Arc::new(source), quick_config());
        let err = pipeline
            .run("FSM", start_date(), start_date())
            .await
            .unwrap_err();
        assert!(matches!(err, ForecastError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_run_forecasts_fetched_frame() {
        let mut source = MockPriceSource::new();
        let frame = trending_frame(50);
        source
            .expect_fetch()
            .times(1)
            .returning(move |_, _, _| Ok(frame.clone()));

        let pipeline = ForecastPipeline::new(Arc::new(source), quick_config());
        let result = pipeline
            .run("FSM", start_date(), start_date() + Duration::days(50))
            .await
            .unwrap();
        assert_eq!(result.ticker, "FSM");
        assert_eq!(result.predictions.len(), 10);
    }
}
