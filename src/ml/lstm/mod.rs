pub mod adam;
pub mod layer;
pub mod network;

pub use network::LstmNetwork;

use ndarray::{Array1, Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use self::adam::Adam;
use super::Predictor;
use crate::config::LstmSettings;
use crate::error::{ForecastError, Result};

/// Loss curve of one training run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub train_loss: Vec<f64>,
    /// Empty when the validation holdout is disabled
    pub val_loss: Vec<f64>,
}

impl TrainingHistory {
    pub fn final_train_loss(&self) -> Option<f64> {
        self.train_loss.last().copied()
    }

    pub fn final_val_loss(&self) -> Option<f64> {
        self.val_loss.last().copied()
    }
}

/// Reshapes `(rows, features)` into single-step sequences
/// `(rows, 1, features)`.
pub fn to_sequences(x: &Array2<f64>) -> Array3<f64> {
    x.clone().insert_axis(Axis(1))
}

/// Stacked-LSTM regressor trained with Adam on MSE for a fixed epoch
/// budget. The tail `validation_split` share of the training rows is held
/// out and only monitored.
pub struct SequenceRegressor {
    settings: LstmSettings,
    network: Option<LstmNetwork>,
    history: TrainingHistory,
}

impl SequenceRegressor {
    pub fn new(settings: LstmSettings) -> Self {
        Self {
            settings,
            network: None,
            history: TrainingHistory::default(),
        }
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    fn check_settings(&self) -> Result<()> {
        let s = &self.settings;
        let mut errors = Vec::new();
        if s.layers == 0 {
            errors.push("layers must be > 0");
        }
        if s.units == 0 {
            errors.push("units must be > 0");
        }
        if s.batch_size == 0 {
            errors.push("batch_size must be > 0");
        }
        if !(0.0..1.0).contains(&s.dropout) {
            errors.push("dropout must be in [0, 1)");
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ForecastError::Configuration(format!("lstm: {}", errors.join(", "))))
        }
    }

    pub fn fit_sequences(&mut self, x: &Array3<f64>, y: &Array1<f64>) -> Result<()> {
        self.check_settings()?;
        let n = x.len_of(Axis(0));
        if n != y.len() {
            return Err(ForecastError::Configuration(format!(
                "{} sequences vs {} targets",
                n,
                y.len()
            )));
        }
        let n_fit = (n as f64 * (1.0 - self.settings.validation_split)).floor() as usize;
        if n_fit == 0 {
            return Err(ForecastError::InsufficientData(format!(
                "{} training rows leave nothing to fit after the {:.0}% validation holdout",
                n,
                self.settings.validation_split * 100.0
            )));
        }

        let s = &self.settings;
        let features = x.len_of(Axis(2));
        let mut rng = StdRng::seed_from_u64(s.seed);
        let mut network = LstmNetwork::new(features, s.units, s.layers, s.dropout, &mut rng);
        let mut moments = network.moments();
        let mut adam = Adam::new(s.learning_rate);

        let x_val = x.slice(ndarray::s![n_fit.., .., ..]).to_owned();
        let y_val = y.slice(ndarray::s![n_fit..]).to_owned();
        let mut history = TrainingHistory::default();
        let mut order: Vec<usize> = (0..n_fit).collect();

        info!(
            "Training LSTM: {} layers x {} units, {} fit rows, {} validation rows, {} epochs",
            s.layers,
            s.units,
            n_fit,
            n - n_fit,
            s.epochs
        );

        for epoch in 1..=s.epochs {
            order.shuffle(&mut rng);
            let mut loss_sum = 0.0;

            for batch in order.chunks(s.batch_size) {
                let xb = x.select(Axis(0), batch);
                let yb = y.select(Axis(0), batch);

                let pass = network.forward(&xb, Some(&mut rng));
                let residual = &pass.predictions - &yb;
                let batch_loss = residual.mapv(|r| r * r).mean().unwrap_or(0.0);
                if !batch_loss.is_finite() {
                    return Err(ForecastError::TrainingFailure(format!(
                        "LSTM loss became non-finite at epoch {}",
                        epoch
                    )));
                }
                loss_sum += batch_loss * batch.len() as f64;

                let d_pred = residual * (2.0 / batch.len() as f64);
                let grads = network.backward(&pass, &d_pred);
                network.apply(adam.next_step(), &grads, &mut moments);
            }

            let train_loss = loss_sum / n_fit as f64;
            history.train_loss.push(train_loss);

            let val_loss = if y_val.is_empty() {
                None
            } else {
                let p = network.predict(&x_val);
                let loss = (&p - &y_val).mapv(|r| r * r).mean().unwrap_or(0.0);
                history.val_loss.push(loss);
                Some(loss)
            };

            if s.log_every > 0 && (epoch % s.log_every == 0 || epoch == s.epochs) {
                match val_loss {
                    Some(v) => debug!("LSTM epoch {}/{}: loss={:.6} val_loss={:.6}", epoch, s.epochs, train_loss, v),
                    None => debug!("LSTM epoch {}/{}: loss={:.6}", epoch, s.epochs, train_loss),
                }
            }
        }

        info!(
            "LSTM trained: final loss={:.6}, val_loss={}",
            history.final_train_loss().unwrap_or(f64::NAN),
            history
                .final_val_loss()
                .map(|v| format!("{:.6}", v))
                .unwrap_or_else(|| "n/a".to_string())
        );

        self.network = Some(network);
        self.history = history;
        Ok(())
    }

    /// One scalar per sequence
    pub fn predict_sequences(&self, x: &Array3<f64>) -> Result<Array1<f64>> {
        let network = self
            .network
            .as_ref()
            .ok_or_else(|| ForecastError::TrainingFailure("LSTM used before fit".to_string()))?;
        if x.len_of(Axis(2)) != network.input_size() {
            return Err(ForecastError::Configuration(format!(
                "LSTM trained on {} features, got {}",
                network.input_size(),
                x.len_of(Axis(2))
            )));
        }
        let predictions = network.predict(x);
        if predictions.iter().any(|p| !p.is_finite()) {
            return Err(ForecastError::TrainingFailure("LSTM produced non-finite predictions".to_string()));
        }
        Ok(predictions)
    }
}

impl Predictor for SequenceRegressor {
    fn name(&self) -> &str {
        "LSTM"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.fit_sequences(&to_sequences(x), y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.predict_sequences(&to_sequences(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_settings(epochs: usize) -> LstmSettings {
        LstmSettings {
            units: 8,
            epochs,
            batch_size: 8,
            learning_rate: 0.01,
            ..LstmSettings::default()
        }
    }

    fn trend(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 3), |(i, j)| (i as f64 / n as f64) * (1.0 + 0.1 * j as f64));
        let y = Array1::from_iter((0..n).map(|i| i as f64 / n as f64));
        (x, y)
    }

    #[test]
    fn test_to_sequences_shape() {
        let (x, _) = trend(10);
        let seq = to_sequences(&x);
        assert_eq!(seq.shape(), &[10, 1, 3]);
        assert_eq!(seq[[4, 0, 2]], x[[4, 2]]);
    }

    #[test]
    fn test_runs_full_epoch_budget_and_learns() {
        let (x, y) = trend(40);
        let mut model = SequenceRegressor::new(quick_settings(60));
        model.fit(&x, &y).unwrap();

        let history = model.history();
        assert_eq!(history.train_loss.len(), 60);
        assert_eq!(history.val_loss.len(), 60);
        assert!(history.train_loss[59] < history.train_loss[0]);

        let predictions = model.predict(&x).unwrap();
        assert_eq!(predictions.len(), 40);
        assert!(predictions.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_same_seed_same_predictions() {
        let (x, y) = trend(20);
        let mut a = SequenceRegressor::new(quick_settings(5));
        let mut b = SequenceRegressor::new(quick_settings(5));
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let (x, y) = trend(20);
        let mut model = SequenceRegressor::new(quick_settings(2));
        model.fit(&x, &y).unwrap();
        assert!(matches!(
            model.predict(&Array2::zeros((3, 5))),
            Err(ForecastError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_sized_settings_are_configuration() {
        let (x, y) = trend(20);
        let broken = [
            LstmSettings { batch_size: 0, ..quick_settings(1) },
            LstmSettings { layers: 0, ..quick_settings(1) },
            LstmSettings { units: 0, ..quick_settings(1) },
        ];
        for settings in broken {
            let mut model = SequenceRegressor::new(settings);
            assert!(matches!(model.fit(&x, &y), Err(ForecastError::Configuration(_))));
        }
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let model = SequenceRegressor::new(quick_settings(1));
        assert!(model.predict(&Array2::zeros((1, 3))).is_err());
    }
}
