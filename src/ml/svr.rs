use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::metrics::r2_score;
use super::validation::k_fold;
use super::Predictor;
use crate::config::SvrSettings;
use crate::error::{ForecastError, Result};

/// One point of the (C, gamma) grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SvrParams {
    pub c: f64,
    pub gamma: f64,
}

/// Cross-validated score of one grid point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridCandidate {
    pub params: SvrParams,
    pub mean_r2: f64,
    pub fold_r2: Vec<f64>,
}

/// Epsilon-insensitive support vector regression with an RBF kernel.
///
/// The intercept is folded into the kernel (`K + 1`), which leaves a box
/// constrained dual solved by cyclic coordinate descent:
/// `min ½βᵀKβ - yᵀβ + ε|β|₁` subject to `-C ≤ β ≤ C`.
#[derive(Debug, Clone)]
pub struct SvrModel {
    params: SvrParams,
    support: Array2<f64>,
    coef: Array1<f64>,
    passes: usize,
}

impl SvrModel {
    pub fn fit(
        x: &Array2<f64>,
        y: ArrayView1<f64>,
        params: SvrParams,
        epsilon: f64,
        tolerance: f64,
        max_passes: usize,
    ) -> Result<Self> {
        let n = x.nrows();
        if n == 0 || n != y.len() {
            return Err(ForecastError::Configuration(format!(
                "SVR fit needs matching non-empty inputs ({} rows, {} targets)",
                n,
                y.len()
            )));
        }

        let gram = biased_rbf(x, x, params.gamma);
        let mut beta = Array1::<f64>::zeros(n);
        let mut fitted = Array1::<f64>::zeros(n);
        let mut passes = 0;
        let mut converged = false;

        while passes < max_passes {
            passes += 1;
            let mut max_delta: f64 = 0.0;

            for i in 0..n {
                let k_ii = gram[[i, i]];
                let residual = y[i] - (fitted[i] - k_ii * beta[i]);
                let updated = (soft_threshold(residual, epsilon) / k_ii).clamp(-params.c, params.c);
                let delta = updated - beta[i];
                if delta != 0.0 {
                    fitted.scaled_add(delta, &gram.column(i));
                    beta[i] = updated;
                    max_delta = max_delta.max(delta.abs());
                }
            }

            if !max_delta.is_finite() {
                return Err(ForecastError::TrainingFailure(format!(
                    "SVR diverged (C={}, gamma={})",
                    params.c, params.gamma
                )));
            }
            if max_delta < tolerance {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(
                "SVR (C={}, gamma={}) stopped after {} passes without reaching tolerance {}",
                params.c, params.gamma, passes, tolerance
            );
        }

        let support_idx: Vec<usize> = (0..n).filter(|&i| beta[i] != 0.0).collect();
        Ok(Self {
            params,
            support: x.select(Axis(0), &support_idx),
            coef: beta.select(Axis(0), &support_idx),
            passes,
        })
    }

    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        if self.coef.is_empty() {
            return Array1::zeros(x.nrows());
        }
        biased_rbf(x, &self.support, self.params.gamma).dot(&self.coef)
    }

    pub fn params(&self) -> SvrParams {
        self.params
    }

    pub fn n_support(&self) -> usize {
        self.coef.len()
    }

    pub fn passes(&self) -> usize {
        self.passes
    }
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

/// `exp(-gamma * |a_i - b_j|²) + 1`
fn biased_rbf(a: &Array2<f64>, b: &Array2<f64>, gamma: f64) -> Array2<f64> {
    let mut k = Array2::<f64>::zeros((a.nrows(), b.nrows()));
    for (i, ra) in a.axis_iter(Axis(0)).enumerate() {
        for (j, rb) in b.axis_iter(Axis(0)).enumerate() {
            let sq: f64 = ra.iter().zip(rb.iter()).map(|(p, q)| (p - q).powi(2)).sum();
            k[[i, j]] = (-gamma * sq).exp() + 1.0;
        }
    }
    k
}

/// Grid-searched kernel regressor: every (C, gamma) pair is scored by
/// contiguous k-fold CV on the training rows, the best mean R² wins (first
/// in grid order on ties) and is refitted on all training rows.
pub struct KernelRegressor {
    settings: SvrSettings,
    model: Option<SvrModel>,
    search: Vec<GridCandidate>,
}

impl KernelRegressor {
    pub fn new(settings: SvrSettings) -> Self {
        Self {
            settings,
            model: None,
            search: Vec::new(),
        }
    }

    pub fn grid(&self) -> Vec<SvrParams> {
        self.settings
            .c_grid
            .iter()
            .flat_map(|&c| self.settings.gamma_grid.iter().map(move |&gamma| SvrParams { c, gamma }))
            .collect()
    }

    /// Scores every grid point. Returns candidates in grid order.
    pub fn grid_search(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<Vec<GridCandidate>> {
        let grid = self.grid();
        if grid.is_empty() {
            return Err(ForecastError::Configuration(
                "SVR grid needs at least one C and one gamma value".to_string(),
            ));
        }

        let n = x.nrows();
        let folds_needed = self.settings.cv_folds;
        let rows_needed = self.settings.min_training_rows();
        if n < rows_needed {
            return Err(ForecastError::Configuration(format!(
                "{}-fold cross-validation needs at least {} training rows ({} per fold), got {}",
                folds_needed, rows_needed, self.settings.min_rows_per_fold, n
            )));
        }
        let folds = k_fold(n, folds_needed)?;
        let settings = &self.settings;

        grid.into_par_iter()
            .map(|params| {
                let fold_r2 = folds
                    .iter()
                    .map(|fold| {
                        let x_train = x.select(Axis(0), &fold.train);
                        let y_train = y.select(Axis(0), &fold.train);
                        let x_test = x.select(Axis(0), &fold.test);
                        let y_test = y.select(Axis(0), &fold.test);
                        let model = SvrModel::fit(
                            &x_train,
                            y_train.view(),
                            params,
                            settings.epsilon,
                            settings.tolerance,
                            settings.max_passes,
                        )?;
                        Ok(r2_score(y_test.view(), model.predict(&x_test).view()))
                    })
                    .collect::<Result<Vec<f64>>>()?;
                let mean_r2 = fold_r2.iter().sum::<f64>() / fold_r2.len() as f64;
                debug!("SVR C={:<5} gamma={:<5} mean R²={:.4}", params.c, params.gamma, mean_r2);
                Ok(GridCandidate {
                    params,
                    mean_r2,
                    fold_r2,
                })
            })
            .collect()
    }

    pub fn best_params(&self) -> Option<SvrParams> {
        self.model.as_ref().map(|m| m.params())
    }

    pub fn search_results(&self) -> &[GridCandidate] {
        &self.search
    }

    pub fn model(&self) -> Option<&SvrModel> {
        self.model.as_ref()
    }
}

fn pick_best(candidates: &[GridCandidate]) -> Option<&GridCandidate> {
    let mut best: Option<&GridCandidate> = None;
    for candidate in candidates.iter().filter(|c| c.mean_r2.is_finite()) {
        if best.map_or(true, |b| candidate.mean_r2 > b.mean_r2) {
            best = Some(candidate);
        }
    }
    best
}

impl Predictor for KernelRegressor {
    fn name(&self) -> &str {
        "SVM"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let candidates = self.grid_search(x, y)?;
        let best = pick_best(&candidates).ok_or_else(|| {
            ForecastError::TrainingFailure("no SVR grid point produced a finite CV score".to_string())
        })?;
        let params = best.params;
        info!(
            "SVR grid search picked C={} gamma={} (mean CV R²={:.4}) from {} candidates",
            params.c,
            params.gamma,
            best.mean_r2,
            candidates.len()
        );

        let model = SvrModel::fit(
            x,
            y.view(),
            params,
            self.settings.epsilon,
            self.settings.tolerance,
            self.settings.max_passes,
        )?;
        debug!("SVR refit: {} support vectors after {} passes", model.n_support(), model.passes());

        self.model = Some(model);
        self.search = candidates;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| ForecastError::TrainingFailure("SVR used before fit".to_string()))?;
        let predictions = model.predict(x);
        if predictions.iter().any(|p| !p.is_finite()) {
            return Err(ForecastError::TrainingFailure("SVR produced non-finite predictions".to_string()));
        }
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            let t = i as f64 / n as f64;
            if j == 0 {
                t
            } else {
                1.0 - t * 0.5
            }
        });
        let y = Array1::from_iter((0..n).map(|i| 0.1 + 0.8 * i as f64 / n as f64));
        (x, y)
    }

    #[test]
    fn test_grid_order_and_size() {
        let regressor = KernelRegressor::new(SvrSettings::default());
        let grid = regressor.grid();
        assert_eq!(grid.len(), 9);
        assert_eq!(grid[0], SvrParams { c: 0.1, gamma: 1.0 });
        assert_eq!(grid[8], SvrParams { c: 10.0, gamma: 0.01 });
    }

    #[test]
    fn test_fit_tracks_linear_trend() {
        let (x, y) = linear_data(60);
        let mut regressor = KernelRegressor::new(SvrSettings::default());
        regressor.fit(&x, &y).unwrap();

        assert_eq!(regressor.search_results().len(), 9);
        let best = regressor.best_params().unwrap();
        assert!(SvrSettings::default().c_grid.contains(&best.c));

        let predictions = regressor.predict(&x).unwrap();
        assert_eq!(predictions.len(), 60);
        let mae = predictions
            .iter()
            .zip(y.iter())
            .map(|(p, t)| (p - t).abs())
            .sum::<f64>()
            / y.len() as f64;
        assert!(mae < 0.2, "mean absolute error {}", mae);
        assert!(predictions[59] > predictions[0]);
    }

    #[test]
    fn test_best_candidate_has_max_score() {
        let (x, y) = linear_data(40);
        let mut regressor = KernelRegressor::new(SvrSettings::default());
        regressor.fit(&x, &y).unwrap();
        let best = regressor.best_params().unwrap();
        let top = regressor
            .search_results()
            .iter()
            .map(|c| c.mean_r2)
            .fold(f64::NEG_INFINITY, f64::max);
        let chosen = regressor
            .search_results()
            .iter()
            .find(|c| c.params == best)
            .unwrap();
        assert_eq!(chosen.mean_r2, top);
    }

    #[test]
    fn test_too_few_rows_is_configuration() {
        let (x, y) = linear_data(8);
        let mut regressor = KernelRegressor::new(SvrSettings::default());
        let err = regressor.fit(&x, &y).unwrap_err();
        assert!(matches!(err, ForecastError::Configuration(_)));
    }

    #[test]
    fn test_short_folds_are_configuration() {
        for rows in [12, 24] {
            let (x, y) = linear_data(rows);
            let mut regressor = KernelRegressor::new(SvrSettings::default());
            let err = regressor.fit(&x, &y).unwrap_err();
            assert!(matches!(err, ForecastError::Configuration(_)), "{} rows: {}", rows, err);
        }
    }

    #[test]
    fn test_exactly_min_rows_per_fold_fits() {
        let (x, y) = linear_data(25);
        let mut regressor = KernelRegressor::new(SvrSettings::default());
        assert!(regressor.fit(&x, &y).is_ok());
    }

    #[test]
    fn test_empty_grid_is_configuration() {
        let (x, y) = linear_data(40);
        let mut regressor = KernelRegressor::new(SvrSettings {
            gamma_grid: vec![],
            ..SvrSettings::default()
        });
        assert!(matches!(regressor.fit(&x, &y), Err(ForecastError::Configuration(_))));

        let mut regressor = KernelRegressor::new(SvrSettings {
            c_grid: vec![],
            ..SvrSettings::default()
        });
        assert!(matches!(regressor.fit(&x, &y), Err(ForecastError::Configuration(_))));
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let regressor = KernelRegressor::new(SvrSettings::default());
        assert!(regressor.predict(&Array2::zeros((2, 2))).is_err());
    }

    #[test]
    fn test_wide_epsilon_gives_no_support_vectors() {
        let (x, y) = linear_data(10);
        let model = SvrModel::fit(&x, y.view(), SvrParams { c: 1.0, gamma: 1.0 }, 5.0, 1e-3, 100).unwrap();
        assert_eq!(model.n_support(), 0);
        assert!(model.predict(&x).iter().all(|p| *p == 0.0));
    }
}
