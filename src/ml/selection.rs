use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use statrs::function::gamma::digamma;
use tracing::{debug, info};

use crate::error::{ForecastError, Result};

/// Chosen feature columns plus the target they predict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub columns: Vec<String>,
    pub target: String,
}

impl FeatureSet {
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Feature columns followed by the target
    pub fn all_columns(&self) -> Vec<String> {
        let mut all = self.columns.clone();
        all.push(self.target.clone());
        all
    }
}

/// Per-candidate scores from one selection pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureScore {
    pub column: String,
    pub f_score: f64,
    pub mutual_info: f64,
    pub selected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSelection {
    pub features: FeatureSet,
    pub scores: Vec<FeatureScore>,
}

/// Ranks candidate columns by the univariate F-test and keeps the top `k`.
/// Mutual information is computed alongside as a diagnostic only.
pub struct FeatureSelector {
    k: usize,
    mi_neighbors: usize,
}

impl FeatureSelector {
    pub fn new(k: usize, mi_neighbors: usize) -> Self {
        Self { k, mi_neighbors }
    }

    /// `x` holds the candidate columns named by `names`; `y` is the target.
    /// Returns exactly `k` names, in their original column order.
    pub fn select(&self, x: &Array2<f64>, names: &[String], y: ArrayView1<f64>, target: &str) -> Result<FeatureSelection> {
        if names.len() != x.ncols() {
            return Err(ForecastError::Configuration(format!(
                "{} column names for a {}-column matrix",
                names.len(),
                x.ncols()
            )));
        }
        if names.iter().any(|n| n == target) {
            return Err(ForecastError::Configuration(format!(
                "target '{}' must not be scored as a candidate feature",
                target
            )));
        }
        if self.k == 0 || names.len() < self.k {
            return Err(ForecastError::Configuration(format!(
                "requested {} features but only {} candidate columns exist",
                self.k,
                names.len()
            )));
        }
        if x.nrows() != y.len() {
            return Err(ForecastError::Configuration(format!(
                "{} feature rows vs {} target rows",
                x.nrows(),
                y.len()
            )));
        }

        let f_scores = f_regression(x, y);
        let mi_scores = mutual_info_regression(x, y, self.mi_neighbors);

        // Stable sort keeps column order among equal scores
        let mut ranked: Vec<usize> = (0..names.len()).collect();
        ranked.sort_by(|&a, &b| f_scores[b].total_cmp(&f_scores[a]));
        let mut chosen: Vec<usize> = ranked.into_iter().take(self.k).collect();
        chosen.sort_unstable();

        let scores: Vec<FeatureScore> = names
            .iter()
            .enumerate()
            .map(|(j, name)| FeatureScore {
                column: name.clone(),
                f_score: f_scores[j],
                mutual_info: mi_scores[j],
                selected: chosen.contains(&j),
            })
            .collect();

        for s in &scores {
            debug!(
                "Feature {:<12} F={:>12.4} MI={:.4}{}",
                s.column,
                s.f_score,
                s.mutual_info,
                if s.selected { " *" } else { "" }
            );
        }

        let columns: Vec<String> = chosen.iter().map(|&j| names[j].clone()).collect();
        info!("Selected {} features for {}: {:?}", columns.len(), target, columns);

        Ok(FeatureSelection {
            features: FeatureSet {
                columns,
                target: target.to_string(),
            },
            scores,
        })
    }
}

/// Univariate linear-regression F statistic per column:
/// `r² / (1 - r²) * (n - 2)`. Constant columns score 0; a perfect fit
/// scores `f64::MAX`.
pub fn f_regression(x: &Array2<f64>, y: ArrayView1<f64>) -> Vec<f64> {
    let n = y.len();
    if n < 3 {
        return vec![0.0; x.ncols()];
    }
    let y_mean = y.sum() / n as f64;
    let yc: Vec<f64> = y.iter().map(|v| v - y_mean).collect();
    let y_sq = yc.iter().map(|v| v * v).sum::<f64>();
    let dof = (n - 2) as f64;

    x.axis_iter(Axis(1))
        .map(|col| {
            let x_mean = col.sum() / n as f64;
            let mut cross = 0.0;
            let mut x_sq = 0.0;
            for (xv, yv) in col.iter().zip(yc.iter()) {
                let xc = xv - x_mean;
                cross += xc * yv;
                x_sq += xc * xc;
            }
            let denom = (x_sq * y_sq).sqrt();
            if denom <= f64::EPSILON {
                return 0.0;
            }
            let r2 = (cross / denom).powi(2).min(1.0);
            if r2 >= 1.0 {
                f64::MAX
            } else {
                r2 / (1.0 - r2) * dof
            }
        })
        .collect()
}

/// Kraskov nearest-neighbour mutual information between each column and
/// `y`, in nats, clipped at zero. Columns and target are scaled to unit
/// variance first so the Chebyshev radius treats both axes alike.
pub fn mutual_info_regression(x: &Array2<f64>, y: ArrayView1<f64>, k: usize) -> Vec<f64> {
    let n = y.len();
    if k == 0 || n <= k {
        return vec![0.0; x.ncols()];
    }
    let ys = unit_variance(&y.to_vec());
    x.axis_iter(Axis(1))
        .map(|col| {
            let xs = unit_variance(&col.to_vec());
            ksg_mutual_info(&xs, &ys, k)
        })
        .collect()
}

fn unit_variance(values: &[f64]) -> Vec<f64> {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    if std > 0.0 {
        values.iter().map(|v| v / std).collect()
    } else {
        values.to_vec()
    }
}

fn ksg_mutual_info(x: &[f64], y: &[f64], k: usize) -> f64 {
    let n = x.len();
    let mut nx_digamma = 0.0;
    let mut ny_digamma = 0.0;
    let mut dists = Vec::with_capacity(n - 1);

    for i in 0..n {
        dists.clear();
        for j in 0..n {
            if j != i {
                dists.push((x[i] - x[j]).abs().max((y[i] - y[j]).abs()));
            }
        }
        dists.select_nth_unstable_by(k - 1, |a, b| a.total_cmp(b));
        // Shrink so points exactly on the radius are excluded from marginal counts
        let radius = dists[k - 1] * (1.0 - 1e-12);

        let nx = (0..n).filter(|&j| j != i && (x[i] - x[j]).abs() <= radius).count();
        let ny = (0..n).filter(|&j| j != i && (y[i] - y[j]).abs() <= radius).count();
        nx_digamma += digamma(nx as f64 + 1.0);
        ny_digamma += digamma(ny as f64 + 1.0);
    }

    let mi = digamma(n as f64) + digamma(k as f64) - nx_digamma / n as f64 - ny_digamma / n as f64;
    mi.max(0.0)
}
