use ndarray::ArrayView1;

/// Mean absolute percentage error as a fraction (0.05 = 5%).
/// Denominators are floored at `f64::EPSILON` so zero actuals stay finite.
pub fn mape(actual: ArrayView1<f64>, predicted: ArrayView1<f64>) -> f64 {
    let n = actual.len();
    if n == 0 {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).abs() / a.abs().max(f64::EPSILON))
        .sum::<f64>()
        / n as f64
}

pub fn mse(actual: ArrayView1<f64>, predicted: ArrayView1<f64>) -> f64 {
    let n = actual.len();
    if n == 0 {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / n as f64
}

pub fn rmse(actual: ArrayView1<f64>, predicted: ArrayView1<f64>) -> f64 {
    mse(actual, predicted).sqrt()
}

/// Coefficient of determination. A constant target scores 1 for a perfect
/// fit and 0 otherwise.
pub fn r2_score(actual: ArrayView1<f64>, predicted: ArrayView1<f64>) -> f64 {
    let n = actual.len();
    if n == 0 {
        return 0.0;
    }
    let mean = actual.sum() / n as f64;
    let ss_res: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}
