use crate::error::{ForecastError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Contiguous, unshuffled k-fold splits. The first `n % k` folds take one
/// extra row.
pub fn k_fold(n_samples: usize, n_folds: usize) -> Result<Vec<Fold>> {
    if n_folds < 2 {
        return Err(ForecastError::Configuration(format!(
            "k-fold needs at least 2 folds, got {}",
            n_folds
        )));
    }
    if n_samples < n_folds {
        return Err(ForecastError::Configuration(format!(
            "cannot split {} rows into {} folds",
            n_samples, n_folds
        )));
    }

    let base = n_samples / n_folds;
    let extra = n_samples % n_folds;
    let mut folds = Vec::with_capacity(n_folds);
    let mut start = 0;

    for i in 0..n_folds {
        let size = base + usize::from(i < extra);
        let end = start + size;
        folds.push(Fold {
            train: (0..start).chain(end..n_samples).collect(),
            test: (start..end).collect(),
        });
        start = end;
    }

    Ok(folds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folds_cover_every_row_once() {
        let folds = k_fold(23, 5).unwrap();
        assert_eq!(folds.len(), 5);
        let sizes: Vec<usize> = folds.iter().map(|f| f.test.len()).collect();
        assert_eq!(sizes, vec![5, 5, 5, 4, 4]);

        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.test.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..23).collect::<Vec<_>>());

        for fold in &folds {
            assert_eq!(fold.train.len() + fold.test.len(), 23);
            assert!(fold.test.iter().all(|i| !fold.train.contains(i)));
        }
    }

    #[test]
    fn test_too_few_rows() {
        assert!(matches!(k_fold(3, 5), Err(ForecastError::Configuration(_))));
        assert!(k_fold(10, 1).is_err());
    }
}
