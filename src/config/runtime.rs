use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub pipeline: PipelineSettings,
    pub selection: SelectionSettings,
    pub svr: SvrSettings,
    pub lstm: LstmSettings,
}

impl ForecastConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Pipeline validation
        if self.pipeline.target_column.trim().is_empty() {
            errors.push("target_column must not be empty".to_string());
        }
        if self.pipeline.num_features == 0 {
            errors.push("num_features must be > 0".to_string());
        }
        if !(self.pipeline.train_ratio > 0.0 && self.pipeline.train_ratio < 1.0) {
            errors.push("train_ratio must be between 0 and 1 (exclusive)".to_string());
        }

        // Selection validation
        if self.selection.mi_neighbors == 0 {
            errors.push("mi_neighbors must be > 0".to_string());
        }

        // SVR validation
        if self.svr.c_grid.is_empty() || self.svr.c_grid.iter().any(|c| !(*c > 0.0)) {
            errors.push("svr: c_grid must be non-empty and strictly positive".to_string());
        }
        if self.svr.gamma_grid.is_empty() || self.svr.gamma_grid.iter().any(|g| !(*g > 0.0)) {
            errors.push("svr: gamma_grid must be non-empty and strictly positive".to_string());
        }
        if self.svr.epsilon < 0.0 {
            errors.push("svr: epsilon must be >= 0".to_string());
        }
        if self.svr.cv_folds < 2 {
            errors.push("svr: cv_folds must be >= 2".to_string());
        }
        if self.svr.min_rows_per_fold == 0 {
            errors.push("svr: min_rows_per_fold must be > 0".to_string());
        }
        if self.svr.max_passes == 0 {
            errors.push("svr: max_passes must be > 0".to_string());
        }

        // LSTM validation
        if self.lstm.units == 0 {
            errors.push("lstm: units must be > 0".to_string());
        }
        if self.lstm.layers == 0 {
            errors.push("lstm: layers must be > 0".to_string());
        }
        if !(0.0..1.0).contains(&self.lstm.dropout) {
            errors.push("lstm: dropout must be in [0, 1)".to_string());
        }
        if self.lstm.epochs == 0 {
            errors.push("lstm: epochs must be > 0".to_string());
        }
        if self.lstm.batch_size == 0 {
            errors.push("lstm: batch_size must be > 0".to_string());
        }
        if !(0.0..1.0).contains(&self.lstm.validation_split) {
            errors.push("lstm: validation_split must be in [0, 1)".to_string());
        }
        if !(self.lstm.learning_rate > 0.0) {
            errors.push("lstm: learning_rate must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Smallest cleaned series the pipeline accepts
    pub fn min_rows(&self) -> usize {
        self.svr.min_training_rows()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub target_column: String,
    pub num_features: usize,
    pub train_ratio: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            target_column: "Close".to_string(),
            num_features: 5,
            train_ratio: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionSettings {
    /// k for the nearest-neighbour mutual information estimate
    pub mi_neighbors: usize,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self { mi_neighbors: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SvrSettings {
    pub c_grid: Vec<f64>,
    pub gamma_grid: Vec<f64>,
    pub epsilon: f64,
    pub cv_folds: usize,
    /// Training rows every CV fold must hold
    pub min_rows_per_fold: usize,
    pub tolerance: f64,
    pub max_passes: usize,
}

impl SvrSettings {
    /// Training rows the grid search needs
    pub fn min_training_rows(&self) -> usize {
        self.cv_folds * self.min_rows_per_fold
    }
}

impl Default for SvrSettings {
    fn default() -> Self {
        Self {
            c_grid: vec![0.1, 1.0, 10.0],
            gamma_grid: vec![1.0, 0.1, 0.01],
            epsilon: 0.1,
            cv_folds: 5,
            min_rows_per_fold: 5,
            tolerance: 1e-3,
            max_passes: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LstmSettings {
    pub units: usize,
    pub layers: usize,
    pub dropout: f64,
    /// Fixed budget, no early stopping
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_split: f64,
    pub learning_rate: f64,
    pub seed: u64,
    pub log_every: usize,
}

impl Default for LstmSettings {
    fn default() -> Self {
        Self {
            units: 50,
            layers: 2,
            dropout: 0.2,
            epochs: 500,
            batch_size: 32,
            validation_split: 0.2,
            learning_rate: 0.001,
            seed: 42,
            log_every: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_run() {
        let config = ForecastConfig::default();
        assert_eq!(config.pipeline.target_column, "Close");
        assert_eq!(config.pipeline.num_features, 5);
        assert_eq!(config.pipeline.train_ratio, 0.8);
        assert_eq!(config.svr.c_grid, vec![0.1, 1.0, 10.0]);
        assert_eq!(config.svr.gamma_grid, vec![1.0, 0.1, 0.01]);
        assert_eq!(config.svr.cv_folds, 5);
        assert_eq!(config.lstm.units, 50);
        assert_eq!(config.lstm.layers, 2);
        assert_eq!(config.lstm.epochs, 500);
        assert_eq!(config.lstm.batch_size, 32);
        assert_eq!(config.min_rows(), 25);
        assert_eq!(config.svr.min_training_rows(), 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: ForecastConfig = toml::from_str("").unwrap();
        assert_eq!(config.lstm.dropout, 0.2);
        assert_eq!(config.selection.mi_neighbors, 3);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config: ForecastConfig = toml::from_str(
            r#"
            [lstm]
            epochs = 20

            [pipeline]
            num_features = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.lstm.epochs, 20);
        assert_eq!(config.lstm.batch_size, 32);
        assert_eq!(config.pipeline.num_features, 3);
        assert_eq!(config.pipeline.target_column, "Close");
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = ForecastConfig::default();
        config.pipeline.train_ratio = 1.5;
        config.svr.cv_folds = 1;
        config.lstm.dropout = 1.0;
        config.svr.min_rows_per_fold = 0;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
    }
}
