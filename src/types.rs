use crate::error::EnetError;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Intercept plus one weight per feature, on the original (un-standardized) scale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoefficientVector {
    pub intercept: f64,
    pub weights: Array1<f64>,
}

impl CoefficientVector {
    pub fn new(intercept: f64, weights: Array1<f64>) -> Self {
        Self { intercept, weights }
    }

    pub fn zeros(n_features: usize) -> Self {
        Self {
            intercept: 0.0,
            weights: Array1::zeros(n_features),
        }
    }

    pub fn n_features(&self) -> usize {
        self.weights.len()
    }

    /// Number of non-intercept weights that are exactly non-zero.
    pub fn nonzero_count(&self) -> usize {
        self.weights.iter().filter(|w| **w != 0.0).count()
    }

    pub fn active_features(&self) -> Vec<usize> {
        self.weights
            .iter()
            .enumerate()
            .filter(|(_, w)| **w != 0.0)
            .map(|(j, _)| j)
            .collect()
    }
}

/// How the coordinate descent kernel tracks the quantity each update needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Maintain the residual vector; O(n) per coordinate update.
    Naive,
    /// Maintain the gradient through the Gram matrix; O(p) per update.
    Covariance,
    /// Covariance below 500 features, naive above.
    #[default]
    Auto,
}

/// Held-out error measure aggregated by cross-validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CvMeasure {
    #[default]
    Mse,
    Mae,
}

impl CvMeasure {
    pub fn label(self) -> &'static str {
        match self {
            CvMeasure::Mse => "mse",
            CvMeasure::Mae => "mae",
        }
    }
}

pub fn default_n_lambda() -> usize {
    100
}

pub fn default_tolerance() -> f64 {
    1e-7
}

pub fn default_max_iterations() -> usize {
    100_000
}

pub fn default_active_set() -> bool {
    true
}

pub fn default_n_folds() -> usize {
    10
}

pub fn default_parallel() -> bool {
    true
}

pub fn default_alpha_grid() -> Vec<f64> {
    (0..=10).map(|i| i as f64 / 10.0).collect()
}

/// Settings for a single regularization path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathConfig {
    #[serde(default = "default_n_lambda")]
    pub n_lambda: usize,
    /// Smallest λ as a fraction of λ_max. `None` picks 1e-4 when rows exceed
    /// columns and 1e-2 otherwise.
    #[serde(default)]
    pub lambda_min_ratio: Option<f64>,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default)]
    pub update_mode: UpdateMode,
    #[serde(default = "default_active_set")]
    pub active_set: bool,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            n_lambda: default_n_lambda(),
            lambda_min_ratio: None,
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
            update_mode: UpdateMode::default(),
            active_set: default_active_set(),
        }
    }
}

impl PathConfig {
    pub fn validate(&self) -> Result<(), EnetError> {
        if self.n_lambda == 0 {
            return Err(EnetError::InvalidConfiguration(
                "n_lambda must be at least 1".to_string(),
            ));
        }
        if let Some(ratio) = self.lambda_min_ratio
            && !(ratio.is_finite() && ratio > 0.0 && ratio < 1.0)
        {
            return Err(EnetError::InvalidConfiguration(format!(
                "lambda_min_ratio must lie in (0, 1), got {ratio}"
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(EnetError::InvalidConfiguration(format!(
                "tolerance must be positive and finite, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(EnetError::InvalidConfiguration(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for k-fold cross-validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvConfig {
    #[serde(default = "default_n_folds")]
    pub n_folds: usize,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub measure: CvMeasure,
    /// Fit folds on the rayon pool.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            n_folds: default_n_folds(),
            seed: 0,
            measure: CvMeasure::default(),
            parallel: default_parallel(),
        }
    }
}

impl CvConfig {
    pub fn validate(&self) -> Result<(), EnetError> {
        if self.n_folds < 2 {
            return Err(EnetError::InvalidConfiguration(format!(
                "cross-validation needs at least 2 folds, got {}",
                self.n_folds
            )));
        }
        Ok(())
    }
}

/// Settings for the sweep over mixing values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default = "default_alpha_grid")]
    pub alphas: Vec<f64>,
    /// Run mixing values on the rayon pool.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            alphas: default_alpha_grid(),
            parallel: default_parallel(),
        }
    }
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), EnetError> {
        if self.alphas.is_empty() {
            return Err(EnetError::InvalidConfiguration(
                "alpha grid is empty".to_string(),
            ));
        }
        for &alpha in &self.alphas {
            validate_alpha(alpha)?;
        }
        Ok(())
    }
}

/// Complete engine configuration, as loaded from a JSON file by the CLI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub path: PathConfig,
    #[serde(default)]
    pub cv: CvConfig,
    #[serde(default)]
    pub grid: GridConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EnetError> {
        self.path.validate()?;
        self.cv.validate()?;
        self.grid.validate()
    }
}

pub(crate) fn validate_alpha(alpha: f64) -> Result<(), EnetError> {
    if !(alpha.is_finite() && (0.0..=1.0).contains(&alpha)) {
        return Err(EnetError::InvalidInput(format!(
            "mixing parameter alpha must lie in [0, 1], got {alpha}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn engine_config_fills_missing_fields_with_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"cv": {"n_folds": 5, "measure": "mae"}}"#).expect("parse");
        assert_eq!(cfg.cv.n_folds, 5);
        assert_eq!(cfg.cv.measure, CvMeasure::Mae);
        assert!(cfg.cv.parallel);
        assert_eq!(cfg.path, PathConfig::default());
        assert_eq!(cfg.grid.alphas.len(), 11);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn config_validation_rejects_bad_values() {
        let mut cfg = EngineConfig::default();
        cfg.path.lambda_min_ratio = Some(1.5);
        assert!(matches!(
            cfg.validate(),
            Err(EnetError::InvalidConfiguration(_))
        ));

        let mut cfg = EngineConfig::default();
        cfg.cv.n_folds = 1;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.grid.alphas = vec![0.5, 1.2];
        assert!(matches!(cfg.validate(), Err(EnetError::InvalidInput(_))));
    }

    #[test]
    fn coefficient_vector_reports_active_features() {
        let coef = CoefficientVector::new(1.0, array![0.0, -2.0, 0.0, 0.5]);
        assert_eq!(coef.n_features(), 4);
        assert_eq!(coef.nonzero_count(), 2);
        assert_eq!(coef.active_features(), vec![1, 3]);
        assert_eq!(CoefficientVector::zeros(3).nonzero_count(), 0);
    }

    #[test]
    fn default_alpha_grid_spans_unit_interval() {
        let grid = default_alpha_grid();
        assert_eq!(grid.first().copied(), Some(0.0));
        assert_eq!(grid.last().copied(), Some(1.0));
        assert!(grid.windows(2).all(|w| w[0] < w[1]));
    }
}
