use crate::linalg::faer_ndarray::FaerLinalgError;
use std::fmt;
use thiserror::Error;

/// Where in a path, cross-validation or grid computation something happened.
///
/// Absent fields are omitted from the rendered form; a missing fold means the
/// full-data fit.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FitCoordinates {
    pub alpha: Option<f64>,
    pub lambda: Option<f64>,
    pub fold: Option<usize>,
}

impl FitCoordinates {
    pub fn alpha(alpha: f64) -> Self {
        Self {
            alpha: Some(alpha),
            lambda: None,
            fold: None,
        }
    }

    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = Some(lambda);
        self
    }

    pub fn with_fold(mut self, fold: Option<usize>) -> Self {
        self.fold = fold;
        self
    }
}

impl fmt::Display for FitCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(3);
        if let Some(alpha) = self.alpha {
            parts.push(format!("alpha={alpha}"));
        }
        if let Some(lambda) = self.lambda {
            parts.push(format!("lambda={lambda:.6e}"));
        }
        match self.fold {
            Some(fold) => parts.push(format!("fold={fold}")),
            None => parts.push("fold=full".to_string()),
        }
        write!(f, "{}", parts.join(", "))
    }
}

#[derive(Error, Clone)]
pub enum EnetError {
    #[error(
        "Feature column {column} has zero variance at ({at}). Its scale is taken as 1 and its coefficient is held at zero; remove constant columns upstream."
    )]
    DegenerateFeature { column: usize, at: FitCoordinates },

    #[error(
        "Coordinate descent did not converge within {iterations} sweeps at ({at}). Last max coefficient change was {max_change:.6e}."
    )]
    ConvergenceFailure {
        at: FitCoordinates,
        iterations: usize,
        max_change: f64,
    },

    #[error("Non-finite value at ({at}): {detail}")]
    NumericalError { at: FitCoordinates, detail: String },

    #[error(
        "Schema mismatch: the coefficients were fit on {expected} feature columns but the input has {actual}"
    )]
    SchemaMismatch { expected: usize, actual: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("A normal-equation solve failed during the relaxed refit: {0}")]
    LinearSystemSolveFailed(#[from] FaerLinalgError),

    #[error("Grid search was cancelled before any mixing value completed")]
    Cancelled,
}

// Ensure Debug prints with actual line breaks by delegating to Display
impl fmt::Debug for EnetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl EnetError {
    /// Conditions that are reported alongside partial results instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EnetError::DegenerateFeature { .. } | EnetError::ConvergenceFailure { .. }
        )
    }

    pub fn coordinates(&self) -> Option<FitCoordinates> {
        match self {
            EnetError::DegenerateFeature { at, .. }
            | EnetError::ConvergenceFailure { at, .. }
            | EnetError::NumericalError { at, .. } => Some(*at),
            _ => None,
        }
    }

    pub(crate) fn numerical(at: FitCoordinates, detail: impl Into<String>) -> Self {
        EnetError::NumericalError {
            at,
            detail: detail.into(),
        }
    }

    /// Re-tag a coordinate-carrying error with the mixing value it belongs to.
    pub(crate) fn with_alpha(self, alpha: f64) -> Self {
        match self {
            EnetError::DegenerateFeature { column, mut at } => {
                at.alpha = Some(alpha);
                EnetError::DegenerateFeature { column, at }
            }
            EnetError::NumericalError { mut at, detail } => {
                at.alpha = Some(alpha);
                EnetError::NumericalError { at, detail }
            }
            EnetError::ConvergenceFailure {
                mut at,
                iterations,
                max_change,
            } => {
                at.alpha = Some(alpha);
                EnetError::ConvergenceFailure {
                    at,
                    iterations,
                    max_change,
                }
            }
            other => other,
        }
    }
}
