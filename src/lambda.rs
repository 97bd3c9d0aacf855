//! Penalty-strength grids for the elastic-net path.
//!
//! λ_max is the smallest penalty at which every standardized coefficient is zero:
//! `max_j |x_jᵀy| / (n·α)`. Pure ridge (α = 0) never produces exact zeros, so α
//! is floored at `ALPHA_FLOOR`; at α = 0 this gives ten times the α = 0.01 value.

use crate::error::EnetError;
use crate::linalg::faer_ndarray::fast_atv;
use crate::types::validate_alpha;
use ndarray::{ArrayView1, ArrayView2};

pub const ALPHA_FLOOR: f64 = 1e-3;

/// λ_min / λ_max when rows outnumber columns.
pub const MIN_RATIO_TALL: f64 = 1e-4;
/// λ_min / λ_max otherwise; a larger floor keeps wide problems stable.
pub const MIN_RATIO_WIDE: f64 = 1e-2;

pub fn default_min_ratio(n_rows: usize, n_features: usize) -> f64 {
    if n_rows > n_features {
        MIN_RATIO_TALL
    } else {
        MIN_RATIO_WIDE
    }
}

/// Smallest penalty that zeroes every coefficient, on standardized inputs.
pub fn lambda_max(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, alpha: f64) -> f64 {
    let n = x.nrows() as f64;
    let inner = fast_atv(&x, &y);
    let max_abs = inner.iter().copied().map(f64::abs).fold(0.0, f64::max);
    max_abs / (n * alpha.max(ALPHA_FLOOR))
}

/// Geometric sequence of `n_lambda` values from λ_max down to `λ_max · min_ratio`.
pub fn lambda_sequence(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    alpha: f64,
    n_lambda: usize,
    min_ratio: Option<f64>,
) -> Result<Vec<f64>, EnetError> {
    validate_alpha(alpha)?;
    if n_lambda == 0 {
        return Err(EnetError::InvalidInput(
            "lambda sequence length must be at least 1".to_string(),
        ));
    }
    let ratio = min_ratio.unwrap_or_else(|| default_min_ratio(x.nrows(), x.ncols()));
    if !(ratio.is_finite() && ratio > 0.0 && ratio < 1.0) {
        return Err(EnetError::InvalidInput(format!(
            "lambda_min_ratio must lie in (0, 1), got {ratio}"
        )));
    }

    let lmax = lambda_max(x, y, alpha);
    if !(lmax.is_finite() && lmax > 0.0) {
        return Err(EnetError::InvalidInput(format!(
            "lambda_max is {lmax}: the response is constant or uncorrelated with every feature"
        )));
    }
    if n_lambda == 1 {
        return Ok(vec![lmax]);
    }

    let log_max = lmax.ln();
    let step = ratio.ln() / (n_lambda - 1) as f64;
    let mut lambdas: Vec<f64> = (0..n_lambda)
        .map(|i| (log_max + step * i as f64).exp())
        .collect();
    lambdas[0] = lmax;
    Ok(lambdas)
}

/// Caller-supplied sequences must be non-empty, finite, non-negative and
/// strictly decreasing.
pub fn validate_lambda_sequence(lambdas: &[f64]) -> Result<(), EnetError> {
    if lambdas.is_empty() {
        return Err(EnetError::InvalidInput(
            "lambda sequence is empty".to_string(),
        ));
    }
    if let Some(bad) = lambdas.iter().find(|l| !(l.is_finite() && **l >= 0.0)) {
        return Err(EnetError::InvalidInput(format!(
            "lambda values must be finite and non-negative, got {bad}"
        )));
    }
    if let Some(w) = lambdas.windows(2).find(|w| w[1] >= w[0]) {
        return Err(EnetError::InvalidInput(format!(
            "lambda sequence must be strictly decreasing, found {} followed by {}",
            w[0], w[1]
        )));
    }
    Ok(())
}
