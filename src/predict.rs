use crate::error::EnetError;
use crate::path::RegularizationPath;
use crate::types::CoefficientVector;
use ndarray::{Array1, Array2, ArrayView2};

fn check_schema(expected: usize, x_new: ArrayView2<'_, f64>) -> Result<(), EnetError> {
    if x_new.ncols() != expected {
        return Err(EnetError::SchemaMismatch {
            expected,
            actual: x_new.ncols(),
        });
    }
    Ok(())
}

/// `b0 + Σ w_j x_j` for every row of `x_new`, which must be on the original
/// feature scale with the training column order.
///
/// Non-finite cells propagate into the affected predictions.
pub fn predict(
    coefficients: &CoefficientVector,
    x_new: ArrayView2<'_, f64>,
) -> Result<Array1<f64>, EnetError> {
    check_schema(coefficients.n_features(), x_new)?;
    Ok(x_new.dot(&coefficients.weights) + coefficients.intercept)
}

/// Predictions for every point of a path: one row per observation, one column
/// per penalty in path order.
pub fn predict_path(
    path: &RegularizationPath,
    x_new: ArrayView2<'_, f64>,
) -> Result<Array2<f64>, EnetError> {
    let p = path.n_features();
    check_schema(p, x_new)?;
    let mut weights = Array2::<f64>::zeros((p, path.len()));
    let mut intercepts = Array1::<f64>::zeros(path.len());
    for (k, point) in path.points.iter().enumerate() {
        weights.column_mut(k).assign(&point.coefficients.weights);
        intercepts[k] = point.coefficients.intercept;
    }
    Ok(x_new.dot(&weights) + &intercepts)
}
