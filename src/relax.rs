//! Relaxed elastic net: refit the selected variables without a penalty and blend
//! the refit with the penalized solution.
//!
//! For a point with active set A and blend weight γ the relaxed weights are
//! `γ·β_penalized + (1 − γ)·β_ols(A)`, computed on the standardized scale.

use crate::error::EnetError;
use crate::linalg::faer_ndarray::{FaerCholesky, fast_ata, fast_atv};
use crate::linalg::utils::{RidgePlanner, add_ridge, kahan_sum};
use crate::path::{PathPoint, RegularizationPath};
use crate::standardize::{Standardized, standardize};
use crate::types::CoefficientVector;
use faer::Side;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

/// Ridge escalations tried before a singular active-set system is reported.
const MAX_RIDGE_ATTEMPTS: usize = 12;

fn validate_gamma(gamma: f64) -> Result<(), EnetError> {
    if !(gamma.is_finite() && (0.0..=1.0).contains(&gamma)) {
        return Err(EnetError::InvalidInput(format!(
            "relaxation weight gamma must lie in [0, 1], got {gamma}"
        )));
    }
    Ok(())
}

/// Unpenalized least squares on `active` columns of the standardized design.
fn active_set_least_squares(
    standardized: &Standardized,
    active: &[usize],
) -> Result<Array1<f64>, EnetError> {
    let xa = standardized.x.select(Axis(1), active);
    let gram = fast_ata(&xa);
    let rhs = fast_atv(&xa, &standardized.y);
    let mut planner = RidgePlanner::new(&gram);
    loop {
        let system = add_ridge(&gram, planner.ridge());
        match system.cholesky(Side::Lower) {
            Ok(factor) => {
                if planner.attempts() > 0 {
                    log::warn!(
                        "active-set refit on {} columns needed ridge {:.3e} after {} attempts",
                        active.len(),
                        planner.ridge(),
                        planner.attempts()
                    );
                }
                return Ok(factor.solve_vec(&rhs));
            }
            Err(err) if planner.attempts() >= MAX_RIDGE_ATTEMPTS => return Err(err.into()),
            Err(_) => planner.bump(),
        }
    }
}

/// Relaxed version of one coefficient vector fit on `standardized`.
pub fn relax_point(
    standardized: &Standardized,
    coefficients: &CoefficientVector,
    gamma: f64,
) -> Result<CoefficientVector, EnetError> {
    validate_gamma(gamma)?;
    if coefficients.n_features() != standardized.n_features() {
        return Err(EnetError::SchemaMismatch {
            expected: standardized.n_features(),
            actual: coefficients.n_features(),
        });
    }
    let state = &standardized.state;
    let penalized = state.to_standardized(coefficients);
    let active: Vec<usize> = penalized
        .iter()
        .enumerate()
        .filter(|&(_, b)| *b != 0.0)
        .map(|(j, _)| j)
        .collect();
    if active.is_empty() || gamma == 1.0 {
        return Ok(state.to_original(penalized.view()));
    }

    let refit = active_set_least_squares(standardized, &active)?;
    let mut blended = Array1::<f64>::zeros(penalized.len());
    for (&j, &ols) in active.iter().zip(refit.iter()) {
        blended[j] = gamma * penalized[j] + (1.0 - gamma) * ols;
    }
    Ok(state.to_original(blended.view()))
}

fn deviance_ratio(standardized: &Standardized, beta: ArrayView1<'_, f64>) -> f64 {
    let tss = kahan_sum(standardized.y.iter().map(|v| v * v));
    if tss <= 0.0 {
        return 0.0;
    }
    let fitted = standardized.x.dot(&beta);
    let rss = kahan_sum(
        standardized
            .y
            .iter()
            .zip(fitted.iter())
            .map(|(y, f)| (y - f) * (y - f)),
    );
    1.0 - rss / tss
}

/// Relax every point of `path`, which must have been fit on `x` and `y`.
pub fn relaxed_path(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    path: &RegularizationPath,
    gamma: f64,
) -> Result<RegularizationPath, EnetError> {
    validate_gamma(gamma)?;
    if x.ncols() != path.n_features() {
        return Err(EnetError::SchemaMismatch {
            expected: path.n_features(),
            actual: x.ncols(),
        });
    }
    let standardized = standardize(x, y)?;
    if standardized.state != path.standardization {
        return Err(EnetError::InvalidInput(
            "relaxation data differ from the data the path was fit on".to_string(),
        ));
    }

    let points = path
        .points
        .iter()
        .map(|point| {
            let coefficients = relax_point(&standardized, &point.coefficients, gamma)?;
            let beta = standardized.state.to_standardized(&coefficients);
            Ok(PathPoint {
                lambda: point.lambda,
                active_count: point.active_count,
                deviance_ratio: deviance_ratio(&standardized, beta.view()),
                iterations: point.iterations,
                status: point.status,
                coefficients,
            })
        })
        .collect::<Result<Vec<_>, EnetError>>()?;

    Ok(RegularizationPath {
        alpha: path.alpha,
        points,
        standardization: standardized.state,
        diagnostics: path.diagnostics.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::fit_path;
    use crate::types::PathConfig;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((50, 5), |(i, j)| {
            ((i as f64 + 0.5) * (j as f64 + 1.3)).sin() + 0.2 * ((i + j) % 3) as f64
        });
        let y = Array1::from_shape_fn(50, |i| {
            3.0 * x[[i, 0]] - 2.0 * x[[i, 3]] + 0.1 * ((i * 11 % 7) as f64 - 3.0)
        });
        (x, y)
    }

    fn ols_with_intercept(x: &Array2<f64>, y: &Array1<f64>, cols: &[usize]) -> (f64, Array1<f64>) {
        let xa = x.select(Axis(1), cols);
        let means = xa.mean_axis(Axis(0)).unwrap();
        let y_mean = y.mean().unwrap();
        let xc = &xa - &means;
        let yc = y - y_mean;
        let beta = xc
            .t()
            .dot(&xc)
            .cholesky(Side::Lower)
            .unwrap()
            .solve_vec(&xc.t().dot(&yc));
        (y_mean - beta.dot(&means), beta)
    }

    #[test]
    fn gamma_one_reproduces_the_path() {
        let (x, y) = data();
        let cfg = PathConfig {
            n_lambda: 20,
            ..PathConfig::default()
        };
        let path = fit_path(x.view(), y.view(), 1.0, None, &cfg).unwrap();
        let relaxed = relaxed_path(x.view(), y.view(), &path, 1.0).unwrap();
        for (a, b) in path.points.iter().zip(relaxed.points.iter()) {
            assert_abs_diff_eq!(a.coefficients.intercept, b.coefficients.intercept, epsilon = 1e-10);
            for (wa, wb) in a.coefficients.weights.iter().zip(b.coefficients.weights.iter()) {
                assert_abs_diff_eq!(wa, wb, epsilon = 1e-10);
            }
            assert_abs_diff_eq!(a.deviance_ratio, b.deviance_ratio, epsilon = 1e-8);
        }
    }

    #[test]
    fn gamma_zero_is_least_squares_on_the_active_set() {
        let (x, y) = data();
        let cfg = PathConfig {
            n_lambda: 20,
            ..PathConfig::default()
        };
        let path = fit_path(x.view(), y.view(), 1.0, None, &cfg).unwrap();
        let relaxed = relaxed_path(x.view(), y.view(), &path, 0.0).unwrap();
        let k = path
            .points
            .iter()
            .position(|p| p.active_count >= 2)
            .expect("an index with two active features");
        let active = path.points[k].coefficients.active_features();
        let (b0, beta) = ols_with_intercept(&x, &y, &active);
        let got = &relaxed.points[k].coefficients;
        assert_abs_diff_eq!(got.intercept, b0, epsilon = 1e-8);
        for (&j, b) in active.iter().zip(beta.iter()) {
            assert_abs_diff_eq!(got.weights[j], *b, epsilon = 1e-8);
        }
        assert_eq!(got.nonzero_count(), active.len());
        assert!(relaxed.points[k].deviance_ratio >= path.points[k].deviance_ratio);
    }

    #[test]
    fn bad_gamma_and_foreign_data_are_rejected() {
        let (x, y) = data();
        let path = fit_path(x.view(), y.view(), 1.0, None, &PathConfig::default()).unwrap();
        assert!(matches!(
            relaxed_path(x.view(), y.view(), &path, 1.5),
            Err(EnetError::InvalidInput(_))
        ));
        let shifted = &y + 1.0;
        assert!(matches!(
            relaxed_path(x.view(), shifted.view(), &path, 0.5),
            Err(EnetError::InvalidInput(_))
        ));
        let narrow = x.select(Axis(1), &[0, 1]);
        assert!(matches!(
            relaxed_path(narrow.view(), y.view(), &path, 0.5),
            Err(EnetError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn collinear_active_set_stays_finite() {
        let base = Array1::from_shape_fn(30, |i| (i as f64 * 0.4).sin());
        let mut x = Array2::<f64>::zeros((30, 2));
        x.column_mut(0).assign(&base);
        x.column_mut(1).assign(&(&base * 2.0));
        let y = &base * 1.5;
        let s = standardize(x.view(), y.view()).unwrap();
        let coef = s.state.to_original(ndarray::array![0.4, 0.4].view());
        let relaxed = relax_point(&s, &coef, 0.0).unwrap();
        assert!(relaxed.weights.iter().all(|w| w.is_finite()));
    }
}
