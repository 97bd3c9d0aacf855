//! Column centering and scaling ahead of coordinate descent.
//!
//! Every feature is shifted to mean zero and divided by its population standard
//! deviation, so that `x_jᵀx_j / n = 1` for each informative column. The response
//! is standardized the same way. The transform is kept so fitted coefficients can
//! be reported on the caller's original scale.

use crate::error::{EnetError, FitCoordinates};
use crate::types::CoefficientVector;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};

/// Relative standard-deviation floor below which a column is treated as constant.
const DEGENERATE_SCALE_TOL: f64 = 1e-10;

#[derive(Clone, Debug, PartialEq)]
pub struct StandardizationState {
    pub feature_means: Array1<f64>,
    pub feature_scales: Array1<f64>,
    pub response_mean: f64,
    pub response_scale: f64,
    /// Zero-variance columns; their scale is recorded as 1.
    pub degenerate: Vec<usize>,
}

impl StandardizationState {
    pub fn n_features(&self) -> usize {
        self.feature_means.len()
    }

    pub fn is_degenerate(&self, column: usize) -> bool {
        self.degenerate.binary_search(&column).is_ok()
    }

    /// One `DegenerateFeature` per flagged column, tagged with the fit it came from.
    pub fn diagnostics(&self, at: FitCoordinates) -> Vec<EnetError> {
        self.degenerate
            .iter()
            .map(|&column| EnetError::DegenerateFeature { column, at })
            .collect()
    }

    /// Map standardized-space weights to an original-scale coefficient vector.
    pub fn to_original(&self, beta: ArrayView1<'_, f64>) -> CoefficientVector {
        let mut weights = Array1::<f64>::zeros(beta.len());
        Zip::from(&mut weights)
            .and(&beta)
            .and(&self.feature_scales)
            .for_each(|w, &b, &s| *w = b * self.response_scale / s);
        let shift = weights.dot(&self.feature_means);
        CoefficientVector::new(self.response_mean - shift, weights)
    }

    /// Inverse of [`to_original`](Self::to_original) for the weights.
    pub fn to_standardized(&self, coefficients: &CoefficientVector) -> Array1<f64> {
        let mut beta = Array1::<f64>::zeros(coefficients.n_features());
        Zip::from(&mut beta)
            .and(&coefficients.weights)
            .and(&self.feature_scales)
            .for_each(|b, &w, &s| *b = w * s / self.response_scale);
        for &j in &self.degenerate {
            beta[j] = 0.0;
        }
        beta
    }
}

/// Standardized copies of the inputs plus the transform that produced them.
#[derive(Clone, Debug)]
pub struct Standardized {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub state: StandardizationState,
}

impl Standardized {
    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }
}

pub(crate) fn check_finite(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    at: FitCoordinates,
) -> Result<(), EnetError> {
    if let Some(((i, j), v)) = x.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(EnetError::numerical(
            at,
            format!("design matrix holds {v} at row {i}, column {j}"),
        ));
    }
    if let Some((i, v)) = y.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(EnetError::numerical(
            at,
            format!("response holds {v} at row {i}"),
        ));
    }
    Ok(())
}

pub(crate) fn check_shapes(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), EnetError> {
    let (n, p) = x.dim();
    if n != y.len() {
        return Err(EnetError::InvalidInput(format!(
            "design matrix has {n} rows but the response has {} entries",
            y.len()
        )));
    }
    if n < 2 {
        return Err(EnetError::InvalidInput(format!(
            "at least 2 rows are required, got {n}"
        )));
    }
    if p == 0 {
        return Err(EnetError::InvalidInput(
            "design matrix has no feature columns".to_string(),
        ));
    }
    Ok(())
}

/// Center and scale `x` and `y`. The inputs are left untouched.
pub fn standardize(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
) -> Result<Standardized, EnetError> {
    check_shapes(x, y)?;
    check_finite(x, y, FitCoordinates::default())?;

    let n = x.nrows() as f64;
    let feature_means = x
        .mean_axis(Axis(0))
        .ok_or_else(|| EnetError::InvalidInput("empty design matrix".to_string()))?;

    let mut xs = &x - &feature_means;
    let mut feature_scales = xs.map_axis(Axis(0), |col| (col.dot(&col) / n).sqrt());

    let mut degenerate = Vec::new();
    for (j, (scale, mean)) in feature_scales
        .iter_mut()
        .zip(feature_means.iter())
        .enumerate()
    {
        if *scale <= DEGENERATE_SCALE_TOL * (1.0 + mean.abs()) {
            log::warn!(
                "feature column {} has zero variance (mean {:.6e}); holding its coefficient at zero",
                j,
                mean
            );
            *scale = 1.0;
            degenerate.push(j);
        }
    }
    for (j, mut col) in xs.axis_iter_mut(Axis(1)).enumerate() {
        if degenerate.binary_search(&j).is_ok() {
            col.fill(0.0);
        } else {
            let s = feature_scales[j];
            col.mapv_inplace(|v| v / s);
        }
    }

    let response_mean = y.sum() / n;
    let centered_y = y.mapv(|v| v - response_mean);
    let mut response_scale = (centered_y.dot(&centered_y) / n).sqrt();
    if response_scale <= DEGENERATE_SCALE_TOL * (1.0 + response_mean.abs()) {
        log::warn!("response has zero variance; leaving it unscaled");
        response_scale = 1.0;
    }
    let ys = centered_y.mapv(|v| v / response_scale);

    Ok(Standardized {
        x: xs,
        y: ys,
        state: StandardizationState {
            feature_means,
            feature_scales,
            response_mean,
            response_scale,
            degenerate,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn columns_have_zero_mean_and_unit_population_variance() {
        let x = array![[1.0, 10.0], [2.0, 20.0], [3.0, 60.0], [6.0, 10.0]];
        let y = array![1.0, 2.0, 3.0, 10.0];
        let s = standardize(x.view(), y.view()).expect("standardize");
        for col in s.x.axis_iter(Axis(1)) {
            assert_abs_diff_eq!(col.sum(), 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(col.dot(&col) / 4.0, 1.0, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(s.y.sum(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.y.dot(&s.y) / 4.0, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.state.feature_means[0], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.state.response_mean, 4.0, epsilon = 1e-12);
        assert!(s.state.degenerate.is_empty());
    }

    #[test]
    fn constant_column_is_flagged_not_dropped() {
        let x = array![[1.0, 5.0], [2.0, 5.0], [4.0, 5.0]];
        let y = array![1.0, 2.0, 4.0];
        let s = standardize(x.view(), y.view()).expect("standardize");
        assert_eq!(s.n_features(), 2);
        assert_eq!(s.state.degenerate, vec![1]);
        assert!(s.state.is_degenerate(1));
        assert_eq!(s.state.feature_scales[1], 1.0);
        assert!(s.x.column(1).iter().all(|v| *v == 0.0));
        let diags = s.state.diagnostics(FitCoordinates::alpha(0.5).with_fold(Some(2)));
        assert_eq!(diags.len(), 1);
        assert!(matches!(diags[0], EnetError::DegenerateFeature { column: 1, .. }));
        let at = diags[0].coordinates().expect("coordinates");
        assert_eq!((at.alpha, at.fold), (Some(0.5), Some(2)));
    }

    #[test]
    fn coefficients_round_trip_between_scales() {
        let x = array![[1.0, -3.0], [2.0, 0.5], [4.0, 2.0], [8.0, 1.0]];
        let y = array![0.0, 1.0, 5.0, 2.0];
        let s = standardize(x.view(), y.view()).expect("standardize");
        let beta = array![0.3, -0.7];
        let coef = s.state.to_original(beta.view());
        let back = s.state.to_standardized(&coef);
        assert_abs_diff_eq!(back[0], 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(back[1], -0.7, epsilon = 1e-12);

        // Predictions agree in both spaces.
        let std_pred = s.x.dot(&beta).mapv(|v| v * s.state.response_scale + s.state.response_mean);
        let orig_pred = x.dot(&coef.weights) + coef.intercept;
        for (a, b) in std_pred.iter().zip(orig_pred.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-10);
        }
    }

    #[test]
    fn non_finite_input_is_a_numerical_error() {
        let x = array![[1.0, f64::NAN], [2.0, 1.0]];
        let y = array![1.0, 2.0];
        let err = standardize(x.view(), y.view()).unwrap_err();
        assert!(matches!(err, EnetError::NumericalError { .. }));
        assert!(err.to_string().contains("row 0, column 1"));
    }

    #[test]
    fn shape_errors_are_invalid_input() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0];
        assert!(matches!(
            standardize(x.view(), y.view()),
            Err(EnetError::InvalidInput(_))
        ));
    }
}
