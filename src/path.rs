//! Cyclical coordinate descent along a decreasing penalty sequence.
//!
//! Each penalty is solved on the standardized problem
//!
//! ```text
//! (1/2n)‖y − Xβ‖² + λ(α‖β‖₁ + (1−α)/2‖β‖²)
//! ```
//!
//! warm-started from the previous solution. Because every informative column has
//! unit mean square, the coordinate minimizer is a soft-threshold followed by a
//! ridge shrink.

use crate::error::{EnetError, FitCoordinates};
use crate::lambda::{lambda_sequence, validate_lambda_sequence};
use crate::linalg::faer_ndarray::{fast_ata, fast_atv};
use crate::linalg::utils::kahan_sum;
use crate::standardize::{StandardizationState, check_finite, check_shapes, standardize};
use crate::types::{CoefficientVector, PathConfig, UpdateMode, validate_alpha};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// `Auto` switches from the covariance kernel to the naive kernel at this width.
const COVARIANCE_FEATURE_LIMIT: usize = 500;
/// Sweeps a coefficient must stay at zero before it leaves the active set.
const ZERO_STREAK_LIMIT: usize = 3;
/// Every this many sweeps all coordinates are visited regardless of the active set.
const FULL_SWEEP_PERIOD: usize = 10;

/// `sign(z)·max(|z| − t, 0)`.
#[inline]
pub fn soft_threshold(z: f64, t: f64) -> f64 {
    if z > t {
        z - t
    } else if z < -t {
        z + t
    } else {
        0.0
    }
}

/// Exact minimizer of the penalized objective along one standardized coordinate,
/// given the partial-residual correlation `z`.
#[inline]
pub fn elastic_net_update(z: f64, lambda: f64, alpha: f64) -> f64 {
    soft_threshold(z, lambda * alpha) / (1.0 + lambda * (1.0 - alpha))
}

/// How the inner loop at one penalty ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    /// A full sweep moved no coefficient by more than the tolerance.
    Converged,
    /// The sweep cap was hit; the coefficients are the last iterate.
    MaxIterationsReached,
}

#[derive(Clone, Debug)]
pub struct PathPoint {
    pub lambda: f64,
    pub coefficients: CoefficientVector,
    pub active_count: usize,
    /// `1 − RSS/TSS` on the standardized training data.
    pub deviance_ratio: f64,
    pub iterations: usize,
    pub status: SolveStatus,
}

/// Solutions for one mixing value across a decreasing penalty sequence.
#[derive(Clone, Debug)]
pub struct RegularizationPath {
    pub alpha: f64,
    pub points: Vec<PathPoint>,
    pub standardization: StandardizationState,
    /// Recoverable conditions met while fitting: degenerate columns and
    /// penalties that hit the sweep cap.
    pub diagnostics: Vec<EnetError>,
}

impl RegularizationPath {
    pub fn lambdas(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.lambda).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.standardization.n_features()
    }

    pub fn point(&self, index: usize) -> Option<&PathPoint> {
        self.points.get(index)
    }

    pub fn convergence_failures(&self) -> impl Iterator<Item = &EnetError> {
        self.diagnostics
            .iter()
            .filter(|d| matches!(d, EnetError::ConvergenceFailure { .. }))
    }

    pub fn all_converged(&self) -> bool {
        self.points
            .iter()
            .all(|p| p.status == SolveStatus::Converged)
    }

    /// Coefficients at an arbitrary penalty, interpolated linearly between the
    /// bracketing path points and clamped to the ends of the path.
    pub fn coefficients_at(&self, lambda: f64) -> Option<CoefficientVector> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        if lambda >= first.lambda {
            return Some(first.coefficients.clone());
        }
        if lambda <= last.lambda {
            return Some(last.coefficients.clone());
        }
        let upper = self
            .points
            .windows(2)
            .position(|w| w[0].lambda >= lambda && lambda >= w[1].lambda)?;
        let hi = &self.points[upper];
        let lo = &self.points[upper + 1];
        let w = (lambda - lo.lambda) / (hi.lambda - lo.lambda);
        let weights = &hi.coefficients.weights * w + &lo.coefficients.weights * (1.0 - w);
        let intercept = hi.coefficients.intercept * w + lo.coefficients.intercept * (1.0 - w);
        Some(CoefficientVector::new(intercept, weights))
    }
}

/// Bookkeeping that makes each coordinate update cheap.
enum Kernel {
    /// Residual `y − Xβ`; each update costs O(n).
    Naive { residual: Array1<f64> },
    /// Gram matrix `XᵀX/n` and gradient `Xᵀ(y − Xβ)/n`; each update costs O(p).
    Covariance {
        gram: Array2<f64>,
        gradient: Array1<f64>,
    },
}

struct LambdaSolve {
    iterations: usize,
    status: SolveStatus,
    max_change: f64,
}

/// Warm-started solver state threaded through the whole path.
struct CoordinateDescent<'a> {
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    alpha: f64,
    beta: Array1<f64>,
    kernel: Kernel,
    zero_streak: Vec<usize>,
    frozen: Vec<bool>,
    n: f64,
    total_sum_squares: f64,
}

impl<'a> CoordinateDescent<'a> {
    fn new(
        x: ArrayView2<'a, f64>,
        y: ArrayView1<'a, f64>,
        alpha: f64,
        state: &StandardizationState,
        mode: UpdateMode,
    ) -> Self {
        let (n_rows, p) = x.dim();
        let n = n_rows as f64;
        let use_covariance = match mode {
            UpdateMode::Naive => false,
            UpdateMode::Covariance => true,
            UpdateMode::Auto => p < COVARIANCE_FEATURE_LIMIT,
        };
        let kernel = if use_covariance {
            let gram = fast_ata(&x) / n;
            let gradient = fast_atv(&x, &y) / n;
            Kernel::Covariance { gram, gradient }
        } else {
            Kernel::Naive {
                residual: y.to_owned(),
            }
        };
        let frozen = (0..p).map(|j| state.is_degenerate(j)).collect();
        Self {
            x,
            y,
            alpha,
            beta: Array1::zeros(p),
            kernel,
            zero_streak: vec![0; p],
            frozen,
            n,
            total_sum_squares: kahan_sum(y.iter().map(|v| v * v)),
        }
    }

    fn is_covariance(&self) -> bool {
        matches!(self.kernel, Kernel::Covariance { .. })
    }

    /// `x_jᵀr/n`, the correlation of column j with the current residual.
    #[inline]
    fn residual_correlation(&self, j: usize) -> f64 {
        match &self.kernel {
            Kernel::Naive { residual } => self.x.column(j).dot(residual) / self.n,
            Kernel::Covariance { gradient, .. } => gradient[j],
        }
    }

    #[inline]
    fn shift(&mut self, j: usize, delta: f64) {
        match &mut self.kernel {
            Kernel::Naive { residual } => residual.scaled_add(-delta, &self.x.column(j)),
            Kernel::Covariance { gram, gradient } => gradient.scaled_add(-delta, &gram.column(j)),
        }
    }

    fn solve(
        &mut self,
        lambda: f64,
        config: &PathConfig,
        at: FitCoordinates,
    ) -> Result<LambdaSolve, EnetError> {
        let p = self.beta.len();
        let mut status = SolveStatus::MaxIterationsReached;
        let mut iterations = 0;
        let mut max_change = f64::INFINITY;
        let mut force_full = true;

        for sweep in 0..config.max_iterations {
            iterations = sweep + 1;
            let full = force_full || !config.active_set || sweep % FULL_SWEEP_PERIOD == 0;
            let mut sweep_change = 0.0_f64;

            for j in 0..p {
                if self.frozen[j] {
                    continue;
                }
                if !full && self.zero_streak[j] >= ZERO_STREAK_LIMIT {
                    continue;
                }
                let old = self.beta[j];
                let z = self.residual_correlation(j) + old;
                if !z.is_finite() {
                    return Err(EnetError::numerical(
                        at,
                        format!("partial residual correlation for feature {j} became {z}"),
                    ));
                }
                let new = elastic_net_update(z, lambda, self.alpha);
                let delta = new - old;
                if delta != 0.0 {
                    self.shift(j, delta);
                    self.beta[j] = new;
                    sweep_change = sweep_change.max(delta.abs());
                }
                if new == 0.0 {
                    self.zero_streak[j] += 1;
                } else {
                    self.zero_streak[j] = 0;
                }
            }

            max_change = sweep_change;
            let scale = self.beta.iter().fold(1.0_f64, |m, b| m.max(b.abs()));
            let settled = sweep_change <= config.tolerance * scale;
            if settled && full {
                status = SolveStatus::Converged;
                break;
            }
            // A quiet partial sweep only proposes convergence; a full sweep confirms it.
            force_full = settled;
        }

        Ok(LambdaSolve {
            iterations,
            status,
            max_change,
        })
    }

    fn deviance_ratio(&self) -> f64 {
        if self.total_sum_squares <= 0.0 {
            return 0.0;
        }
        let rss = match &self.kernel {
            Kernel::Naive { residual } => kahan_sum(residual.iter().map(|r| r * r)),
            Kernel::Covariance { .. } => {
                let fitted = self.x.dot(&self.beta);
                kahan_sum(
                    self.y
                        .iter()
                        .zip(fitted.iter())
                        .map(|(y, f)| (y - f) * (y - f)),
                )
            }
        };
        1.0 - rss / self.total_sum_squares
    }

    fn active_count(&self) -> usize {
        self.beta.iter().filter(|b| **b != 0.0).count()
    }
}

/// Fit the full regularization path for one mixing value.
///
/// When `lambdas` is `None` the sequence is generated from the standardized data
/// using `config.n_lambda` and `config.lambda_min_ratio`. Supplied sequences must be
/// strictly decreasing and are interpreted on the standardized scale.
pub fn fit_path(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    alpha: f64,
    lambdas: Option<&[f64]>,
    config: &PathConfig,
) -> Result<RegularizationPath, EnetError> {
    fit_path_at(x, y, alpha, lambdas, config, None)
}

pub(crate) fn fit_path_at(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    alpha: f64,
    lambdas: Option<&[f64]>,
    config: &PathConfig,
    fold: Option<usize>,
) -> Result<RegularizationPath, EnetError> {
    validate_alpha(alpha)?;
    config.validate()?;
    check_shapes(x, y)?;
    let origin = FitCoordinates::alpha(alpha).with_fold(fold);
    check_finite(x, y, origin)?;

    let standardized = standardize(x, y)?;
    let lambdas = match lambdas {
        Some(seq) => {
            validate_lambda_sequence(seq)?;
            seq.to_vec()
        }
        None => lambda_sequence(
            standardized.x.view(),
            standardized.y.view(),
            alpha,
            config.n_lambda,
            config.lambda_min_ratio,
        )?,
    };

    let state = standardized.state;
    let mut solver = CoordinateDescent::new(
        standardized.x.view(),
        standardized.y.view(),
        alpha,
        &state,
        config.update_mode,
    );
    log::debug!(
        "[PATH] alpha {} | fold {:?} | {} penalties | {} kernel",
        alpha,
        fold,
        lambdas.len(),
        if solver.is_covariance() {
            "covariance"
        } else {
            "naive"
        }
    );

    let mut diagnostics = state.diagnostics(origin);
    let mut points = Vec::with_capacity(lambdas.len());
    for &lambda in &lambdas {
        let at = origin.with_lambda(lambda);
        let outcome = solver.solve(lambda, config, at)?;
        if outcome.status == SolveStatus::MaxIterationsReached {
            let failure = EnetError::ConvergenceFailure {
                at,
                iterations: outcome.iterations,
                max_change: outcome.max_change,
            };
            log::warn!("{failure}");
            diagnostics.push(failure);
        }
        let point = PathPoint {
            lambda,
            coefficients: state.to_original(solver.beta.view()),
            active_count: solver.active_count(),
            deviance_ratio: solver.deviance_ratio(),
            iterations: outcome.iterations,
            status: outcome.status,
        };
        log::debug!(
            "[PATH] lambda {:.6e} | sweeps {:>5} | active {:>4} | dev ratio {:.4}",
            lambda,
            point.iterations,
            point.active_count,
            point.deviance_ratio
        );
        points.push(point);
    }

    Ok(RegularizationPath {
        alpha,
        points,
        standardization: state,
        diagnostics,
    })
}
