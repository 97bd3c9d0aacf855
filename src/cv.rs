//! K-fold cross-validation over a shared penalty sequence.
//!
//! The full-data path is fit first and its penalties are reused by every fold, so
//! the per-fold error curves line up index by index.

use crate::error::EnetError;
use crate::path::{RegularizationPath, fit_path_at};
use crate::predict::predict_path;
use crate::select::{SelectedModel, SelectionOutcome, SelectionRule, select};
use crate::types::{CvConfig, CvMeasure, PathConfig, validate_alpha};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::{SeedableRng, rngs::StdRng};
use rayon::prelude::*;

/// Row-to-fold mapping. Every row belongs to exactly one fold and no fold is empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FoldAssignment {
    fold_of: Vec<usize>,
    n_folds: usize,
}

impl FoldAssignment {
    /// Shuffle the rows with a seeded generator and deal them round-robin, so fold
    /// sizes differ by at most one.
    pub fn random(n_rows: usize, n_folds: usize, seed: u64) -> Result<Self, EnetError> {
        if n_folds < 2 {
            return Err(EnetError::InvalidInput(format!(
                "cross-validation needs at least 2 folds, got {n_folds}"
            )));
        }
        if n_folds > n_rows {
            return Err(EnetError::InvalidInput(format!(
                "{n_folds} folds requested but only {n_rows} rows are available"
            )));
        }
        let mut order: Vec<usize> = (0..n_rows).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        order.shuffle(&mut rng);
        let mut fold_of = vec![0; n_rows];
        for (position, &row) in order.iter().enumerate() {
            fold_of[row] = position % n_folds;
        }
        Ok(Self { fold_of, n_folds })
    }

    /// Caller-supplied fold ids. Ids must cover `0..k` with no gaps, `k ≥ 2`.
    pub fn from_fold_ids(ids: Vec<usize>) -> Result<Self, EnetError> {
        let n_folds = ids.iter().copied().max().map_or(0, |m| m + 1);
        if n_folds < 2 {
            return Err(EnetError::InvalidInput(
                "explicit fold ids must name at least 2 folds".to_string(),
            ));
        }
        let mut sizes = vec![0usize; n_folds];
        for &id in &ids {
            sizes[id] += 1;
        }
        if let Some(empty) = sizes.iter().position(|&s| s == 0) {
            return Err(EnetError::InvalidInput(format!(
                "fold {empty} has no rows; fold ids must be contiguous from 0"
            )));
        }
        Ok(Self {
            fold_of: ids,
            n_folds,
        })
    }

    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    pub fn n_rows(&self) -> usize {
        self.fold_of.len()
    }

    pub fn fold_of(&self, row: usize) -> Option<usize> {
        self.fold_of.get(row).copied()
    }

    pub fn held_out(&self, fold: usize) -> Vec<usize> {
        self.rows_where(|f| f == fold)
    }

    pub fn training(&self, fold: usize) -> Vec<usize> {
        self.rows_where(|f| f != fold)
    }

    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_folds];
        for &f in &self.fold_of {
            sizes[f] += 1;
        }
        sizes
    }

    fn rows_where(&self, keep: impl Fn(usize) -> bool) -> Vec<usize> {
        self.fold_of
            .iter()
            .enumerate()
            .filter(|&(_, &f)| keep(f))
            .map(|(row, _)| row)
            .collect()
    }
}

/// Aggregated held-out error at one penalty.
#[derive(Clone, Debug, PartialEq)]
pub struct CvPoint {
    pub lambda: f64,
    pub mean_error: f64,
    /// Sample standard deviation of the fold errors divided by √k.
    pub standard_error: f64,
    /// Non-zero weights of the full-data fit at this penalty.
    pub nonzero: usize,
}

#[derive(Clone, Debug)]
pub struct CrossValidation {
    pub alpha: f64,
    pub measure: CvMeasure,
    pub points: Vec<CvPoint>,
    /// Held-out error per fold (rows) and penalty (columns).
    pub fold_errors: Array2<f64>,
    pub full_path: RegularizationPath,
    pub selection: SelectionOutcome,
    /// Recoverable conditions from the full fit followed by those from each fold.
    pub diagnostics: Vec<EnetError>,
}

impl CrossValidation {
    pub fn lambda_min(&self) -> &SelectedModel {
        &self.selection.lambda_min
    }

    pub fn lambda_1se(&self) -> &SelectedModel {
        &self.selection.lambda_1se
    }

    pub fn selected(&self, rule: SelectionRule) -> &SelectedModel {
        self.selection.get(rule)
    }
}

struct FoldFit {
    errors: Array1<f64>,
    diagnostics: Vec<EnetError>,
}

fn held_out_errors(
    predictions: &Array2<f64>,
    truth: ArrayView1<'_, f64>,
    measure: CvMeasure,
) -> Array1<f64> {
    let residuals = predictions - &truth.insert_axis(Axis(1));
    let per_row = match measure {
        CvMeasure::Mse => residuals.mapv(|r| r * r),
        CvMeasure::Mae => residuals.mapv(f64::abs),
    };
    per_row
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::from_elem(predictions.ncols(), f64::NAN))
}

fn fit_fold(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    alpha: f64,
    lambdas: &[f64],
    folds: &FoldAssignment,
    fold: usize,
    measure: CvMeasure,
    config: &PathConfig,
) -> Result<FoldFit, EnetError> {
    let train = folds.training(fold);
    let test = folds.held_out(fold);
    let x_train = x.select(Axis(0), &train);
    let y_train = y.select(Axis(0), &train);
    let path = fit_path_at(
        x_train.view(),
        y_train.view(),
        alpha,
        Some(lambdas),
        config,
        Some(fold),
    )?;
    let x_test = x.select(Axis(0), &test);
    let y_test = y.select(Axis(0), &test);
    let predictions = predict_path(&path, x_test.view())?;
    let errors = held_out_errors(&predictions, y_test.view(), measure);
    log::debug!(
        "[CV] alpha {} | fold {} | train {} | held out {} | best {} {:.6e}",
        alpha,
        fold,
        train.len(),
        test.len(),
        measure.label(),
        errors.iter().copied().fold(f64::INFINITY, f64::min)
    );
    Ok(FoldFit {
        errors,
        diagnostics: path.diagnostics,
    })
}

/// Cross-validate one mixing value with folds drawn from `cv.seed`.
pub fn cross_validate(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    alpha: f64,
    cv: &CvConfig,
    config: &PathConfig,
) -> Result<CrossValidation, EnetError> {
    cv.validate()?;
    let folds = FoldAssignment::random(x.nrows(), cv.n_folds, cv.seed)?;
    cross_validate_with_folds(x, y, alpha, None, &folds, cv, config)
}

/// Cross-validate one mixing value with a fixed fold assignment.
///
/// `cv.n_folds` and `cv.seed` are ignored in favour of `folds`. A supplied penalty
/// sequence is used for the full-data fit and every fold.
///
/// Each fold standardizes its own training rows, response included, so the shared
/// λ values are on each fold's standardized scale. On the original scale a fold's
/// penalty therefore differs from the full-data one by the ratio of the response
/// standard deviations.
pub fn cross_validate_with_folds(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    alpha: f64,
    lambdas: Option<&[f64]>,
    folds: &FoldAssignment,
    cv: &CvConfig,
    config: &PathConfig,
) -> Result<CrossValidation, EnetError> {
    validate_alpha(alpha)?;
    if folds.n_rows() != x.nrows() {
        return Err(EnetError::InvalidInput(format!(
            "fold assignment covers {} rows but the design matrix has {}",
            folds.n_rows(),
            x.nrows()
        )));
    }

    let full_path = fit_path_at(x, y, alpha, lambdas, config, None)?;
    let lambdas = full_path.lambdas();
    let k = folds.n_folds();

    let run = |fold: usize| fit_fold(x, y, alpha, &lambdas, folds, fold, cv.measure, config);
    let fold_fits: Vec<FoldFit> = if cv.parallel {
        (0..k).into_par_iter().map(run).collect::<Result<_, _>>()?
    } else {
        (0..k).map(run).collect::<Result<_, _>>()?
    };

    let mut fold_errors = Array2::<f64>::zeros((k, lambdas.len()));
    let mut diagnostics = full_path.diagnostics.clone();
    for (fold, fit) in fold_fits.into_iter().enumerate() {
        fold_errors.row_mut(fold).assign(&fit.errors);
        diagnostics.extend(fit.diagnostics);
    }

    let kf = k as f64;
    let points: Vec<CvPoint> = fold_errors
        .axis_iter(Axis(1))
        .zip(full_path.points.iter())
        .map(|(column, point)| {
            let mean = column.sum() / kf;
            let variance = column.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / (kf - 1.0);
            CvPoint {
                lambda: point.lambda,
                mean_error: mean,
                standard_error: (variance / kf).sqrt(),
                nonzero: point.active_count,
            }
        })
        .collect();

    let selection = select(&points, &full_path)?;
    log::debug!(
        "[CV] alpha {} | lambda_min {:.6e} ({} {:.6e}) | lambda_1se {:.6e}",
        alpha,
        selection.lambda_min.lambda,
        cv.measure.label(),
        selection.lambda_min.mean_error,
        selection.lambda_1se.lambda
    );

    Ok(CrossValidation {
        alpha,
        measure: cv.measure,
        points,
        fold_errors,
        full_path,
        selection,
        diagnostics,
    })
}
