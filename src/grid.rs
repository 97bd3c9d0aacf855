//! Sweep of the mixing value α over a grid, each α cross-validated on the same
//! folds.

use crate::cv::{CrossValidation, FoldAssignment, cross_validate_with_folds};
use crate::error::{EnetError, FitCoordinates};
use crate::lambda::lambda_sequence;
use crate::standardize::{check_finite, check_shapes, standardize};
use crate::types::{CvConfig, GridConfig, PathConfig};
use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag polled before each mixing value starts.
///
/// Clones share the flag, so one handle can be given to another thread and
/// cancelled from there.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// One grid entry and what became of it. Entries skipped after cancellation carry
/// `EnetError::Cancelled`.
#[derive(Clone, Debug)]
pub struct AlphaCandidate {
    pub alpha: f64,
    pub outcome: Result<CrossValidation, EnetError>,
}

impl AlphaCandidate {
    /// Mean held-out error at λ_min, when this entry completed.
    pub fn best_error(&self) -> Option<f64> {
        self.outcome
            .as_ref()
            .ok()
            .map(|cv| cv.lambda_min().mean_error)
    }
}

#[derive(Clone, Debug)]
pub struct GridSearchOutcome {
    pub best_alpha: f64,
    /// Position of the winner in `candidates`.
    pub best_index: usize,
    pub best: CrossValidation,
    /// Every grid entry in grid order.
    pub candidates: Vec<AlphaCandidate>,
    /// Set when at least one entry was skipped because of cancellation.
    pub cancelled: bool,
}

impl GridSearchOutcome {
    pub fn failures(&self) -> impl Iterator<Item = (f64, &EnetError)> {
        self.candidates
            .iter()
            .filter_map(|c| c.outcome.as_ref().err().map(|e| (c.alpha, e)))
    }
}

/// Cross-validate every α in `grid.alphas` and pick the (α, λ) pair with the
/// lowest λ_min error. Ties go to the earlier grid entry.
///
/// Folds are drawn once from `cv.seed` and every α's penalty sequence is
/// generated from the full data before any fit starts. A failing α is recorded
/// and does not stop the others.
pub fn grid_search(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    grid: &GridConfig,
    cv: &CvConfig,
    config: &PathConfig,
    cancel: Option<&CancellationToken>,
) -> Result<GridSearchOutcome, EnetError> {
    run_grid(x, y, grid, cv, config, cancel, |_| {})
}

/// Grid search body. `on_complete` runs after each mixing value that was
/// attempted, before the next cancellation check.
fn run_grid<F>(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    grid: &GridConfig,
    cv: &CvConfig,
    config: &PathConfig,
    cancel: Option<&CancellationToken>,
    on_complete: F,
) -> Result<GridSearchOutcome, EnetError>
where
    F: Fn(&AlphaCandidate) + Sync + Send,
{
    grid.validate()?;
    cv.validate()?;
    config.validate()?;
    check_shapes(x, y)?;
    check_finite(x, y, FitCoordinates::default())?;

    let folds = FoldAssignment::random(x.nrows(), cv.n_folds, cv.seed)?;
    let standardized = standardize(x, y)?;
    let sequences: Vec<Result<Vec<f64>, EnetError>> = grid
        .alphas
        .iter()
        .map(|&alpha| {
            lambda_sequence(
                standardized.x.view(),
                standardized.y.view(),
                alpha,
                config.n_lambda,
                config.lambda_min_ratio,
            )
        })
        .collect();
    drop(standardized);

    let evaluate = |index: usize| -> AlphaCandidate {
        let alpha = grid.alphas[index];
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            log::debug!("[GRID] alpha {} skipped after cancellation", alpha);
            return AlphaCandidate {
                alpha,
                outcome: Err(EnetError::Cancelled),
            };
        }
        let outcome = match &sequences[index] {
            Ok(lambdas) => {
                cross_validate_with_folds(x, y, alpha, Some(lambdas), &folds, cv, config)
            }
            Err(e) => Err(e.clone()),
        };
        if let Err(e) = &outcome {
            log::warn!("[GRID] alpha {} failed: {}", alpha, e);
        }
        let candidate = AlphaCandidate { alpha, outcome };
        on_complete(&candidate);
        candidate
    };

    let n_alphas = grid.alphas.len();
    let candidates: Vec<AlphaCandidate> = if grid.parallel {
        (0..n_alphas).into_par_iter().map(evaluate).collect()
    } else {
        (0..n_alphas).map(evaluate).collect()
    };

    let cancelled = candidates
        .iter()
        .any(|c| matches!(c.outcome, Err(EnetError::Cancelled)));

    let mut best: Option<(usize, f64)> = None;
    for (i, candidate) in candidates.iter().enumerate() {
        let Some(err) = candidate.best_error() else {
            continue;
        };
        match best {
            Some((_, best_err)) if err >= best_err => {}
            _ => best = Some((i, err)),
        }
    }

    let Some((best_index, best_error)) = best else {
        if cancelled {
            return Err(EnetError::Cancelled);
        }
        return Err(candidates
            .into_iter()
            .find_map(|c| c.outcome.err())
            .unwrap_or_else(|| {
                EnetError::InvalidInput("no mixing value produced a finite error".to_string())
            }));
    };

    let best_cv = match &candidates[best_index].outcome {
        Ok(cv) => cv.clone(),
        Err(e) => return Err(e.clone()),
    };
    let best_alpha = candidates[best_index].alpha;
    log::info!(
        "[GRID] best alpha {} | lambda_min {:.6e} | {} {:.6e}{}",
        best_alpha,
        best_cv.lambda_min().lambda,
        cv.measure.label(),
        best_error,
        if cancelled { " | cancelled" } else { "" }
    );

    Ok(GridSearchOutcome {
        best_alpha,
        best_index,
        best: best_cv,
        candidates,
        cancelled,
    })
}
