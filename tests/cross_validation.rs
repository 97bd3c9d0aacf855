use enetpath::{
    CancellationToken, CvConfig, CvMeasure, EnetError, FoldAssignment, GridConfig, PathConfig,
    cross_validate, cross_validate_with_folds, grid_search, predict,
};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

fn sparse_problem(n: usize, p: usize, noise_sd: f64, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let x = Array2::from_shape_fn((n, p), |_| normal.sample(&mut rng));
    let y = Array1::from_shape_fn(n, |i| {
        1.0 + 2.5 * x[[i, 0]] - 1.0 * x[[i, p - 1]] + noise_sd * normal.sample(&mut rng)
    });
    (x, y)
}

fn short_path() -> PathConfig {
    PathConfig {
        n_lambda: 30,
        ..PathConfig::default()
    }
}

#[test]
fn leave_one_out_and_five_fold_give_comparable_curves() {
    let (x, y) = sparse_problem(40, 4, 0.5, 10);
    let loo = CvConfig {
        n_folds: 40,
        ..CvConfig::default()
    };
    let five = CvConfig {
        n_folds: 5,
        ..CvConfig::default()
    };
    let a = cross_validate(x.view(), y.view(), 1.0, &loo, &short_path()).unwrap();
    let b = cross_validate(x.view(), y.view(), 1.0, &five, &short_path()).unwrap();
    assert_eq!(a.fold_errors.nrows(), 40);
    assert_eq!(b.fold_errors.nrows(), 5);
    for res in [&a, &b] {
        assert!(
            res.points
                .iter()
                .all(|p| p.mean_error.is_finite() && p.standard_error.is_finite())
        );
    }
    // Same data, same penalties: the two estimates of the minimum error agree
    // to within a small factor.
    assert_eq!(a.full_path.lambdas(), b.full_path.lambdas());
    let ratio = a.lambda_min().mean_error / b.lambda_min().mean_error;
    assert!((0.5..2.0).contains(&ratio), "ratio {ratio}");
}

#[test]
fn one_standard_error_rule_never_picks_a_smaller_penalty() {
    for seed in 0..5 {
        let (x, y) = sparse_problem(50, 6, 1.0, seed);
        let cv = CvConfig {
            n_folds: 5,
            seed,
            ..CvConfig::default()
        };
        for alpha in [0.2, 1.0] {
            let res = cross_validate(x.view(), y.view(), alpha, &cv, &short_path()).unwrap();
            let min = res.lambda_min();
            let one_se = res.lambda_1se();
            assert!(one_se.lambda >= min.lambda);
            assert!(one_se.index <= min.index);
            assert!(one_se.mean_error <= min.mean_error + min.standard_error);
        }
    }
}

#[test]
fn three_feature_scenario_selects_the_signal_and_predicts_held_out_rows() {
    let mut rng = StdRng::seed_from_u64(2024);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let n = 100;
    let x = Array2::from_shape_fn((n, 3), |_| normal.sample(&mut rng));
    let y = Array1::from_shape_fn(n, |i| 4.0 * x[[i, 0]] + rng.random_range(-0.02..0.02));

    let train: Vec<usize> = (0..80).collect();
    let test: Vec<usize> = (80..100).collect();
    let x_train = x.select(Axis(0), &train);
    let y_train = y.select(Axis(0), &train);
    let x_test = x.select(Axis(0), &test);
    let y_test = y.select(Axis(0), &test);

    let cv = CvConfig {
        n_folds: 5,
        seed: 1,
        ..CvConfig::default()
    };
    let res = cross_validate(x_train.view(), y_train.view(), 1.0, &cv, &PathConfig::default())
        .unwrap();

    // Large penalties keep only the correlated feature.
    let lmax = res.full_path.points[0].lambda;
    for point in res.full_path.points.iter().filter(|p| p.lambda > 0.5 * lmax) {
        let active = point.coefficients.active_features();
        assert!(active.is_empty() || active == vec![0], "active set {active:?}");
    }
    assert!(
        res.full_path
            .points
            .iter()
            .any(|p| p.coefficients.active_features() == vec![0])
    );

    let preds = predict(&res.lambda_min().coefficients, x_test.view()).unwrap();
    let mse = (&preds - &y_test).mapv(|r| r * r).mean().unwrap();
    assert!(mse < 1e-2, "held-out mse {mse}");
}

#[test]
fn parallel_and_sequential_cross_validation_are_identical() {
    let (x, y) = sparse_problem(90, 12, 0.8, 3);
    let seq = CvConfig {
        n_folds: 6,
        seed: 9,
        parallel: false,
        ..CvConfig::default()
    };
    let par = CvConfig {
        parallel: true,
        ..seq.clone()
    };
    let a = cross_validate(x.view(), y.view(), 0.6, &seq, &short_path()).unwrap();
    let b = cross_validate(x.view(), y.view(), 0.6, &par, &short_path()).unwrap();
    assert_eq!(a.fold_errors, b.fold_errors);
    assert_eq!(a.points, b.points);
    assert_eq!(a.selection, b.selection);
}

#[test]
fn repeated_cross_validation_is_reproducible() {
    let (x, y) = sparse_problem(45, 5, 0.5, 4);
    let cv = CvConfig {
        n_folds: 5,
        seed: 77,
        measure: CvMeasure::Mae,
        ..CvConfig::default()
    };
    let a = cross_validate(x.view(), y.view(), 0.5, &cv, &short_path()).unwrap();
    let b = cross_validate(x.view(), y.view(), 0.5, &cv, &short_path()).unwrap();
    assert_eq!(a.fold_errors, b.fold_errors);
    assert_eq!(a.selection, b.selection);
}

#[test]
fn explicit_folds_drive_the_split() {
    let (x, y) = sparse_problem(30, 3, 0.5, 5);
    let ids: Vec<usize> = (0..30).map(|i| i / 10).collect();
    let folds = FoldAssignment::from_fold_ids(ids).unwrap();
    let res = cross_validate_with_folds(
        x.view(),
        y.view(),
        1.0,
        None,
        &folds,
        &CvConfig::default(),
        &short_path(),
    )
    .unwrap();
    assert_eq!(res.fold_errors.nrows(), 3);
}

#[test]
fn column_constant_inside_one_fold_is_reported_for_that_fold() {
    let (mut x, y) = sparse_problem(30, 3, 0.5, 8);
    // Column 1 varies only on the rows of fold 0, so fold 0's training rows see
    // a constant column while the full data and the other folds do not.
    for i in 0..30 {
        x[[i, 1]] = if i < 10 { (i as f64 + 1.0) * 0.3 } else { 0.0 };
    }
    let ids: Vec<usize> = (0..30).map(|i| i / 10).collect();
    let folds = FoldAssignment::from_fold_ids(ids).unwrap();
    let res = cross_validate_with_folds(
        x.view(),
        y.view(),
        1.0,
        None,
        &folds,
        &CvConfig {
            parallel: false,
            ..CvConfig::default()
        },
        &short_path(),
    )
    .unwrap();
    let degenerate: Vec<(usize, Option<f64>, Option<usize>)> = res
        .diagnostics
        .iter()
        .filter_map(|d| match d {
            EnetError::DegenerateFeature { column, at } => Some((*column, at.alpha, at.fold)),
            _ => None,
        })
        .collect();
    assert_eq!(degenerate, vec![(1, Some(1.0), Some(0))]);
    assert!(res.diagnostics.iter().all(EnetError::is_recoverable));
}

#[test]
fn capped_fold_fits_surface_their_fold() {
    let (x, y) = sparse_problem(40, 5, 0.5, 6);
    let cfg = PathConfig {
        max_iterations: 1,
        tolerance: 1e-14,
        n_lambda: 10,
        ..PathConfig::default()
    };
    let cv = CvConfig {
        n_folds: 4,
        ..CvConfig::default()
    };
    let res = cross_validate(x.view(), y.view(), 1.0, &cv, &cfg).unwrap();
    let folds: Vec<Option<usize>> = res
        .diagnostics
        .iter()
        .filter(|d| matches!(d, EnetError::ConvergenceFailure { .. }))
        .filter_map(|d| d.coordinates())
        .map(|c| c.fold)
        .collect();
    assert!(folds.contains(&None));
    assert!(folds.iter().any(|f| f.is_some()));
    assert!(res.diagnostics.iter().all(EnetError::is_recoverable));
}

#[test]
fn grid_search_prefers_lasso_on_a_sparse_problem_and_reports_every_alpha() {
    let (x, y) = sparse_problem(120, 30, 0.5, 11);
    let grid = GridConfig {
        alphas: vec![0.0, 0.25, 0.5, 0.75, 1.0],
        parallel: true,
    };
    let cv = CvConfig {
        n_folds: 5,
        seed: 2,
        ..CvConfig::default()
    };
    let out = grid_search(x.view(), y.view(), &grid, &cv, &short_path(), None).unwrap();
    assert!(!out.cancelled);
    assert_eq!(out.candidates.len(), 5);
    assert!(out.candidates.iter().all(|c| c.outcome.is_ok()));
    let alphas: Vec<f64> = out.candidates.iter().map(|c| c.alpha).collect();
    assert_eq!(alphas, grid.alphas);
    assert!(out.best_alpha > 0.0);
    let best_err = out.best.lambda_min().mean_error;
    assert!(
        out.candidates
            .iter()
            .filter_map(|c| c.best_error())
            .all(|e| e >= best_err)
    );
}

#[test]
fn grid_search_honours_a_cancelled_token() {
    let (x, y) = sparse_problem(40, 4, 0.5, 12);
    let token = CancellationToken::new();
    token.cancel();
    let res = grid_search(
        x.view(),
        y.view(),
        &GridConfig::default(),
        &CvConfig {
            n_folds: 4,
            ..CvConfig::default()
        },
        &short_path(),
        Some(&token),
    );
    assert!(matches!(res, Err(EnetError::Cancelled)));
}

#[test]
fn grid_search_runs_to_completion_with_a_live_token() {
    let (x, y) = sparse_problem(40, 4, 0.5, 13);
    let token = CancellationToken::new();
    let out = grid_search(
        x.view(),
        y.view(),
        &GridConfig {
            alphas: vec![0.5, 1.0],
            parallel: false,
        },
        &CvConfig {
            n_folds: 4,
            parallel: false,
            ..CvConfig::default()
        },
        &short_path(),
        Some(&token),
    )
    .unwrap();
    assert!(!out.cancelled);
    assert_eq!(out.failures().count(), 0);
}
