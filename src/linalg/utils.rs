use ndarray::Array2;

const MIN_RIDGE_SCALE: f64 = 1e-10;
const RIDGE_GROWTH: f64 = 10.0;

#[derive(Default, Clone, Copy)]
pub(crate) struct KahanSum {
    sum: f64,
    c: f64,
}

impl KahanSum {
    pub(crate) fn add(&mut self, value: f64) {
        let y = value - self.c;
        let t = self.sum + y;
        self.c = (t - self.sum) - y;
        self.sum = t;
    }

    pub(crate) fn sum(self) -> f64 {
        self.sum
    }
}

pub(crate) fn kahan_sum<I>(iter: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let mut acc = KahanSum::default();
    for value in iter {
        acc.add(value);
    }
    acc.sum()
}

pub(crate) fn max_abs_diag(matrix: &Array2<f64>) -> f64 {
    matrix
        .diag()
        .iter()
        .copied()
        .map(f64::abs)
        .fold(0.0, f64::max)
        .max(1.0)
}

pub(crate) fn add_ridge(matrix: &Array2<f64>, ridge: f64) -> Array2<f64> {
    if ridge <= 0.0 {
        return matrix.clone();
    }
    let mut regularized = matrix.clone();
    let n = regularized.nrows();
    for i in 0..n {
        regularized[[i, i]] += ridge;
    }
    regularized
}

/// Escalating diagonal ridge for normal-equation solves that fail to factorize.
///
/// The first attempt is unregularized; every bump multiplies the ridge by ten,
/// starting from `1e-10` times the largest diagonal entry.
#[derive(Clone)]
pub(crate) struct RidgePlanner {
    ridge: f64,
    attempts: usize,
    scale: f64,
}

impl RidgePlanner {
    pub(crate) fn new(matrix: &Array2<f64>) -> Self {
        Self {
            ridge: 0.0,
            attempts: 0,
            scale: max_abs_diag(matrix),
        }
    }

    pub(crate) fn ridge(&self) -> f64 {
        self.ridge
    }

    pub(crate) fn bump(&mut self) {
        self.attempts += 1;
        let min_step = self.scale * MIN_RIDGE_SCALE;
        self.ridge = if self.ridge <= 0.0 {
            min_step
        } else {
            (self.ridge * RIDGE_GROWTH).max(min_step)
        };
        if !self.ridge.is_finite() {
            self.ridge = self.scale;
        }
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts
    }
}
