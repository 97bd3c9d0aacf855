//! Penalty selection from a cross-validated error curve.

use crate::cv::CvPoint;
use crate::error::{EnetError, FitCoordinates};
use crate::path::RegularizationPath;
use crate::types::CoefficientVector;
use serde::{Deserialize, Serialize};

/// Which of the two selected penalties a caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SelectionRule {
    /// Lowest mean held-out error.
    #[default]
    #[serde(rename = "min")]
    Min,
    /// Largest penalty within one standard error of the minimum.
    #[serde(rename = "1se")]
    OneStandardError,
}

impl SelectionRule {
    pub fn label(self) -> &'static str {
        match self {
            SelectionRule::Min => "lambda_min",
            SelectionRule::OneStandardError => "lambda_1se",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectedModel {
    /// Position on the path and on the error curve.
    pub index: usize,
    pub lambda: f64,
    pub mean_error: f64,
    pub standard_error: f64,
    pub nonzero: usize,
    /// Full-data coefficients at this penalty.
    pub coefficients: CoefficientVector,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectionOutcome {
    pub lambda_min: SelectedModel,
    pub lambda_1se: SelectedModel,
}

impl SelectionOutcome {
    pub fn get(&self, rule: SelectionRule) -> &SelectedModel {
        match rule {
            SelectionRule::Min => &self.lambda_min,
            SelectionRule::OneStandardError => &self.lambda_1se,
        }
    }
}

/// Indices of λ_min and λ_1se on a curve ordered by decreasing penalty.
///
/// Non-finite errors are ignored. Ties for the minimum go to the larger penalty.
/// The 1-SE index never exceeds the minimum index.
pub fn select_indices(points: &[CvPoint]) -> Result<(usize, usize), EnetError> {
    if points.is_empty() {
        return Err(EnetError::InvalidInput(
            "cannot select a penalty from an empty error curve".to_string(),
        ));
    }
    let mut best: Option<(usize, f64)> = None;
    for (i, point) in points.iter().enumerate() {
        if !point.mean_error.is_finite() {
            continue;
        }
        match best {
            Some((_, err)) if point.mean_error >= err => {}
            _ => best = Some((i, point.mean_error)),
        }
    }
    let Some((min_index, min_error)) = best else {
        return Err(EnetError::numerical(
            FitCoordinates::default(),
            "every cross-validated error is non-finite",
        ));
    };

    let se = points[min_index].standard_error;
    let threshold = min_error + if se.is_finite() { se } else { 0.0 };
    let one_se_index = points
        .iter()
        .position(|p| p.mean_error.is_finite() && p.mean_error <= threshold)
        .unwrap_or(min_index);
    Ok((min_index, one_se_index))
}

/// λ_min and λ_1se with the full-data coefficients they pick out of `path`.
pub fn select(
    points: &[CvPoint],
    path: &RegularizationPath,
) -> Result<SelectionOutcome, EnetError> {
    if points.len() != path.len() {
        return Err(EnetError::InvalidInput(format!(
            "error curve has {} points but the path has {}",
            points.len(),
            path.len()
        )));
    }
    let (min_index, one_se_index) =
        select_indices(points).map_err(|e| e.with_alpha(path.alpha))?;
    let model = |index: usize| SelectedModel {
        index,
        lambda: points[index].lambda,
        mean_error: points[index].mean_error,
        standard_error: points[index].standard_error,
        nonzero: points[index].nonzero,
        coefficients: path.points[index].coefficients.clone(),
    };
    Ok(SelectionOutcome {
        lambda_min: model(min_index),
        lambda_1se: model(one_se_index),
    })
}
