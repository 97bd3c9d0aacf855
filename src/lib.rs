#![deny(dead_code)]
#![deny(unused_imports)]

pub mod cv;
pub mod error;
pub mod grid;
pub mod lambda;
pub mod linalg;
pub mod path;
pub mod predict;
pub mod relax;
pub mod select;
pub mod standardize;
pub mod types;

pub use cv::{CrossValidation, CvPoint, FoldAssignment, cross_validate, cross_validate_with_folds};
pub use error::{EnetError, FitCoordinates};
pub use grid::{AlphaCandidate, CancellationToken, GridSearchOutcome, grid_search};
pub use lambda::{lambda_max, lambda_sequence, validate_lambda_sequence};
pub use path::{
    PathPoint, RegularizationPath, SolveStatus, elastic_net_update, fit_path, soft_threshold,
};
pub use predict::{predict, predict_path};
pub use relax::{relax_point, relaxed_path};
pub use select::{SelectedModel, SelectionOutcome, SelectionRule, select, select_indices};
pub use standardize::{StandardizationState, Standardized, standardize};
pub use types::{
    CoefficientVector, CvConfig, CvMeasure, EngineConfig, GridConfig, PathConfig, UpdateMode,
};
