// evaluate.rs

use crate::matrix::RoleMatrix;
use crate::predictor::{PredictorError, PredictorSource};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use thiserror::Error;

pub(crate) const DEFAULT_WORKERS: usize = 32;

#[derive(Error, Debug)]
pub(crate) enum EvalError {
    #[error("Predictor for role {role} (column {column}) failed: {source}")]
    Role {
        column: usize,
        role: String,
        #[source]
        source: PredictorError,
    },
    #[error("Column {0} was predicted more than once.")]
    DuplicateColumn(usize),
    #[error("No prediction was produced for column {0}.")]
    MissingColumn(usize),
    #[error("Prediction tagged with column {column}, but the matrix has {num_roles} roles.")]
    ColumnOutOfRange { column: usize, num_roles: usize },
    #[error("Prediction for column {column} has {found} values for {expected} genomes.")]
    ValueCount {
        column: usize,
        found: usize,
        expected: usize,
    },
    #[error("Failed to create progress bar style: {0}")]
    ProgressStyle(String),
}

/// Predicted values for one role, tagged with the matrix column they belong to.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RolePrediction {
    pub(crate) column: usize,
    pub(crate) values: Array1<f64>,
}

/// Predicts column `column` of the matrix from the remaining columns.
pub(crate) fn predict_role(
    matrix: &RoleMatrix,
    source: &dyn PredictorSource,
    column: usize,
) -> Result<RolePrediction, EvalError> {
    let role = matrix.role_id(column);
    let wrap = |source: PredictorError| EvalError::Role {
        column,
        role: role.to_string(),
        source,
    };

    let kept: Vec<usize> = (0..matrix.num_roles()).filter(|&c| c != column).collect();
    let others = matrix.x.select(Axis(1), &kept);

    let features = match source.feature_subset(role).map_err(wrap)? {
        Some(subset) => {
            if let Some(&bad) = subset.iter().find(|&&i| i >= others.ncols()) {
                return Err(wrap(PredictorError::FeatureOutOfRange {
                    index: bad,
                    available: others.ncols(),
                }));
            }
            others.select(Axis(1), &subset)
        }
        None => others,
    };

    let predictor = source.load_predictor(role).map_err(wrap)?;
    let values = predictor.predict(features.view()).map_err(wrap)?;
    if values.len() != matrix.num_genomes() {
        return Err(wrap(PredictorError::PredictionLength {
            found: values.len(),
            expected: matrix.num_genomes(),
        }));
    }

    info!("Completed {}: {} predictor.", column, role);
    Ok(RolePrediction { column, values })
}

/// Runs one prediction task per column on the current rayon pool.
///
/// The order of the returned list carries no meaning; callers place each
/// result by its `column` tag through [`assemble_predictions`].
pub(crate) fn predict_all_roles(
    matrix: &RoleMatrix,
    source: &dyn PredictorSource,
) -> Result<Vec<RolePrediction>, EvalError> {
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} roles ({percent}%) ETA: {eta}",
        )
        .map_err(|e| EvalError::ProgressStyle(e.to_string()))?
        .progress_chars("=> ");
    let progress = ProgressBar::new(matrix.num_roles() as u64).with_style(style);

    let results = (0..matrix.num_roles())
        .into_par_iter()
        .map(|column| {
            let result = predict_role(matrix, source, column);
            progress.inc(1);
            result
        })
        .collect::<Result<Vec<_>, _>>();
    progress.finish_and_clear();
    results
}

/// Sorts tagged predictions by column and stacks them into a genomes x roles matrix.
///
/// Every column in `0..num_roles` must appear exactly once, with one value per genome.
pub(crate) fn assemble_predictions(
    mut predictions: Vec<RolePrediction>,
    num_genomes: usize,
    num_roles: usize,
) -> Result<Array2<f64>, EvalError> {
    predictions.sort_by_key(|p| p.column);

    let mut assembled = Array2::<f64>::zeros((num_genomes, num_roles));
    let mut expected = 0usize;
    for prediction in predictions {
        if prediction.column >= num_roles {
            return Err(EvalError::ColumnOutOfRange {
                column: prediction.column,
                num_roles,
            });
        }
        if prediction.values.len() != num_genomes {
            return Err(EvalError::ValueCount {
                column: prediction.column,
                found: prediction.values.len(),
                expected: num_genomes,
            });
        }
        if prediction.column < expected {
            return Err(EvalError::DuplicateColumn(prediction.column));
        }
        if prediction.column != expected {
            return Err(EvalError::MissingColumn(expected));
        }
        assembled.column_mut(prediction.column).assign(&prediction.values);
        expected += 1;
    }
    if expected != num_roles {
        return Err(EvalError::MissingColumn(expected));
    }
    Ok(assembled)
}
