// matrix.rs

use log::{debug, info};
use ndarray::Array2;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub(crate) const MATRIX_FILE: &str = "X";
pub(crate) const ROLE_LABEL_FILE: &str = "col.h";
pub(crate) const GENOME_LABEL_FILE: &str = "row.h";

#[derive(Error, Debug)]
pub(crate) enum MatrixError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{path} line {line}: value '{value}' is not numeric.")]
    NotNumeric {
        path: PathBuf,
        line: usize,
        value: String,
    },
    #[error("{path} line {line} has {found} values, expected {expected}.")]
    RaggedRow {
        path: PathBuf,
        line: usize,
        found: usize,
        expected: usize,
    },
    #[error("{path} line {line} has no identifier field (expected '<index>\\t<id>').")]
    MissingLabel { path: PathBuf, line: usize },
    #[error("{0} contains no data.")]
    Empty(PathBuf),
    #[error("{labels} lists {found} labels but the matrix has {expected} {axis}.")]
    LabelCountMismatch {
        labels: &'static str,
        axis: &'static str,
        found: usize,
        expected: usize,
    },
}

/// One line of a label file: the leading index and the identifier in the second field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Label {
    pub(crate) index: String,
    pub(crate) id: String,
}

/// The occurrence matrix of a test directory together with its row and column labels.
///
/// Rows are genomes, columns are roles. Row `g` of `x` belongs to `genomes[g]`
/// and column `r` to `roles[r]`.
#[derive(Debug)]
pub(crate) struct RoleMatrix {
    pub(crate) x: Array2<f64>,
    pub(crate) roles: Vec<Label>,
    pub(crate) genomes: Vec<Label>,
}

impl RoleMatrix {
    pub(crate) fn num_genomes(&self) -> usize {
        self.x.nrows()
    }

    pub(crate) fn num_roles(&self) -> usize {
        self.x.ncols()
    }

    pub(crate) fn role_id(&self, column: usize) -> &str {
        &self.roles[column].id
    }
}

/// 1-based line of a record in its file; the csv reader skips blank lines,
/// so the record count alone is not the line.
fn record_line(record: &csv::StringRecord, fallback: usize) -> usize {
    record
        .position()
        .map_or(fallback, |position| position.line() as usize)
}

fn tsv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>, MatrixError> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_path(path)
        .map_err(|source| MatrixError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Reads a tab-delimited numeric matrix. A file with a single line still
/// produces a two-dimensional `(1, n)` array.
pub(crate) fn read_matrix(path: &Path) -> Result<Array2<f64>, MatrixError> {
    let mut reader = tsv_reader(path)?;
    let mut values: Vec<f64> = Vec::new();
    let mut ncols: Option<usize> = None;
    let mut nrows = 0usize;

    for (line_idx, record) in reader.records().enumerate() {
        let record = record.map_err(|source| MatrixError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let line = record_line(&record, line_idx + 1);
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let expected = *ncols.get_or_insert(record.len());
        if record.len() != expected {
            return Err(MatrixError::RaggedRow {
                path: path.to_path_buf(),
                line,
                found: record.len(),
                expected,
            });
        }
        for field in record.iter() {
            let value = field
                .trim()
                .parse::<f64>()
                .map_err(|_| MatrixError::NotNumeric {
                    path: path.to_path_buf(),
                    line,
                    value: field.to_string(),
                })?;
            values.push(value);
        }
        nrows += 1;
    }

    let ncols = match ncols {
        Some(n) if nrows > 0 => n,
        _ => return Err(MatrixError::Empty(path.to_path_buf())),
    };

    Array2::from_shape_vec((nrows, ncols), values).map_err(|_| MatrixError::RaggedRow {
        path: path.to_path_buf(),
        line: nrows,
        found: 0,
        expected: ncols,
    })
}

/// Reads a label file whose second tab-delimited field is the identifier.
pub(crate) fn read_labels(path: &Path) -> Result<Vec<Label>, MatrixError> {
    let mut reader = tsv_reader(path)?;
    let mut labels = Vec::new();
    for (line_idx, record) in reader.records().enumerate() {
        let record = record.map_err(|source| MatrixError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        match (record.get(0), record.get(1)) {
            (Some(index), Some(id)) => labels.push(Label {
                index: index.trim().to_string(),
                id: id.trim().to_string(),
            }),
            _ => {
                return Err(MatrixError::MissingLabel {
                    path: path.to_path_buf(),
                    line: record_line(&record, line_idx + 1),
                })
            }
        }
    }
    Ok(labels)
}

/// Loads `X`, `col.h` and `row.h` from `test_dir`.
pub(crate) fn load_role_matrix(test_dir: &Path) -> Result<RoleMatrix, MatrixError> {
    info!("Loading role matrix from {}", test_dir.display());
    let x = read_matrix(&test_dir.join(MATRIX_FILE))?;
    let roles = read_labels(&test_dir.join(ROLE_LABEL_FILE))?;
    let genomes = read_labels(&test_dir.join(GENOME_LABEL_FILE))?;

    if roles.len() != x.ncols() {
        return Err(MatrixError::LabelCountMismatch {
            labels: ROLE_LABEL_FILE,
            axis: "columns",
            found: roles.len(),
            expected: x.ncols(),
        });
    }
    if genomes.len() != x.nrows() {
        return Err(MatrixError::LabelCountMismatch {
            labels: GENOME_LABEL_FILE,
            axis: "rows",
            found: genomes.len(),
            expected: x.nrows(),
        });
    }

    debug!(
        "Loaded matrix of {} genomes x {} roles. First roles: {:?}",
        x.nrows(),
        x.ncols(),
        roles
            .iter()
            .take(5)
            .map(|l| format!("{}:{}", l.index, l.id))
            .collect::<Vec<_>>()
    );
    Ok(RoleMatrix { x, roles, genomes })
}
