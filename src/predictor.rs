// predictor.rs

use log::{debug, warn};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub(crate) const DEFAULT_CLASSIFIER: &str = "RandomForestClassifier";
const LDA_VARS_FILE: &str = "LDA_vars";

#[derive(Error, Debug)]
pub(crate) enum PredictorError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse predictor artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path}: '{value}' is not a column index.")]
    BadFeatureIndex { path: PathBuf, value: String },
    #[error("Feature index {index} is out of range for {available} input columns.")]
    FeatureOutOfRange { index: usize, available: usize },
    #[error("Tree {tree}: node {node} references missing node {child} ({num_nodes} nodes).")]
    InvalidNodeIndex {
        tree: usize,
        node: usize,
        child: usize,
        num_nodes: usize,
    },
    #[error("Tree {tree} has no nodes.")]
    EmptyTree { tree: usize },
    #[error("Tree {tree} did not reach a leaf within {limit} steps.")]
    UnterminatedTree { tree: usize, limit: usize },
    #[error("Tree {tree}: leaf at node {node} has {found} class weights, expected {expected}.")]
    LeafWidth {
        tree: usize,
        node: usize,
        found: usize,
        expected: usize,
    },
    #[error("Model declares no classes.")]
    NoClasses,
    #[error("Random forest contains no trees.")]
    EmptyForest,
    #[error("Predictor returned {found} values for {expected} genomes.")]
    PredictionLength { found: usize, expected: usize },
}

/// A pretrained model that estimates one role's count from a set of feature columns.
///
/// `features` has one row per genome; the returned array must have the same
/// length and row order.
pub(crate) trait Predictor: Send + Sync {
    fn predict(&self, features: ArrayView2<f64>) -> Result<Array1<f64>, PredictorError>;
}

/// Locates the predictor (and optional input subset) of a role.
pub(crate) trait PredictorSource: Sync {
    fn load_predictor(&self, role_id: &str) -> Result<Box<dyn Predictor>, PredictorError>;

    /// Columns of the reduced matrix (target removed) the predictor expects,
    /// or `None` when every remaining column is used.
    fn feature_subset(&self, role_id: &str) -> Result<Option<Vec<usize>>, PredictorError>;
}

// --- On-disk artifacts ---

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub(crate) struct Split {
    pub(crate) feature: usize,
    pub(crate) threshold: f64,
    pub(crate) left: usize,
    pub(crate) right: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Node {
    Split(Split),
    /// Per-class weights (sample counts or probabilities) at this leaf.
    Leaf(Vec<f64>),
}

/// A binary decision tree stored as a flat node list; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct Tree {
    pub(crate) nodes: Vec<Node>,
}

impl Tree {
    /// Walks the tree for one genome and returns the normalised class distribution at the leaf.
    fn class_distribution(
        &self,
        tree_idx: usize,
        row: ArrayView1<f64>,
        num_classes: usize,
    ) -> Result<Vec<f64>, PredictorError> {
        if self.nodes.is_empty() {
            return Err(PredictorError::EmptyTree { tree: tree_idx });
        }
        let mut node_idx = 0usize;
        // A well-formed tree reaches a leaf in fewer steps than it has nodes.
        for _ in 0..=self.nodes.len() {
            match &self.nodes[node_idx] {
                Node::Leaf(weights) => {
                    if weights.len() != num_classes {
                        return Err(PredictorError::LeafWidth {
                            tree: tree_idx,
                            node: node_idx,
                            found: weights.len(),
                            expected: num_classes,
                        });
                    }
                    let total: f64 = weights.iter().sum();
                    if total > 0.0 {
                        return Ok(weights.iter().map(|w| w / total).collect());
                    }
                    return Ok(weights.clone());
                }
                Node::Split(split) => {
                    let value = *row.get(split.feature).ok_or(PredictorError::FeatureOutOfRange {
                        index: split.feature,
                        available: row.len(),
                    })?;
                    let child = if value <= split.threshold {
                        split.left
                    } else {
                        split.right
                    };
                    if child >= self.nodes.len() {
                        return Err(PredictorError::InvalidNodeIndex {
                            tree: tree_idx,
                            node: node_idx,
                            child,
                            num_nodes: self.nodes.len(),
                        });
                    }
                    node_idx = child;
                }
            }
        }
        Err(PredictorError::UnterminatedTree {
            tree: tree_idx,
            limit: self.nodes.len() + 1,
        })
    }
}

/// A serialized role predictor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub(crate) enum ClassifierArtifact {
    Constant { value: f64 },
    DecisionTree { classes: Vec<f64>, tree: Tree },
    RandomForest { classes: Vec<f64>, trees: Vec<Tree> },
}

/// Index of the largest probability; the first class wins ties.
fn argmax(probabilities: &[f64]) -> usize {
    let mut best = 0usize;
    for (idx, p) in probabilities.iter().enumerate() {
        if *p > probabilities[best] {
            best = idx;
        }
    }
    best
}

impl ClassifierArtifact {
    pub(crate) fn load(path: &Path) -> Result<Self, PredictorError> {
        let text = fs::read_to_string(path).map_err(|source| PredictorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| PredictorError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn predict_trees(
        classes: &[f64],
        trees: &[Tree],
        features: ArrayView2<f64>,
    ) -> Result<Array1<f64>, PredictorError> {
        if classes.is_empty() {
            return Err(PredictorError::NoClasses);
        }
        if trees.is_empty() {
            return Err(PredictorError::EmptyForest);
        }
        let mut predictions = Array1::<f64>::zeros(features.nrows());
        for (row_idx, row) in features.rows().into_iter().enumerate() {
            let mut mean = vec![0.0f64; classes.len()];
            for (tree_idx, tree) in trees.iter().enumerate() {
                let dist = tree.class_distribution(tree_idx, row, classes.len())?;
                for (acc, p) in mean.iter_mut().zip(dist) {
                    *acc += p;
                }
            }
            mean.iter_mut().for_each(|p| *p /= trees.len() as f64);
            predictions[row_idx] = classes[argmax(&mean)];
        }
        Ok(predictions)
    }
}

impl Predictor for ClassifierArtifact {
    fn predict(&self, features: ArrayView2<f64>) -> Result<Array1<f64>, PredictorError> {
        match self {
            ClassifierArtifact::Constant { value } => {
                Ok(Array1::from_elem(features.nrows(), *value))
            }
            ClassifierArtifact::DecisionTree { classes, tree } => {
                Self::predict_trees(classes, std::slice::from_ref(tree), features)
            }
            ClassifierArtifact::RandomForest { classes, trees } => {
                Self::predict_trees(classes, trees, features)
            }
        }
    }
}

/// Reads an LDA variable list: integers separated by tabs or newlines.
pub(crate) fn read_feature_subset(path: &Path) -> Result<Vec<usize>, PredictorError> {
    let text = fs::read_to_string(path).map_err(|source| PredictorError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    text.split_whitespace()
        .map(|token| {
            token
                .parse::<usize>()
                .map_err(|_| PredictorError::BadFeatureIndex {
                    path: path.to_path_buf(),
                    value: token.to_string(),
                })
        })
        .collect()
}

/// Filesystem layout of a training directory:
/// `<train_dir>/Predictors/<role>/Classifiers/<classifier>/{<classifier>,LDA_vars}`.
#[derive(Debug, Clone)]
pub(crate) struct ArtifactStore {
    pub(crate) train_dir: PathBuf,
    pub(crate) classifier: String,
    pub(crate) use_lda: bool,
}

impl ArtifactStore {
    pub(crate) fn classifier_dir(&self, role_id: &str) -> PathBuf {
        self.train_dir
            .join("Predictors")
            .join(role_id)
            .join("Classifiers")
            .join(&self.classifier)
    }

    pub(crate) fn model_path(&self, role_id: &str) -> PathBuf {
        self.classifier_dir(role_id).join(&self.classifier)
    }

    pub(crate) fn lda_vars_path(&self, role_id: &str) -> PathBuf {
        self.classifier_dir(role_id).join(LDA_VARS_FILE)
    }
}

impl PredictorSource for ArtifactStore {
    fn load_predictor(&self, role_id: &str) -> Result<Box<dyn Predictor>, PredictorError> {
        let path = self.model_path(role_id);
        debug!("Loading predictor for {} from {}", role_id, path.display());
        Ok(Box::new(ClassifierArtifact::load(&path)?))
    }

    fn feature_subset(&self, role_id: &str) -> Result<Option<Vec<usize>>, PredictorError> {
        if !self.use_lda {
            return Ok(None);
        }
        let path = self.lda_vars_path(role_id);
        let subset = read_feature_subset(&path)?;
        if subset.is_empty() {
            warn!("{} lists no variables; predictor input is empty.", path.display());
        }
        Ok(Some(subset))
    }
}
