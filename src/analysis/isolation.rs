//! Isolation-based scorer over the projected representation.
//!
//! An ensemble of random partitioning trees; points that are isolated after
//! few splits are anomalous. Scores follow the usual convention: the decision
//! value is `0.5 - 2^(-E[h(x)] / c(ψ))`, negative for anomalies.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::model::{AnomalyLabel, AnomalyScore, CurveMatrix};
use crate::error::CurveError;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Threshold on the raw score used when contamination is chosen automatically.
const AUTO_OFFSET: f64 = -0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationParams {
    pub n_estimators: usize,
    /// Subsample size per tree, capped at the number of training rows.
    pub max_samples: usize,
    pub seed: u64,
}

impl Default for IsolationParams {
    fn default() -> Self {
        IsolationParams {
            n_estimators: 100,
            max_samples: 256,
            seed: 42,
        }
    }
}

/// Average path length of an unsuccessful search in a binary search tree of
/// `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

// ---------------------------------------------------------------------------
// Isolation tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn build(data: &CurveMatrix, rows: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        let mut tree = IsolationTree { nodes: Vec::new() };
        tree.grow(data, rows, 0, max_depth, rng);
        tree
    }

    /// Append the subtree for `rows` and return its node index.
    fn grow(
        &mut self,
        data: &CurveMatrix,
        rows: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });
        if depth >= max_depth || rows.len() <= 1 {
            return id;
        }

        let ranges: Vec<(usize, f64, f64)> = (0..data.ncols())
            .filter_map(|f| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, &r| {
                    let v = data.values[[r, f]];
                    (acc.0.min(v), acc.1.max(v))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();
        if ranges.is_empty() {
            return id;
        }

        let (feature, lo, hi) = ranges[rng.random_range(0..ranges.len())];
        let threshold = lo + rng.random::<f64>() * (hi - lo);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| data.values[[r, feature]] <= threshold);
        if left_rows.is_empty() || right_rows.is_empty() {
            return id;
        }

        let left = self.grow(data, left_rows, depth + 1, max_depth, rng);
        let right = self.grow(data, right_rows, depth + 1, max_depth, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn path_length(&self, point: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if point[*feature] <= *threshold { *left } else { *right };
                    depth += 1.0;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Forest
// ---------------------------------------------------------------------------

/// A fitted ensemble. Frozen after [`IsolationForest::fit`].
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    width: usize,
}

impl IsolationForest {
    pub fn fit(reference: &CurveMatrix, params: &IsolationParams) -> Result<Self, CurveError> {
        let n = reference.nrows();
        if n < 2 {
            return Err(CurveError::InsufficientPoints { found: n });
        }
        let sample_size = params.max_samples.clamp(2, n);
        let max_depth = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(params.seed);

        let trees = (0..params.n_estimators.max(1))
            .map(|_| {
                let rows = index::sample(&mut rng, n, sample_size).into_vec();
                IsolationTree::build(reference, rows, max_depth, &mut rng)
            })
            .collect();
        log::info!(
            "Fitted isolation forest: {} trees, {sample_size} samples each",
            params.n_estimators.max(1)
        );
        Ok(IsolationForest {
            trees,
            sample_size,
            width: reference.ncols(),
        })
    }

    /// Raw score in `[-1, 0]`; lower is more anomalous.
    pub fn score_samples(&self, matrix: &CurveMatrix) -> Result<Vec<f64>, CurveError> {
        matrix.check_width(self.width)?;
        let norm = average_path_length(self.sample_size);
        Ok(matrix
            .values
            .rows()
            .into_iter()
            .map(|row| {
                let point = row.to_vec();
                let mean = self.trees.iter().map(|t| t.path_length(&point)).sum::<f64>()
                    / self.trees.len() as f64;
                -(2f64.powf(-mean / norm))
            })
            .collect())
    }

    /// Decision value: positive for inliers, negative for anomalies.
    pub fn decision_function(&self, matrix: &CurveMatrix) -> Result<Vec<f64>, CurveError> {
        Ok(self
            .score_samples(matrix)?
            .into_iter()
            .map(|s| s - AUTO_OFFSET)
            .collect())
    }

    /// Decision value and label per row, carrying the row's entity name.
    pub fn score(&self, matrix: &CurveMatrix) -> Result<Vec<AnomalyScore>, CurveError> {
        let decisions = self.decision_function(matrix)?;
        Ok(matrix
            .names
            .iter()
            .zip(decisions)
            .map(|(name, score)| AnomalyScore {
                name: name.clone(),
                score,
                label: if score < 0.0 {
                    AnomalyLabel::Anomalous
                } else {
                    AnomalyLabel::Normal
                },
            })
            .collect())
    }
}
