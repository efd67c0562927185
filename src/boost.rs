//! # Gradient-Boosted Tree Classifier
//!
//! A binary classifier boosting second-order regression trees on logistic
//! loss. Hyperparameters are the stock defaults and deliberately not exposed:
//! reproducibility of the defaults matters more to this pipeline than tuning,
//! so there is no sampling, no randomness, and no configuration surface.
//!
//! Trees are grown exact-greedy over the dense matrix the preprocessor emits
//! and stored as flat node arrays, which keeps the fitted ensemble a plain
//! serde struct the artifact store can persist.

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const ROUNDS: usize = 100;
const LEARNING_RATE: f64 = 0.3;
const MAX_DEPTH: usize = 6;
const MIN_CHILD_WEIGHT: f64 = 1.0;
const L2_LAMBDA: f64 = 1.0;

/// Logistic function, clamped against overflow the same way prediction is.
pub fn sigmoid(z: f64) -> f64 {
    let z = z.clamp(-700.0, 700.0);
    1.0 / (1.0 + f64::exp(-z))
}

/// Custom error type for classifier training failures.
#[derive(Error, Debug)]
pub enum TrainError {
    #[error("Training data is empty; at least one row is required.")]
    EmptyTrainingSet,
    #[error("Found {labels} labels for {rows} training rows; they must match.")]
    LabelRowMismatch { labels: usize, rows: usize },
    #[error("Training labels contain {found} distinct class(es); exactly 2 are required.")]
    NotBinary { found: usize },
}

/// Prediction-time failure: the matrix does not match the trained layout.
#[derive(Error, Debug)]
pub enum PredictError {
    #[error("Input matrix has {found} feature columns, but the model was trained on {expected}.")]
    FeatureCountMismatch { expected: usize, found: usize },
}

/// One node of a regression tree, stored flat. A negative `feature` marks a
/// leaf carrying `value`; branch nodes route `row[feature] < threshold` left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub feature: i64,
    pub threshold: f64,
    pub left: usize,
    pub right: usize,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut index = 0;
        loop {
            let node = &self.nodes[index];
            if node.feature < 0 {
                return node.value;
            }
            index = if row[node.feature as usize] < node.threshold {
                node.left
            } else {
                node.right
            };
        }
    }
}

/// The fitted tree ensemble. Immutable after `fit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbdtClassifier {
    /// Distinct labels in first-encounter order. The margin models the
    /// probability of `classes[1]`; `predict_proba` column 0 is `classes[0]`.
    pub classes: Vec<String>,
    pub n_features: usize,
    pub base_margin: f64,
    pub trees: Vec<Tree>,
}

impl GbdtClassifier {
    /// Trains the ensemble on a preprocessed matrix and its row labels.
    pub fn fit(x: &Array2<f64>, labels: &[String]) -> Result<Self, TrainError> {
        let rows = x.nrows();
        if rows == 0 {
            return Err(TrainError::EmptyTrainingSet);
        }
        if labels.len() != rows {
            return Err(TrainError::LabelRowMismatch {
                labels: labels.len(),
                rows,
            });
        }

        let mut classes: Vec<String> = Vec::with_capacity(2);
        for label in labels {
            if !classes.contains(label) {
                classes.push(label.clone());
            }
        }
        if classes.len() != 2 {
            return Err(TrainError::NotBinary {
                found: classes.len(),
            });
        }

        // y is 1 where the label is the second-encountered class.
        let y: Vec<f64> = labels
            .iter()
            .map(|l| if *l == classes[1] { 1.0 } else { 0.0 })
            .collect();

        let base_margin = 0.0;
        let mut margins = vec![base_margin; rows];
        let mut trees = Vec::with_capacity(ROUNDS);
        let mut grad = vec![0.0; rows];
        let mut hess = vec![0.0; rows];

        log::info!(
            "Training gradient-boosted classifier: {} rows, {} features, {} rounds",
            rows,
            x.ncols(),
            ROUNDS
        );

        for round in 0..ROUNDS {
            for i in 0..rows {
                let p = sigmoid(margins[i]);
                grad[i] = p - y[i];
                hess[i] = (p * (1.0 - p)).max(1e-16);
            }

            let tree = grow_tree(x, &grad, &hess);
            for i in 0..rows {
                margins[i] += tree.predict_row(x.row(i));
            }
            trees.push(tree);

            if (round + 1) % 25 == 0 {
                let loss = log_loss(&margins, &y);
                log::debug!("Round {}/{ROUNDS}: train logloss {loss:.6}", round + 1);
            }
        }

        Ok(Self {
            classes,
            n_features: x.ncols(),
            base_margin,
            trees,
        })
    }

    fn margins(&self, x: &Array2<f64>) -> Array1<f64> {
        let mut margins = Array1::from_elem(x.nrows(), self.base_margin);
        for (i, row) in x.rows().into_iter().enumerate() {
            for tree in &self.trees {
                margins[i] += tree.predict_row(row);
            }
        }
        margins
    }

    /// Per-row class probabilities, columns in `classes` order, summing to 1.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>, PredictError> {
        if x.ncols() != self.n_features {
            return Err(PredictError::FeatureCountMismatch {
                expected: self.n_features,
                found: x.ncols(),
            });
        }
        let margins = self.margins(x);
        let mut out = Array2::<f64>::zeros((x.nrows(), 2));
        for (i, &margin) in margins.iter().enumerate() {
            let p = sigmoid(margin).clamp(1e-8, 1.0 - 1e-8);
            out[[i, 0]] = 1.0 - p;
            out[[i, 1]] = p;
        }
        Ok(out)
    }
}

fn log_loss(margins: &[f64], y: &[f64]) -> f64 {
    let n = margins.len().max(1) as f64;
    margins
        .iter()
        .zip(y)
        .map(|(&m, &t)| {
            let p = sigmoid(m).clamp(1e-12, 1.0 - 1e-12);
            -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
        })
        .sum::<f64>()
        / n
}

fn grow_tree(x: &Array2<f64>, grad: &[f64], hess: &[f64]) -> Tree {
    let mut grower = Grower {
        x,
        grad,
        hess,
        nodes: Vec::new(),
    };
    let rows: Vec<usize> = (0..x.nrows()).collect();
    grower.build(rows, 0);
    Tree {
        nodes: grower.nodes,
    }
}

struct Grower<'a> {
    x: &'a Array2<f64>,
    grad: &'a [f64],
    hess: &'a [f64],
    nodes: Vec<Node>,
}

impl Grower<'_> {
    fn build(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let g: f64 = rows.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = rows.iter().map(|&i| self.hess[i]).sum();

        if depth >= MAX_DEPTH || rows.len() < 2 {
            return self.leaf(g, h);
        }

        let parent_score = g * g / (h + L2_LAMBDA);
        let mut best_gain = 0.0;
        let mut best_split: Option<(usize, f64)> = None;

        for feature in 0..self.x.ncols() {
            let mut order = rows.clone();
            order.sort_by(|&a, &b| {
                self.x[[a, feature]]
                    .partial_cmp(&self.x[[b, feature]])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            let mut g_left = 0.0;
            let mut h_left = 0.0;
            for k in 0..order.len() - 1 {
                g_left += self.grad[order[k]];
                h_left += self.hess[order[k]];

                let value = self.x[[order[k], feature]];
                let next = self.x[[order[k + 1], feature]];
                if next <= value {
                    continue;
                }
                let h_right = h - h_left;
                if h_left < MIN_CHILD_WEIGHT || h_right < MIN_CHILD_WEIGHT {
                    continue;
                }
                let g_right = g - g_left;
                let gain = g_left * g_left / (h_left + L2_LAMBDA)
                    + g_right * g_right / (h_right + L2_LAMBDA)
                    - parent_score;
                if gain > best_gain {
                    best_gain = gain;
                    best_split = Some((feature, (value + next) / 2.0));
                }
            }
        }

        let Some((feature, threshold)) = best_split else {
            return self.leaf(g, h);
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| self.x[[i, feature]] < threshold);

        // Reserve the branch slot before recursing so child indices are final.
        let index = self.nodes.len();
        self.nodes.push(Node {
            feature: feature as i64,
            threshold,
            left: 0,
            right: 0,
            value: 0.0,
        });
        let left = self.build(left_rows, depth + 1);
        let right = self.build(right_rows, depth + 1);
        self.nodes[index].left = left;
        self.nodes[index].right = right;
        index
    }

    fn leaf(&mut self, g: f64, h: f64) -> usize {
        let index = self.nodes.len();
        self.nodes.push(Node {
            feature: -1,
            threshold: 0.0,
            left: 0,
            right: 0,
            value: -g / (h + L2_LAMBDA) * LEARNING_RATE,
        });
        index
    }
}
