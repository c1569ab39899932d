//! Random forest of regression trees
//!
//! Each tree is grown on a bootstrap sample with exhaustive variance-reduction
//! splits over every feature. Trees are grown in parallel; each draws from its
//! own `StdRng` seeded with `seed + tree_index`, so the forest depends only on
//! the data and the seed.

use ecoprint_core::{Error, ForestConfig, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Smallest SSE reduction worth a split
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Copy)]
struct TreeParams {
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
}

impl From<&ForestConfig> for TreeParams {
    fn from(config: &ForestConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split.max(2),
            min_samples_leaf: config.min_samples_leaf.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    /// Rows with `x[feature] <= threshold` go left
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f32,
    child_sse: f64,
}

/// Single CART regression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Grow a tree over `indices` of `rows`. SSE reductions are accumulated
    /// into `importance`, one entry per feature.
    fn grow(rows: &[Vec<f32>], targets: &[f64], indices: Vec<usize>, params: TreeParams, importance: &mut [f64]) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow_node(rows, targets, indices, 0, params, importance);
        tree
    }

    fn grow_node(
        &mut self,
        rows: &[Vec<f32>],
        targets: &[f64],
        indices: Vec<usize>,
        depth: usize,
        params: TreeParams,
        importance: &mut [f64],
    ) -> usize {
        let n = indices.len() as f64;
        let (sum, sum_sq) = indices
            .iter()
            .fold((0.0, 0.0), |(s, sq), &i| (s + targets[i], sq + targets[i] * targets[i]));
        let mean = if indices.is_empty() { 0.0 } else { sum / n };
        let sse = (sum_sq - sum * sum / n.max(1.0)).max(0.0);

        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { value: mean });

        let depth_left = params.max_depth.map_or(true, |max| depth < max);
        if !depth_left || indices.len() < params.min_samples_split || sse <= MIN_GAIN {
            return id;
        }

        let Some(split) = best_split(rows, targets, &indices, params.min_samples_leaf) else {
            return id;
        };
        let gain = sse - split.child_sse;
        if gain <= MIN_GAIN {
            return id;
        }
        importance[split.feature] += gain;

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| rows[i][split.feature] <= split.threshold);

        let left = self.grow_node(rows, targets, left_rows, depth + 1, params, importance);
        let right = self.grow_node(rows, targets, right_rows, depth + 1, params, importance);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    pub fn predict(&self, row: &[f32]) -> f64 {
        let mut id = 0;
        loop {
            match self.nodes.get(id) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let x = row.get(*feature).copied().unwrap_or(0.0);
                    id = if x <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match nodes.get(id) {
                Some(Node::Split { left, right, .. }) => 1 + walk(nodes, *left).max(walk(nodes, *right)),
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

/// Lowest child SSE over every feature and threshold. Features are scanned
/// in order and only a strictly better split replaces the current one, so
/// ties resolve to the lowest feature and threshold.
fn best_split(rows: &[Vec<f32>], targets: &[f64], indices: &[usize], min_leaf: usize) -> Option<SplitCandidate> {
    let n = indices.len();
    let dim = rows.get(indices[0]).map_or(0, Vec::len);
    let total: f64 = indices.iter().map(|&i| targets[i]).sum();
    let total_sq: f64 = indices.iter().map(|&i| targets[i] * targets[i]).sum();

    let mut best: Option<SplitCandidate> = None;
    let mut order = indices.to_vec();

    for feature in 0..dim {
        order.sort_by(|&a, &b| rows[a][feature].total_cmp(&rows[b][feature]));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for pos in 0..n - 1 {
            let y = targets[order[pos]];
            left_sum += y;
            left_sq += y * y;

            let here = rows[order[pos]][feature];
            let next = rows[order[pos + 1]][feature];
            if here == next {
                continue;
            }

            let left_n = pos + 1;
            let right_n = n - left_n;
            if left_n < min_leaf || right_n < min_leaf {
                continue;
            }

            let right_sum = total - left_sum;
            let right_sq = total_sq - left_sq;
            let child_sse = (left_sq - left_sum * left_sum / left_n as f64).max(0.0)
                + (right_sq - right_sum * right_sum / right_n as f64).max(0.0);

            if best.map_or(true, |b| child_sse < b.child_sse) {
                let mid = here + (next - here) / 2.0;
                best = Some(SplitCandidate {
                    feature,
                    threshold: if mid < next { mid } else { here },
                    child_sse,
                });
            }
        }
    }

    best
}

/// Bagged ensemble of regression trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
    n_features: usize,
    /// Mean of per-tree normalized SSE reductions, summing to 1 unless no
    /// tree ever split
    importances: Vec<f64>,
}

impl RandomForest {
    /// Fit on `rows` (one encoded profile each) and their `targets`.
    ///
    /// Fails with [`Error::InvalidConfig`] when `rows` is empty, when it
    /// does not match `targets` in length, or when rows differ in width.
    pub fn fit(rows: &[Vec<f32>], targets: &[f64], config: &ForestConfig) -> Result<Self> {
        let n = rows.len();
        if n == 0 {
            return Err(Error::InvalidConfig("cannot fit a forest on zero rows".into()));
        }
        if targets.len() != n {
            return Err(Error::InvalidConfig(format!(
                "{} rows but {} targets",
                n,
                targets.len()
            )));
        }
        let n_features = rows[0].len();
        if rows.iter().any(|r| r.len() != n_features) {
            return Err(Error::InvalidConfig("rows differ in width".into()));
        }
        let params = TreeParams::from(config);

        let grown: Vec<(RegressionTree, Vec<f64>)> = (0..config.n_trees.max(1))
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(t as u64));
                let sample: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
                let mut importance = vec![0.0; n_features];
                let tree = RegressionTree::grow(rows, targets, sample, params, &mut importance);
                (tree, importance)
            })
            .collect();

        let mut importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(grown.len());
        let mut contributing = 0usize;
        for (tree, importance) in grown {
            let total: f64 = importance.iter().sum();
            if total > 0.0 {
                contributing += 1;
                for (acc, x) in importances.iter_mut().zip(&importance) {
                    *acc += x / total;
                }
            }
            trees.push(tree);
        }
        if contributing > 0 {
            for x in &mut importances {
                *x /= contributing as f64;
            }
        }

        Ok(Self {
            trees,
            n_features,
            importances,
        })
    }

    pub fn predict(&self, row: &[f32]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }
}

/// Coefficient of determination of `predicted` against `actual`.
///
/// A constant target scores 1.0 when matched exactly and 0.0 otherwise.
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() || actual.len() != predicted.len() {
        return 0.0;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = actual.iter().zip(predicted).map(|(y, p)| (y - p).powi(2)).sum();

    if ss_tot <= f64::EPSILON {
        return if ss_res <= f64::EPSILON { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}
