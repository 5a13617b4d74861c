//! Regression tree (CART, squared-error splits) used as an ensemble member.

use crate::core::error::{Result, TunerError};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// A node of a regression tree. Children are indices into the node vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    /// Internal node: `feature <= threshold` goes left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Leaf with the mean target of its samples
    Leaf { value: f64 },
}

/// Growth limits of a single tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
}

/// Binary regression tree stored as a flat node vector (index 0 is the root).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
    depth: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    score: f64,
}

impl RegressionTree {
    /// Grow a tree on the rows of `features` listed in `samples` (repeats allowed).
    pub fn fit(
        features: &Array2<f64>,
        targets: &Array1<f64>,
        samples: Vec<usize>,
        params: TreeParams,
    ) -> Result<Self> {
        if features.nrows() != targets.len() {
            return Err(TunerError::dimension_mismatch(
                features.nrows().to_string(),
                targets.len().to_string(),
            ));
        }
        if samples.is_empty() {
            return Err(TunerError::training("cannot grow a tree without samples"));
        }

        let mut tree = RegressionTree {
            nodes: Vec::new(),
            depth: 0,
        };
        tree.grow(features, targets, samples, 0, params);
        Ok(tree)
    }

    fn grow(
        &mut self,
        features: &Array2<f64>,
        targets: &Array1<f64>,
        samples: Vec<usize>,
        depth: usize,
        params: TreeParams,
    ) -> usize {
        self.depth = self.depth.max(depth);
        let index = self.nodes.len();
        let mean = samples.iter().map(|&i| targets[i]).sum::<f64>() / samples.len() as f64;
        self.nodes.push(TreeNode::Leaf { value: mean });

        let depth_reached = params.max_depth.map_or(false, |max| depth >= max);
        if depth_reached || samples.len() < params.min_samples_split {
            return index;
        }

        let split = match best_split(features, targets, &samples) {
            Some(split) => split,
            None => return index,
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| features[[i, split.feature]] <= split.threshold);

        let left_index = self.grow(features, targets, left, depth + 1, params);
        let right_index = self.grow(features, targets, right, depth + 1, params);
        self.nodes[index] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: left_index,
            right: right_index,
        };
        index
    }

    /// Predict a single row.
    pub fn predict_row(&self, row: ArrayView1<f64>) -> Result<f64> {
        let mut index = 0;
        loop {
            match self.nodes.get(index) {
                Some(TreeNode::Leaf { value }) => return Ok(*value),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = row.get(*feature).ok_or_else(|| {
                        TunerError::dimension_mismatch(
                            format!("at least {} features", feature + 1),
                            row.len().to_string(),
                        )
                    })?;
                    index = if *value <= *threshold { *left } else { *right };
                }
                None => return Err(TunerError::prediction(format!("invalid node index {}", index))),
            }
        }
    }

    /// Predict every row of a matrix.
    pub fn predict(&self, features: &Array2<f64>) -> Result<Array1<f64>> {
        features.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Best squared-error split over all features, or `None` when no split
/// separates distinct feature values with a gain.
fn best_split(features: &Array2<f64>, targets: &Array1<f64>, samples: &[usize]) -> Option<BestSplit> {
    let n = samples.len() as f64;
    let total: f64 = samples.iter().map(|&i| targets[i]).sum();
    // maximizing sum_l²/n_l + sum_r²/n_r minimizes the children's squared error
    let parent_score = total * total / n;
    let mut best: Option<BestSplit> = None;

    for feature in 0..features.ncols() {
        let mut order: Vec<usize> = samples.to_vec();
        order.sort_by(|&a, &b| {
            features[[a, feature]]
                .partial_cmp(&features[[b, feature]])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut left_sum = 0.0;
        for position in 1..order.len() {
            left_sum += targets[order[position - 1]];
            let lower = features[[order[position - 1], feature]];
            let upper = features[[order[position], feature]];
            if lower >= upper {
                continue;
            }

            let left_n = position as f64;
            let right_n = n - left_n;
            let right_sum = total - left_sum;
            let score = left_sum * left_sum / left_n + right_sum * right_sum / right_n;

            let improves = score > parent_score + 1e-12 * parent_score.abs().max(1.0);
            let better = best.as_ref().map_or(true, |b| score > b.score);
            if improves && better {
                best = Some(BestSplit {
                    feature,
                    threshold: (lower + upper) / 2.0,
                    score,
                });
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn params() -> TreeParams {
        TreeParams {
            max_depth: None,
            min_samples_split: 2,
        }
    }

    #[test]
    fn test_fits_step_function_exactly() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![5.0, 5.0, 9.0, 9.0];
        let tree = RegressionTree::fit(&x, &y, vec![0, 1, 2, 3], params()).unwrap();
        assert_eq!(tree.num_nodes(), 3);
        assert_eq!(tree.predict(&x).unwrap().to_vec(), vec![5.0, 5.0, 9.0, 9.0]);
        assert_eq!(tree.predict_row(array![2.4].view()).unwrap(), 5.0);
        assert_eq!(tree.predict_row(array![2.6].view()).unwrap(), 9.0);
    }

    #[test]
    fn test_constant_target_is_single_leaf() {
        let x = array![[1.0, 0.0], [2.0, 1.0], [3.0, 0.0]];
        let y = array![2.0, 2.0, 2.0];
        let tree = RegressionTree::fit(&x, &y, vec![0, 1, 2], params()).unwrap();
        assert_eq!(tree.num_nodes(), 1);
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        let shallow = TreeParams {
            max_depth: Some(1),
            min_samples_split: 2,
        };
        let tree = RegressionTree::fit(&x, &y, vec![0, 1, 2, 3], shallow).unwrap();
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict_row(array![1.0].view()).unwrap(), 1.5);
    }

    #[test]
    fn test_bootstrap_repeats_weight_samples() {
        let x = array![[1.0], [2.0]];
        let y = array![0.0, 3.0];
        let tree = RegressionTree::fit(&x, &y, vec![1, 1, 1], params()).unwrap();
        assert_eq!(tree.num_nodes(), 1);
        assert_eq!(tree.predict_row(array![1.0].view()).unwrap(), 3.0);
    }

    #[test]
    fn test_mismatched_input_rejected() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0];
        assert!(RegressionTree::fit(&x, &y, vec![0], params()).is_err());
    }
}
