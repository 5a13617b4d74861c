//! Random forest regressor: the default ensemble behind the active learner.
//!
//! Each member is a [`RegressionTree`] grown on a bootstrap sample of the
//! training rows. Members are seeded independently (`seed + member`), so a
//! fit is reproducible regardless of how rayon schedules the trees.

pub mod tree;

pub use tree::{RegressionTree, TreeNode, TreeParams};

use crate::config::ForestConfig;
use crate::core::error::{Result, TunerError};
use crate::core::traits::{EnsembleRegressor, Persistable};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Bagged ensemble of regression trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    config: ForestConfig,
    trees: Vec<RegressionTree>,
}

impl RandomForestRegressor {
    pub fn new(config: ForestConfig) -> Self {
        RandomForestRegressor {
            config,
            trees: Vec::new(),
        }
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    fn sample_indices(&self, member: usize, num_rows: usize) -> Vec<usize> {
        if !self.config.bootstrap {
            return (0..num_rows).collect();
        }
        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(member as u64));
        (0..num_rows).map(|_| rng.gen_range(0..num_rows)).collect()
    }
}

impl Default for RandomForestRegressor {
    fn default() -> Self {
        Self::new(ForestConfig::default())
    }
}

impl EnsembleRegressor for RandomForestRegressor {
    fn fit(&mut self, features: &Array2<f64>, targets: &Array1<f64>) -> Result<()> {
        if features.nrows() == 0 {
            return Err(TunerError::training("cannot fit a forest on an empty training set"));
        }
        if features.nrows() != targets.len() {
            return Err(TunerError::dimension_mismatch(
                features.nrows().to_string(),
                targets.len().to_string(),
            ));
        }
        if targets.iter().any(|y| !y.is_finite()) {
            return Err(TunerError::training("training targets must be finite"));
        }

        let params = TreeParams {
            max_depth: self.config.max_depth,
            min_samples_split: self.config.min_samples_split,
        };
        let samples: Vec<Vec<usize>> = (0..self.config.num_estimators)
            .map(|member| self.sample_indices(member, features.nrows()))
            .collect();

        let trees = samples
            .into_par_iter()
            .map(|indices| RegressionTree::fit(features, targets, indices, params))
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "fitted {} trees on {} rows (max depth {})",
            trees.len(),
            features.nrows(),
            trees.iter().map(RegressionTree::depth).max().unwrap_or(0)
        );
        self.trees = trees;
        Ok(())
    }

    fn num_members(&self) -> usize {
        self.trees.len()
    }

    fn predict_member(&self, member: usize, features: &Array2<f64>) -> Result<Array1<f64>> {
        let tree = self.trees.get(member).ok_or_else(|| {
            TunerError::invalid_parameter(
                "member",
                member.to_string(),
                format!("forest has {} trees", self.trees.len()),
            )
        })?;
        tree.predict(features)
    }
}

impl Persistable for RandomForestRegressor {}
