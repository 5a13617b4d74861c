//! Collaborator traits for the collective tuner.
//!
//! The tuner never implements a regression algorithm or a benchmark itself;
//! it drives whatever sits behind these two seams.

use crate::core::error::{JobContext, Result, TunerError};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// An ensemble (bagging) regressor whose members can be queried one by one.
///
/// The jackknife estimator needs per-member predictions, so a plain
/// `predict` is not enough.
pub trait EnsembleRegressor: Send + Sync {
    /// Fit the ensemble from scratch on the given training matrix.
    fn fit(&mut self, features: &Array2<f64>, targets: &Array1<f64>) -> Result<()>;

    /// Number of fitted ensemble members (0 before fitting).
    fn num_members(&self) -> usize;

    /// Predict with a single ensemble member.
    fn predict_member(&self, member: usize, features: &Array2<f64>) -> Result<Array1<f64>>;

    /// Predictions of every member, shaped (members × rows).
    fn member_predictions(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        let members = self.num_members();
        if members == 0 {
            return Err(TunerError::prediction("ensemble has not been fitted"));
        }
        let mut out = Array2::zeros((members, features.nrows()));
        for member in 0..members {
            let predictions = self.predict_member(member, features)?;
            if predictions.len() != features.nrows() {
                return Err(TunerError::dimension_mismatch(
                    features.nrows().to_string(),
                    predictions.len().to_string(),
                ));
            }
            out.row_mut(member).assign(&predictions);
        }
        Ok(out)
    }

    /// Aggregate prediction: the mean over all members.
    fn predict(&self, features: &Array2<f64>) -> Result<Array1<f64>> {
        let all = self.member_predictions(features)?;
        all.mean_axis(Axis(0))
            .ok_or_else(|| TunerError::prediction("empty ensemble"))
    }
}

/// The external benchmark launcher.
///
/// Given a job and an optional nodefile restricting placement, it returns
/// the measured latency or fails. Implementations are called concurrently
/// from scheduler workers.
pub trait BenchmarkRunner: Send + Sync {
    /// Run one benchmark and return its latency.
    fn run(&self, job: &JobContext, nodefile: Option<&Path>) -> Result<f64>;
}

impl<F> BenchmarkRunner for F
where
    F: Fn(&JobContext, Option<&Path>) -> Result<f64> + Send + Sync,
{
    fn run(&self, job: &JobContext, nodefile: Option<&Path>) -> Result<f64> {
        self(job, nodefile)
    }
}

/// Trait for serializable components.
pub trait Persistable: Serialize + for<'de> Deserialize<'de> {
    /// Save component to a file.
    fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        bincode::serialize_into(file, self)
            .map_err(|e| TunerError::serialization(format!("Failed to serialize: {}", e)))
    }

    /// Load component from a file.
    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self>
    where
        Self: Sized,
    {
        let file = std::fs::File::open(path)?;
        bincode::deserialize_from(file)
            .map_err(|e| TunerError::serialization(format!("Failed to deserialize: {}", e)))
    }
}
