//! Jackknife uncertainty over ensemble members and the convergence test.
//!
//! For every test row the member predictions are resampled leave-one-out;
//! the variance of the resample means,
//! `Σ (mean_{-j} - mean)² / (m (m - 1))` for `m` members, measures how much
//! the ensemble disagrees about that row.

use crate::core::constants::CONVERGENCE_WINDOW;
use crate::core::error::{Result, TunerError};
use crate::core::traits::EnsembleRegressor;
use ndarray::{Array1, Array2, ArrayView1};
use std::cmp::Ordering;

/// Jackknife variance of one column of member predictions.
pub fn column_variance(column: ArrayView1<f64>) -> f64 {
    let m = column.len() as f64;
    let total = column.sum();
    let mean = total / m;
    let sum_sq: f64 = column
        .iter()
        .map(|value| {
            let resample_mean = (total - value) / (m - 1.0);
            (resample_mean - mean).powi(2)
        })
        .sum();
    sum_sq / (m * (m - 1.0))
}

/// Per-row jackknife variances of a (members × rows) prediction matrix.
pub fn variances_from_predictions(predictions: &Array2<f64>) -> Result<Array1<f64>> {
    if predictions.nrows() < 2 {
        return Err(TunerError::prediction(format!(
            "jackknife needs at least 2 ensemble members, got {}",
            predictions.nrows()
        )));
    }
    Ok(predictions.columns().into_iter().map(column_variance).collect())
}

/// Per-row jackknife variances of a fitted ensemble over `features`.
pub fn jackknife_variances<M>(model: &M, features: &Array2<f64>) -> Result<Array1<f64>>
where
    M: EnsembleRegressor + ?Sized,
{
    let predictions = model.member_predictions(features)?;
    variances_from_predictions(&predictions)
}

/// Scalar uncertainty estimate: the mean per-row jackknife variance.
pub fn jackknife<M>(model: &M, features: &Array2<f64>) -> Result<f64>
where
    M: EnsembleRegressor + ?Sized,
{
    let variances = jackknife_variances(model, features)?;
    variances
        .mean()
        .ok_or_else(|| TunerError::prediction("jackknife over an empty test set"))
}

fn by_variance(a: &f64, b: &f64) -> Ordering {
    // NaN sorts below every number
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.partial_cmp(b).unwrap_or(Ordering::Equal),
    }
}

/// Index of the row with the largest variance (the first one on ties).
pub fn select_single<M>(model: &M, features: &Array2<f64>) -> Result<usize>
where
    M: EnsembleRegressor + ?Sized,
{
    let variances = jackknife_variances(model, features)?;
    let mut best: Option<(usize, f64)> = None;
    for (index, value) in variances.iter().enumerate() {
        match best {
            Some((_, current)) if by_variance(value, &current) != Ordering::Greater => {}
            _ => best = Some((index, *value)),
        }
    }
    best.map(|(index, _)| index)
        .ok_or_else(|| TunerError::prediction("no rows to select from"))
}

/// Indices of the `k` rows with the largest variances, largest first.
pub fn select_batch<M>(model: &M, features: &Array2<f64>, k: usize) -> Result<Vec<usize>>
where
    M: EnsembleRegressor + ?Sized,
{
    let variances = jackknife_variances(model, features)?;
    let mut order: Vec<usize> = (0..variances.len()).collect();
    order.sort_by(|a, b| by_variance(&variances[*b], &variances[*a]).then(a.cmp(b)));
    order.truncate(k);
    Ok(order)
}

/// Sliding-window stability test: the last four values must each lie within
/// `threshold` of their predecessor. Shorter histories never converge.
pub fn convergence_criteria(history: &[f64], threshold: f64) -> bool {
    if history.len() < CONVERGENCE_WINDOW {
        return false;
    }
    history[history.len() - CONVERGENCE_WINDOW..]
        .windows(2)
        .all(|pair| (pair[1] - pair[0]).abs() <= threshold)
}

/// Append-only record of jackknife estimates, one per training iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvergenceHistory {
    values: Vec<f64>,
}

impl ConvergenceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn last(&self) -> Option<f64> {
        self.values.last().copied()
    }

    /// Converged once at least `min_history` values exist and the last
    /// window is stable within `threshold`.
    pub fn is_converged(&self, threshold: f64, min_history: usize) -> bool {
        self.values.len() >= min_history && convergence_criteria(&self.values, threshold)
    }
}
