//! Per-algorithm output normalization.
//!
//! Latencies are measured in groups: every algorithm variant of one feature
//! row, ordered by algorithm id. Each group is divided by its algorithm-0
//! latency and then mapped through `log10(x) + 1`, so the default algorithm
//! always trains on `1.0` and the model learns relative speed-ups.

use crate::core::error::{Result, TunerError};
use crate::core::types::Point;

/// Normalize a batch of raw latencies laid out in groups of `num_algorithms`.
///
/// Returns the normalized values together with an untouched copy of the raw
/// batch, which is kept for exact inversion later.
pub fn normalize_output(raw: &[f64], num_algorithms: usize) -> Result<(Vec<f64>, Vec<f64>)> {
    if num_algorithms == 0 {
        return Err(TunerError::invalid_parameter(
            "num_algorithms",
            "0",
            "a collective needs at least one algorithm",
        ));
    }
    if raw.len() % num_algorithms != 0 {
        return Err(TunerError::dimension_mismatch(
            format!("a multiple of {}", num_algorithms),
            raw.len().to_string(),
        ));
    }
    if let Some(bad) = raw.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
        return Err(TunerError::invalid_parameter(
            "latency",
            bad.to_string(),
            "latencies must be positive and finite",
        ));
    }

    let normalized = raw
        .chunks(num_algorithms)
        .flat_map(|group| {
            let reference = group[0];
            group.iter().map(move |v| (v / reference).log10() + 1.0)
        })
        .collect();

    Ok((normalized, raw.to_vec()))
}

/// Invert [`normalize_output`] for model outputs at `query` points.
///
/// Each value is mapped back through `10^(y - 1)` and multiplied by the raw
/// algorithm-0 latency measured at the same (n, ppn, msg_size) in the
/// training set. A query whose row was never measured is an error.
pub fn undo_normalize_output(
    train_points: &[Point],
    train_raw: &[f64],
    query: &[Point],
    normalized: &[f64],
) -> Result<Vec<f64>> {
    if train_points.len() != train_raw.len() {
        return Err(TunerError::dimension_mismatch(
            train_points.len().to_string(),
            train_raw.len().to_string(),
        ));
    }
    if query.len() != normalized.len() {
        return Err(TunerError::dimension_mismatch(
            query.len().to_string(),
            normalized.len().to_string(),
        ));
    }

    query
        .iter()
        .zip(normalized)
        .map(|(point, y)| {
            let reference = train_points
                .iter()
                .zip(train_raw)
                .find(|(p, _)| p.algorithm == 0 && p.row == point.row)
                .map(|(_, raw)| *raw)
                .ok_or_else(|| {
                    TunerError::prediction(format!(
                        "no algorithm-0 measurement for row {}",
                        point.row
                    ))
                })?;
            Ok(10f64.powf(y - 1.0) * reference)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FeatureRow;
    use crate::feature_space::expand_algorithms;
    use approx::assert_relative_eq;

    #[test]
    fn test_normalize_single_group() {
        let (y, raw) = normalize_output(&[10.0, 11.0, 12.0], 3).unwrap();
        assert_relative_eq!(y[0], 1.0);
        assert_relative_eq!(y[1], 1.1f64.log10() + 1.0, epsilon = 1e-12);
        assert_relative_eq!(y[2], 1.2f64.log10() + 1.0, epsilon = 1e-12);
        assert_eq!(raw, vec![10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_normalize_groups_independently() {
        let raw = [10.0, 11.0, 12.0, 1.0, 2.0, 3.0];
        let (y, _) = normalize_output(&raw, 3).unwrap();
        assert_relative_eq!(y[3], 1.0);
        assert_relative_eq!(y[4], 2f64.log10() + 1.0, epsilon = 1e-12);
        assert_relative_eq!(y[5], 3f64.log10() + 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_normalize_rejects_bad_input() {
        assert!(normalize_output(&[1.0, 2.0], 3).is_err());
        assert!(normalize_output(&[1.0, 0.0, 2.0], 3).is_err());
        assert!(normalize_output(&[1.0], 0).is_err());
    }

    #[test]
    fn test_undo_normalization_recovers_raw() {
        let rows = [
            FeatureRow::new(1, 1, 2),
            FeatureRow::new(1, 2, 2),
            FeatureRow::new(2, 2, 1),
        ];
        let raw_by_row = [[1.0, 2.0, 3.0], [10.0, 11.0, 12.0], [5.0, 4.0, 6.0]];
        let mut train_points = Vec::new();
        let mut train_raw = Vec::new();
        for (row, raw) in rows.iter().zip(raw_by_row.iter()) {
            train_points.extend(expand_algorithms(*row, 3));
            train_raw.extend_from_slice(raw);
        }

        let query: Vec<Point> = [rows[0], rows[1]]
            .iter()
            .flat_map(|r| expand_algorithms(*r, 3))
            .collect();
        let expected = [1.0, 2.0, 3.0, 10.0, 11.0, 12.0];
        let (normalized, _) = normalize_output(&expected, 3).unwrap();

        let restored = undo_normalize_output(&train_points, &train_raw, &query, &normalized).unwrap();
        for (got, want) in restored.iter().zip(expected.iter()) {
            assert_relative_eq!(*got, *want, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_undo_normalization_unknown_row() {
        let train = expand_algorithms(FeatureRow::new(1, 2, 1), 2);
        let query = vec![FeatureRow::new(2, 2, 2).with_algorithm(1)];
        let err = undo_normalize_output(&train, &[1.0, 2.0], &query, &[1.0]).unwrap_err();
        assert_eq!(err.category(), "prediction");
    }
}
