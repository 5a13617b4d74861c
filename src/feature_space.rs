//! Feature-space enumeration and the log2 encoding of raw sizes.
//!
//! A [`FeatureSpace`] lists every encoded (n, ppn, msg_size) configuration of
//! a collective, in n-major order. The single-process column `(1, 1, *)` is
//! never part of it, and reductions additionally skip the two smallest
//! message sizes.

use crate::core::constants::INITIAL_OVERSAMPLE;
use crate::core::error::{Result, TunerError};
use crate::core::types::{
    decode, AlgorithmId, Encoded, FeatureRow, Point, MAX_ENCODED, NUM_MODEL_FEATURES,
};
use ndarray::Array2;

/// Encode a raw size (a power of two) as `log2(x) + 1`.
pub fn preprocess(raw: u64) -> Result<Encoded> {
    if raw == 0 || !raw.is_power_of_two() {
        return Err(TunerError::invalid_parameter(
            "raw",
            raw.to_string(),
            "must be a power of two",
        ));
    }
    Ok(raw.trailing_zeros() + 1)
}

/// Decode an encoded value back to its raw size.
pub fn unprocess(encoded: Encoded) -> u64 {
    decode(encoded)
}

/// Whether a collective is a reduction (and therefore cannot use 1 or 2 byte messages).
pub fn is_reduction(collective: &str) -> bool {
    collective.contains("reduce")
}

/// The immutable set of configurations tuned for one collective.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSpace {
    rows: Vec<FeatureRow>,
    n_max: Encoded,
    ppn_max: Encoded,
    msg_max: Encoded,
}

impl FeatureSpace {
    /// Enumerate the feature space for encoded maxima.
    pub fn build(n_max: Encoded, ppn_max: Encoded, msg_max: Encoded, collective: &str) -> Result<Self> {
        for (name, value) in [("n_max", n_max), ("ppn_max", ppn_max), ("msg_max", msg_max)] {
            if value == 0 {
                return Err(TunerError::invalid_parameter(name, "0", "encoded maxima start at 1"));
            }
            if value > MAX_ENCODED {
                return Err(TunerError::invalid_parameter(
                    name,
                    value.to_string(),
                    format!("encoded maxima above {} overflow 64-bit sizes", MAX_ENCODED),
                ));
            }
        }

        let reduction = is_reduction(collective);
        let mut rows = Vec::new();
        for n in 1..=n_max {
            for ppn in 1..=ppn_max {
                if n == 1 && ppn == 1 {
                    continue;
                }
                for msg_size in 1..=msg_max {
                    if reduction && msg_size <= 2 {
                        continue;
                    }
                    rows.push(FeatureRow::new(n, ppn, msg_size));
                }
            }
        }

        log::debug!(
            "feature space for {}: {} rows (n<={}, ppn<={}, msg<={})",
            collective,
            rows.len(),
            n_max,
            ppn_max,
            msg_max
        );

        Ok(FeatureSpace {
            rows,
            n_max,
            ppn_max,
            msg_max,
        })
    }

    /// Enumerate the feature space from raw maxima (each a power of two).
    pub fn from_raw(n: u64, ppn: u64, msg_size: u64, collective: &str) -> Result<Self> {
        Self::build(preprocess(n)?, preprocess(ppn)?, preprocess(msg_size)?, collective)
    }

    /// Rows in enumeration order.
    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no row survived the exclusions.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Encoded maxima as (n, ppn, msg_size).
    pub fn maxima(&self) -> (Encoded, Encoded, Encoded) {
        (self.n_max, self.ppn_max, self.msg_max)
    }

    /// Every (row × algorithm) point, row-major with algorithms innermost.
    pub fn all_points(&self, num_algorithms: usize) -> Vec<Point> {
        self.rows
            .iter()
            .flat_map(|row| expand_algorithms(*row, num_algorithms))
            .collect()
    }

    /// Bootstrap rows: evenly spaced over the row indices, oversampled by two
    /// and with the two largest indices dropped. Returns every row when the
    /// space is smaller than the request.
    pub fn initial_rows(&self, count: usize) -> Vec<FeatureRow> {
        let total = self.rows.len();
        if total < count {
            return self.rows.clone();
        }

        linspace_indices(total - 1, count + INITIAL_OVERSAMPLE)
            .into_iter()
            .take(count)
            .map(|i| self.rows[i])
            .collect()
    }
}

/// `floor(linspace(0, last, num))` as indices.
fn linspace_indices(last: usize, num: usize) -> Vec<usize> {
    match num {
        0 => Vec::new(),
        1 => vec![0],
        _ => {
            let step = last as f64 / (num - 1) as f64;
            (0..num)
                .map(|i| {
                    if i == num - 1 {
                        last
                    } else {
                        (i as f64 * step).floor() as usize
                    }
                })
                .collect()
        }
    }
}

/// All algorithm variants of one row, in algorithm order.
pub fn expand_algorithms(row: FeatureRow, num_algorithms: usize) -> Vec<Point> {
    (0..num_algorithms)
        .map(|algorithm: AlgorithmId| row.with_algorithm(algorithm))
        .collect()
}

/// Model input matrix (points × 4) for a slice of points.
pub fn points_matrix(points: &[Point]) -> Array2<f64> {
    let mut matrix = Array2::zeros((points.len(), NUM_MODEL_FEATURES));
    for (mut out, point) in matrix.rows_mut().into_iter().zip(points) {
        for (dst, src) in out.iter_mut().zip(point.features()) {
            *dst = src;
        }
    }
    matrix
}
