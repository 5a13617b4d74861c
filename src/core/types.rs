//! Fundamental data types for the collective tuner.
//!
//! Communicator size, processes per node and message size are stored in
//! *log2-plus-one* encoding throughout: an encoded value `e` stands for the
//! real value `2^(e-1)`, so `1` is the smallest configuration of each axis.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An encoded feature value (`e` represents `2^(e-1)`).
pub type Encoded = u32;

/// Index into the ordered candidate algorithm list of a collective.
/// Index 0 is the default algorithm and the normalization reference.
pub type AlgorithmId = usize;

/// Number of model input columns: n, ppn, msg_size, algorithm.
pub const NUM_MODEL_FEATURES: usize = 4;

/// Largest encoded value whose real value fits in a `u64`.
pub const MAX_ENCODED: Encoded = u64::BITS;

/// Decode an encoded feature value into its real value.
#[inline]
pub fn decode(encoded: Encoded) -> u64 {
    1u64 << (encoded.saturating_sub(1))
}

/// One (n, ppn, msg_size) configuration in encoded form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Encoded communicator size (number of nodes)
    pub n: Encoded,
    /// Encoded processes per node
    pub ppn: Encoded,
    /// Encoded message size
    pub msg_size: Encoded,
}

impl FeatureRow {
    /// Create a new feature row from encoded values.
    pub fn new(n: Encoded, ppn: Encoded, msg_size: Encoded) -> Self {
        FeatureRow { n, ppn, msg_size }
    }

    /// Real node count represented by this row.
    pub fn real_n(&self) -> u64 {
        decode(self.n)
    }

    /// Real processes per node represented by this row.
    pub fn real_ppn(&self) -> u64 {
        decode(self.ppn)
    }

    /// Real message size represented by this row.
    pub fn real_msg_size(&self) -> u64 {
        decode(self.msg_size)
    }

    /// Attach an algorithm to this row.
    pub fn with_algorithm(self, algorithm: AlgorithmId) -> Point {
        Point { row: self, algorithm }
    }

    /// True when `other` differs from this row only in message size.
    pub fn same_placement(&self, other: &FeatureRow) -> bool {
        self.n == other.n && self.ppn == other.ppn
    }
}

impl fmt::Display for FeatureRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.n, self.ppn, self.msg_size)
    }
}

/// A single measurable configuration: a feature row plus a candidate algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    /// Encoded (n, ppn, msg_size)
    pub row: FeatureRow,
    /// Candidate algorithm index
    pub algorithm: AlgorithmId,
}

impl Point {
    /// Model input vector for this point.
    pub fn features(&self) -> [f64; NUM_MODEL_FEATURES] {
        [
            self.row.n as f64,
            self.row.ppn as f64,
            self.row.msg_size as f64,
            self.algorithm as f64,
        ]
    }

    /// Number of real nodes a benchmark of this point occupies.
    pub fn nodes_required(&self) -> usize {
        self.row.real_n() as usize
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, alg {})",
            self.row.n, self.row.ppn, self.row.msg_size, self.algorithm
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode() {
        assert_eq!(decode(1), 1);
        assert_eq!(decode(2), 2);
        assert_eq!(decode(11), 1024);
    }

    #[test]
    fn test_point_features() {
        let p = FeatureRow::new(3, 2, 5).with_algorithm(1);
        assert_eq!(p.features(), [3.0, 2.0, 5.0, 1.0]);
        assert_eq!(p.nodes_required(), 4);
        assert_eq!(p.row.real_msg_size(), 16);
    }

    #[test]
    fn test_same_placement() {
        let a = FeatureRow::new(2, 2, 1);
        assert!(a.same_placement(&FeatureRow::new(2, 2, 7)));
        assert!(!a.same_placement(&FeatureRow::new(2, 3, 1)));
    }
}
