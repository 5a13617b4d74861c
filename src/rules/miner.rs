//! Mining decision rules out of a trained latency model.
//!
//! The model is asked for the fastest algorithm of every feature row; the
//! rows where that choice changes become breakpoints, which are folded into
//! a three-level `comm_size` / `comm_avg_ppn` / message-size tree.

use super::{Dimension, LeafKind, Predicate, RuleNode, RuleTree};
use crate::algorithms::AlgorithmTable;
use crate::core::constants::COMPOSITION_SUFFIX;
use crate::core::error::{Result, TunerError};
use crate::core::traits::EnsembleRegressor;
use crate::core::types::{decode, AlgorithmId, Encoded, FeatureRow, NUM_MODEL_FEATURES};
use crate::feature_space::{expand_algorithms, points_matrix, FeatureSpace};
use indexmap::IndexMap;
use ndarray::Array2;

/// Rows at which a selection starts or ends, in discovery order, mapped to
/// the algorithm chosen there.
pub type Breakpoints = IndexMap<FeatureRow, AlgorithmId>;

/// Parameterized algorithm families and the key their parameter is emitted under.
const PARAMETER_KEYS: &[(&str, &str)] = &[
    ("recexch", "k"),
    ("recexch_doubling", "k"),
    ("recexch_halving", "k"),
    ("tree", "k"),
    ("recursive_multiplying", "k"),
    ("k_brucks", "k"),
];

fn argmin(values: &[f64]) -> AlgorithmId {
    let mut best = 0;
    for (index, value) in values.iter().enumerate() {
        if *value < values[best] || values[best].is_nan() {
            best = index;
        }
    }
    best
}

/// Fastest algorithm of every group of `num_algorithms` predictions.
pub fn get_selections(predictions: &[f64], num_algorithms: usize) -> Result<Vec<AlgorithmId>> {
    if num_algorithms == 0 || predictions.len() % num_algorithms != 0 {
        return Err(TunerError::dimension_mismatch(
            format!("groups of {} predictions", num_algorithms),
            predictions.len().to_string(),
        ));
    }
    Ok(predictions.chunks(num_algorithms).map(argmin).collect())
}

/// Model-predicted fastest algorithm for each row.
pub fn predict_selections<M>(model: &M, rows: &[FeatureRow], num_algorithms: usize) -> Result<Vec<AlgorithmId>>
where
    M: EnsembleRegressor + ?Sized,
{
    let points: Vec<_> = rows
        .iter()
        .flat_map(|row| expand_algorithms(*row, num_algorithms))
        .collect();
    let predictions = model.predict(&points_matrix(&points))?;
    get_selections(&predictions.to_vec(), num_algorithms)
}

/// Encoded message size halfway (in real bytes) between two encoded sizes.
/// The result is fractional unless the sizes are equal.
pub fn midpoint_msg_size(prev: Encoded, cur: Encoded) -> f64 {
    let real = (decode(prev) as f64 + decode(cur) as f64) / 2.0;
    real.log2() + 1.0
}

fn fastest_at_midpoint<M>(model: &M, row: FeatureRow, msg_size: f64, num_algorithms: usize) -> Result<AlgorithmId>
where
    M: EnsembleRegressor + ?Sized,
{
    let mut candidates = Array2::zeros((num_algorithms, NUM_MODEL_FEATURES));
    for (algorithm, mut out) in candidates.rows_mut().into_iter().enumerate() {
        out[0] = f64::from(row.n);
        out[1] = f64::from(row.ppn);
        out[2] = msg_size;
        out[3] = algorithm as f64;
    }
    let predictions = model.predict(&candidates)?;
    Ok(argmin(&predictions.to_vec()))
}

/// Walk the selection sequence and record breakpoints.
///
/// A change between rows that share n and ppn is resolved by probing the
/// midpoint message size: a midpoint won by the old choice extends the old
/// region to the current row, one won by the new choice closes the old
/// region at the previous row, and any other winner gets its own breakpoint
/// at the current row. A change of n or ppn always records both rows.
pub fn get_rules<M>(
    rows: &[FeatureRow],
    selections: &[AlgorithmId],
    model: &M,
    num_algorithms: usize,
) -> Result<Breakpoints>
where
    M: EnsembleRegressor + ?Sized,
{
    if rows.len() != selections.len() {
        return Err(TunerError::dimension_mismatch(
            format!("{} selections", rows.len()),
            selections.len().to_string(),
        ));
    }
    let mut breakpoints = Breakpoints::new();
    let (first_row, first_selection) = match (rows.first(), selections.first()) {
        (Some(row), Some(selection)) => (*row, *selection),
        _ => return Ok(breakpoints),
    };
    breakpoints.insert(first_row, first_selection);

    for i in 1..rows.len() {
        let (prev_selection, cur_selection) = (selections[i - 1], selections[i]);
        if prev_selection == cur_selection {
            continue;
        }
        let (prev, cur) = (rows[i - 1], rows[i]);

        if prev.same_placement(&cur) {
            let midpoint = midpoint_msg_size(prev.msg_size, cur.msg_size);
            let fastest = fastest_at_midpoint(model, cur, midpoint, num_algorithms)?;
            if fastest == prev_selection {
                breakpoints.insert(cur, prev_selection);
            } else if fastest == cur_selection {
                breakpoints.insert(prev, prev_selection);
            } else {
                breakpoints.insert(prev, prev_selection);
                breakpoints.insert(cur, fastest);
            }
        } else {
            breakpoints.insert(prev, prev_selection);
            breakpoints.insert(cur, cur_selection);
        }
    }

    log::debug!("{} breakpoints over {} rows", breakpoints.len(), rows.len());
    Ok(breakpoints)
}

/// Split a trailing integer parameter off an algorithm name:
/// `recursive_multiplying16` becomes `("recursive_multiplying", Some(16))`.
pub fn split_param_alg(name: &str) -> (&str, Option<u64>) {
    let base = name.trim_end_matches(|c: char| c.is_ascii_digit());
    if base.len() == name.len() {
        return (name, None);
    }
    match name[base.len()..].parse::<u64>() {
        Ok(value) => (base, Some(value)),
        Err(_) => (name, None),
    }
}

/// Parameter key of a parameterized algorithm family, if known.
pub fn param_key(family: &str) -> Option<&'static str> {
    PARAMETER_KEYS
        .iter()
        .find(|(known, _)| *known == family)
        .map(|(_, key)| *key)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Leaf selecting `algorithm` for `collective`.
pub fn leaf_for(collective: &str, algorithm: &str) -> RuleNode {
    let (base, kind) = match collective.strip_suffix(COMPOSITION_SUFFIX) {
        Some(base) => (base, LeafKind::Composition),
        None => (collective, LeafKind::Algorithm),
    };

    let (family, value) = split_param_alg(algorithm);
    let (label, params) = match value {
        None => (algorithm, Vec::new()),
        Some(value) => match param_key(family) {
            Some(key) => (family, vec![(key.to_string(), value)]),
            None => {
                log::warn!(
                    "algorithm '{}' carries parameter {} but '{}' has no known parameter key",
                    algorithm,
                    value,
                    family
                );
                (algorithm, Vec::new())
            }
        },
    };

    let name = match kind {
        LeafKind::Algorithm => format!("MPIR_{}_intra_{}", capitalize(base), label),
        LeafKind::Composition => format!("MPIDI_{}_intra_composition_{}", capitalize(base), label),
    };
    RuleNode::Leaf { kind, name, params }
}

/// Fold breakpoints into the nested rule tree, with open bounds on the last
/// sibling of every level.
pub fn rules_to_tree(breakpoints: &Breakpoints, algorithms: &AlgorithmTable) -> Result<RuleTree> {
    let collective = algorithms.collective();
    let msg_dimension = Dimension::message_size_for(collective);

    type MsgLevel = Vec<(u64, RuleNode)>;
    let mut levels: Vec<(u64, Vec<(u64, MsgLevel)>)> = Vec::new();
    for (row, algorithm) in breakpoints {
        let leaf = leaf_for(collective, algorithms.name(*algorithm)?);
        let (n, ppn, msg_size) = (row.real_n(), row.real_ppn(), row.real_msg_size());

        let same_n = levels.last().map_or(false, |(last, _)| *last == n);
        if !same_n {
            levels.push((n, Vec::new()));
        }
        if let Some((_, ppn_levels)) = levels.last_mut() {
            let same_ppn = same_n && ppn_levels.last().map_or(false, |(last, _)| *last == ppn);
            if !same_ppn {
                ppn_levels.push((ppn, Vec::new()));
            }
            if let Some((_, msg_levels)) = ppn_levels.last_mut() {
                msg_levels.push((msg_size, leaf));
            }
        }
    }

    let nodes = levels
        .into_iter()
        .map(|(n, ppn_levels)| RuleNode::Internal {
            predicate: Predicate::at_most(Dimension::CommSize, n),
            children: ppn_levels
                .into_iter()
                .map(|(ppn, msg_levels)| RuleNode::Internal {
                    predicate: Predicate::at_most(Dimension::CommAvgPpn, ppn),
                    children: msg_levels
                        .into_iter()
                        .map(|(msg_size, leaf)| RuleNode::Internal {
                            predicate: Predicate::at_most(msg_dimension, msg_size),
                            children: vec![leaf],
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    let mut tree = RuleTree::new(nodes);
    tree.canonicalize_open_bounds();
    Ok(tree)
}

/// Mine the rule tree of a trained model over a feature space.
pub fn mine_rules<M>(
    model: &M,
    feature_space: &FeatureSpace,
    algorithms: &AlgorithmTable,
) -> Result<RuleTree>
where
    M: EnsembleRegressor + ?Sized,
{
    let num_algorithms = algorithms.len();
    let selections = predict_selections(model, feature_space.rows(), num_algorithms)?;
    let breakpoints = get_rules(feature_space.rows(), &selections, model, num_algorithms)?;
    let tree = rules_to_tree(&breakpoints, algorithms)?;
    log::info!(
        "Mined {} rules for {} from {} breakpoints",
        tree.leaves().len(),
        algorithms.collective(),
        breakpoints.len()
    );
    Ok(tree)
}
