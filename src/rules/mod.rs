//! Decision-rule trees mined from a trained model.
//!
//! A [`RuleTree`] is an ordered list of sibling [`RuleNode`]s. Internal nodes
//! test one dimension against a threshold; leaves name the algorithm (or
//! composition) to use plus its parameter keys. Order matters: the runtime
//! consuming the document takes the first matching sibling, so the tree is
//! only ever turned into its external form (an ordered JSON mapping) by
//! [`RuleTree::to_json`].

pub mod document;
pub mod miner;

use serde_json::{Map, Value};
use std::fmt;

/// Quantity a rule predicate compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    CommSize,
    CommAvgPpn,
    AvgMsgSize,
    TotalMsgSize,
}

impl Dimension {
    pub fn key(&self) -> &'static str {
        match self {
            Dimension::CommSize => "comm_size",
            Dimension::CommAvgPpn => "comm_avg_ppn",
            Dimension::AvgMsgSize => "avg_msg_size",
            Dimension::TotalMsgSize => "total_msg_size",
        }
    }

    /// Message-size dimension used for a collective: allgather and
    /// reduce_scatter families are keyed on the total size.
    pub fn message_size_for(collective: &str) -> Self {
        if collective.starts_with("allgather") || collective.starts_with("reduce_scatter") {
            Dimension::TotalMsgSize
        } else {
            Dimension::AvgMsgSize
        }
    }
}

/// Upper bound of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    /// `dimension<=value`
    AtMost(u64),
    /// `dimension=any`, the open bound of the last sibling
    Any,
}

/// A single `dimension<=value` / `dimension=any` test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Predicate {
    pub dimension: Dimension,
    pub threshold: Threshold,
}

impl Predicate {
    pub fn at_most(dimension: Dimension, value: u64) -> Self {
        Predicate {
            dimension,
            threshold: Threshold::AtMost(value),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.threshold {
            Threshold::AtMost(value) => write!(f, "{}<={}", self.dimension.key(), value),
            Threshold::Any => write!(f, "{}=any", self.dimension.key()),
        }
    }
}

/// What a leaf selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    Algorithm,
    Composition,
}

impl LeafKind {
    pub fn key(&self) -> &'static str {
        match self {
            LeafKind::Algorithm => "algorithm",
            LeafKind::Composition => "composition",
        }
    }
}

/// Node of a decision-rule tree.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleNode {
    Internal {
        predicate: Predicate,
        children: Vec<RuleNode>,
    },
    Leaf {
        kind: LeafKind,
        /// Fully qualified name, e.g. `MPIR_Bcast_intra_binomial`
        name: String,
        /// Parameter key/value pairs, rendered as `key=value`
        params: Vec<(String, u64)>,
    },
}

impl RuleNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self, RuleNode::Leaf { .. })
    }

    /// External mapping key of this node.
    pub fn key(&self) -> String {
        match self {
            RuleNode::Internal { predicate, .. } => predicate.to_string(),
            RuleNode::Leaf { kind, name, .. } => format!("{}={}", kind.key(), name),
        }
    }

    fn to_json_value(&self) -> Value {
        match self {
            RuleNode::Internal { children, .. } => Value::Object(nodes_to_json(children)),
            RuleNode::Leaf { params, .. } => Value::Object(
                params
                    .iter()
                    .map(|(key, value)| (format!("{}={}", key, value), Value::Object(Map::new())))
                    .collect(),
            ),
        }
    }
}

fn nodes_to_json(nodes: &[RuleNode]) -> Map<String, Value> {
    nodes
        .iter()
        .map(|node| (node.key(), node.to_json_value()))
        .collect()
}

/// Ordered forest of sibling rule nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleTree {
    pub nodes: Vec<RuleNode>,
}

impl RuleTree {
    pub fn new(nodes: Vec<RuleNode>) -> Self {
        RuleTree { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Rewrite the last sibling at every level to an open `=any` bound.
    pub fn canonicalize_open_bounds(&mut self) {
        canonicalize_level(&mut self.nodes);
    }

    /// Every leaf in document order.
    pub fn leaves(&self) -> Vec<&RuleNode> {
        let mut out = Vec::new();
        let mut stack: Vec<&RuleNode> = self.nodes.iter().rev().collect();
        while let Some(node) = stack.pop() {
            match node {
                RuleNode::Internal { children, .. } => stack.extend(children.iter().rev()),
                leaf => out.push(leaf),
            }
        }
        out
    }

    /// External form: an ordered JSON mapping.
    pub fn to_json(&self) -> Value {
        Value::Object(nodes_to_json(&self.nodes))
    }
}

fn canonicalize_level(nodes: &mut [RuleNode]) {
    match nodes.last_mut() {
        Some(RuleNode::Internal { predicate, .. }) => predicate.threshold = Threshold::Any,
        _ => return,
    }
    for node in nodes.iter_mut() {
        if let RuleNode::Internal { children, .. } = node {
            canonicalize_level(children);
        }
    }
}
