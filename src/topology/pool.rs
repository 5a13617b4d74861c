//! Two-level capacity pool: dragonfly groups made of sub-pools of named nodes.
//!
//! Fitting is depth-first and greedy in discovery order. The first time a
//! sub-pool is touched in an epoch it is marked full, even when only some of
//! its nodes were taken, so leftover capacity in a partially used sub-pool is
//! not handed out again until [`DragonflyPool::reset`]. A sub-pool without
//! nodes is always full. A failed fit still leaves the sub-pools it touched
//! marked full.

use crate::core::error::{Result, TunerError};
use std::marker::PhantomData;
use std::path::Path;

/// Hostname scheme of a dragonfly machine.
pub trait NodeNaming {
    /// Label of the sub-pool level, used in log output.
    const SUBPOOL_LABEL: &'static str;

    /// Dragonfly group id and sub-pool name of a node, or a reason why the
    /// hostname does not follow the scheme.
    fn locate(node: &str) -> std::result::Result<(u32, String), String>;
}

/// A rack or chassis: an ordered list of node names with an epoch flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubPool {
    name: String,
    nodes: Vec<String>,
    full: bool,
}

impl SubPool {
    fn new(name: String) -> Self {
        SubPool {
            name,
            nodes: Vec::new(),
            full: false,
        }
    }

    fn add_node(&mut self, node: &str) {
        if !self.nodes.iter().any(|n| n == node) {
            self.nodes.push(node.to_string());
        }
    }

    /// Sub-pool name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nodes in discovery order.
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Claimed in this epoch, or without nodes.
    pub fn is_full(&self) -> bool {
        self.nodes.is_empty() || self.full
    }

    fn fit(&mut self, num_nodes: usize) -> &[String] {
        self.full = true;
        &self.nodes[..num_nodes.min(self.nodes.len())]
    }
}

/// One dragonfly group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolGroup {
    id: u32,
    pools: Vec<SubPool>,
}

impl PoolGroup {
    /// Group id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Sub-pools in discovery order.
    pub fn pools(&self) -> &[SubPool] {
        &self.pools
    }

    /// True when every sub-pool is full.
    pub fn is_full(&self) -> bool {
        self.pools.iter().all(SubPool::is_full)
    }

    fn fit(&mut self, num_nodes: usize, assigned: &mut Vec<String>) {
        let target = assigned.len() + num_nodes;
        for pool in &mut self.pools {
            if assigned.len() >= target {
                return;
            }
            if !pool.is_full() {
                let need = target - assigned.len();
                assigned.extend_from_slice(pool.fit(need));
            }
        }
    }
}

/// Dragonfly capacity pool parameterized by the machine's hostname scheme.
#[derive(Debug, Clone)]
pub struct DragonflyPool<N> {
    groups: Vec<PoolGroup>,
    _naming: PhantomData<fn() -> N>,
}

impl<N> Default for DragonflyPool<N> {
    fn default() -> Self {
        DragonflyPool {
            groups: Vec::new(),
            _naming: PhantomData,
        }
    }
}

impl<N: NodeNaming> DragonflyPool<N> {
    /// Empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node by hostname, creating its group and sub-pool on first sight.
    pub fn add_node(&mut self, node: &str) -> std::result::Result<(), String> {
        let (group_id, pool_name) = N::locate(node)?;

        let group = match self.groups.iter().position(|g| g.id == group_id) {
            Some(index) => &mut self.groups[index],
            None => {
                self.groups.push(PoolGroup {
                    id: group_id,
                    pools: Vec::new(),
                });
                let last = self.groups.len() - 1;
                &mut self.groups[last]
            }
        };

        let pool = match group.pools.iter().position(|p| p.name == pool_name) {
            Some(index) => &mut group.pools[index],
            None => {
                group.pools.push(SubPool::new(pool_name));
                let last = group.pools.len() - 1;
                &mut group.pools[last]
            }
        };

        pool.add_node(node);
        Ok(())
    }

    /// Read a node list, one hostname per line. Blank lines are ignored.
    pub fn from_node_list(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut pool = Self::new();
        for (index, line) in content.lines().enumerate() {
            let node = line.trim();
            if node.is_empty() {
                continue;
            }
            pool.add_node(node)
                .map_err(|reason| TunerError::topology_parse(path, index + 1, reason))?;
        }
        pool.log_summary();
        Ok(pool)
    }

    /// Groups in discovery order.
    pub fn groups(&self) -> &[PoolGroup] {
        &self.groups
    }

    /// Total number of distinct nodes.
    pub fn num_nodes(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|g| g.pools.iter())
            .map(|p| p.nodes.len())
            .sum()
    }

    /// Claim `num_nodes` nodes, or `None` when the epoch cannot supply them.
    pub fn fit(&mut self, num_nodes: usize) -> Option<Vec<String>> {
        let mut assigned = Vec::with_capacity(num_nodes);
        for group in &mut self.groups {
            if assigned.len() >= num_nodes {
                break;
            }
            if !group.is_full() {
                let need = num_nodes - assigned.len();
                group.fit(need, &mut assigned);
            }
        }

        if assigned.len() >= num_nodes {
            log::debug!("fit {} nodes starting at {:?}", num_nodes, assigned.first());
            Some(assigned)
        } else {
            log::debug!("fit of {} nodes failed ({} available)", num_nodes, assigned.len());
            None
        }
    }

    /// Start a new fitting epoch.
    pub fn reset(&mut self) {
        for pool in self.groups.iter_mut().flat_map(|g| g.pools.iter_mut()) {
            pool.full = false;
        }
    }

    fn log_summary(&self) {
        log::info!(
            "Topology loaded: {} dragonfly groups, {} nodes",
            self.groups.len(),
            self.num_nodes()
        );
        for group in &self.groups {
            let pools: Vec<String> = group
                .pools
                .iter()
                .map(|p| format!("{} {} ({})", N::SUBPOOL_LABEL, p.name, p.nodes.len()))
                .collect();
            log::debug!("  group {}: {}", group.id, pools.join(", "));
        }
    }
}
