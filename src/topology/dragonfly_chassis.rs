//! Dragonfly machines where every rack is its own dragonfly group and jobs
//! are packed per chassis (`x4407c3s1b0n0...` is chassis 3 of group 4407).

use super::dragonfly_rack::batch_nodefile;
use super::pool::{DragonflyPool, NodeNaming};
use super::{write_nodefile, Topology, TopologySource};
use crate::config::TunerConfig;
use crate::core::error::{Result, TunerError};
use std::path::{Path, PathBuf};

/// Chassis name of a hostname.
pub fn chassis_name(node: &str) -> Option<&str> {
    node.get(6..7)
}

/// Dragonfly group of a hostname: the numeric rack id itself.
pub fn dragonfly_group(node: &str) -> Option<u32> {
    node.get(1..5)?.parse().ok()
}

/// Hostname scheme: group from the rack digits, chassis from one character.
#[derive(Debug, Clone, Copy)]
pub struct ChassisNaming;

impl NodeNaming for ChassisNaming {
    const SUBPOOL_LABEL: &'static str = "chassis";

    fn locate(node: &str) -> std::result::Result<(u32, String), String> {
        match (dragonfly_group(node), chassis_name(node)) {
            (Some(group), Some(chassis)) => Ok((group, chassis.to_string())),
            _ => Err(format!("'{}' does not carry rack and chassis ids", node)),
        }
    }
}

/// Dragonfly group → chassis → node topology.
#[derive(Debug, Default)]
pub struct DragonflyChassisTopology {
    pool: DragonflyPool<ChassisNaming>,
}

impl DragonflyChassisTopology {
    /// Build a topology from a list of hostnames.
    pub fn from_nodes<I, S>(nodes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut pool = DragonflyPool::new();
        for node in nodes {
            pool.add_node(node.as_ref()).map_err(TunerError::config)?;
        }
        Ok(DragonflyChassisTopology { pool })
    }

    /// Underlying pool.
    pub fn pool(&self) -> &DragonflyPool<ChassisNaming> {
        &self.pool
    }
}

impl Topology for DragonflyChassisTopology {
    fn fit(&mut self, num_nodes: usize) -> Option<Vec<String>> {
        self.pool.fit(num_nodes)
    }

    fn reset(&mut self) {
        self.pool.reset();
    }

    fn write_nodefile(&self, nodes: &[String], path: &Path) -> Result<Option<PathBuf>> {
        write_nodefile(nodes, path).map(Some)
    }
}

impl TopologySource for DragonflyChassisTopology {
    fn generate_source(_config: &TunerConfig, _num_processes: u64) -> Result<Option<PathBuf>> {
        batch_nodefile().map(Some)
    }

    fn parse(source: Option<&Path>) -> Result<Self> {
        let path = source.ok_or_else(|| TunerError::config("dragonfly topology needs a node list"))?;
        Ok(DragonflyChassisTopology {
            pool: DragonflyPool::from_node_list(path)?,
        })
    }
}
