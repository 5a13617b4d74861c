//! Dragonfly machines whose hostnames encode a rack number, with a fixed
//! number of racks per dragonfly group (`x3005c0s25b1n0...` is rack 3005 in
//! group 751).

use super::pool::{DragonflyPool, NodeNaming};
use super::{write_nodefile, Topology, TopologySource};
use crate::config::TunerConfig;
use crate::core::constants::{BATCH_NODEFILE_ENV, RACKS_PER_DRAGONFLY_GROUP};
use crate::core::error::{Result, TunerError};
use std::path::{Path, PathBuf};

/// Rack name of a hostname: the four characters after the leading letter.
pub fn rack_name(node: &str) -> Option<&str> {
    node.get(1..5)
}

/// Dragonfly group of a hostname.
pub fn dragonfly_group(node: &str) -> Option<u32> {
    rack_name(node)?
        .parse::<u32>()
        .ok()
        .map(|rack| rack / RACKS_PER_DRAGONFLY_GROUP)
}

/// Hostname scheme: racks grouped by integer division.
#[derive(Debug, Clone, Copy)]
pub struct RackNaming;

impl NodeNaming for RackNaming {
    const SUBPOOL_LABEL: &'static str = "rack";

    fn locate(node: &str) -> std::result::Result<(u32, String), String> {
        match (rack_name(node), dragonfly_group(node)) {
            (Some(rack), Some(group)) => Ok((group, rack.to_string())),
            _ => Err(format!("'{}' does not carry a numeric rack id", node)),
        }
    }
}

/// Dragonfly group → rack → node topology.
#[derive(Debug, Default)]
pub struct DragonflyRackTopology {
    pool: DragonflyPool<RackNaming>,
}

impl DragonflyRackTopology {
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
        Ok(DragonflyRackTopology { pool })
    }

    /// Underlying pool.
    pub fn pool(&self) -> &DragonflyPool<RackNaming> {
        &self.pool
    }
}

impl Topology for DragonflyRackTopology {
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

impl TopologySource for DragonflyRackTopology {
    /// The batch system's own node list describes the allocation.
    fn generate_source(_config: &TunerConfig, _num_processes: u64) -> Result<Option<PathBuf>> {
        batch_nodefile().map(Some)
    }

    fn parse(source: Option<&Path>) -> Result<Self> {
        let path = source.ok_or_else(|| TunerError::config("dragonfly topology needs a node list"))?;
        Ok(DragonflyRackTopology {
            pool: DragonflyPool::from_node_list(path)?,
        })
    }
}

/// Path of the batch system's node list, taken from the environment.
pub(crate) fn batch_nodefile() -> Result<PathBuf> {
    std::env::var_os(BATCH_NODEFILE_ENV)
        .map(PathBuf::from)
        .ok_or_else(|| TunerError::config(format!("{} is not set", BATCH_NODEFILE_ENV)))
}
