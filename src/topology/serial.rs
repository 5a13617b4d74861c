//! Topology that admits one job per fitting epoch, forcing sequential runs.

use super::{Topology, TopologySource};
use crate::config::TunerConfig;
use crate::core::error::Result;
use std::path::{Path, PathBuf};

/// Placeholder node name handed out by the single serial fit.
pub const SERIAL_NODE: &str = "serial";

#[derive(Debug, Clone, Default)]
pub struct SerialTopology {
    claimed: bool,
}

impl SerialTopology {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Topology for SerialTopology {
    fn fit(&mut self, _num_nodes: usize) -> Option<Vec<String>> {
        if self.claimed {
            return None;
        }
        self.claimed = true;
        Some(vec![SERIAL_NODE.to_string()])
    }

    fn reset(&mut self) {
        self.claimed = false;
    }

    fn write_nodefile(&self, _nodes: &[String], _path: &Path) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

impl TopologySource for SerialTopology {
    fn generate_source(_config: &TunerConfig, _num_processes: u64) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    fn parse(_source: Option<&Path>) -> Result<Self> {
        Ok(SerialTopology::new())
    }
}
