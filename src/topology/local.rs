//! Unbounded single-machine topology for running without a cluster.

use super::{Topology, TopologySource};
use crate::config::TunerConfig;
use crate::core::error::Result;
use std::path::{Path, PathBuf};

/// Placeholder node name handed out by every local fit.
pub const LOCAL_NODE: &str = "local";

/// Every request fits; no nodefile is written.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTopology;

impl LocalTopology {
    pub fn new() -> Self {
        LocalTopology
    }
}

impl Topology for LocalTopology {
    fn fit(&mut self, _num_nodes: usize) -> Option<Vec<String>> {
        Some(vec![LOCAL_NODE.to_string()])
    }

    fn reset(&mut self) {}

    fn write_nodefile(&self, _nodes: &[String], _path: &Path) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

impl TopologySource for LocalTopology {
    fn generate_source(_config: &TunerConfig, _num_processes: u64) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    fn parse(_source: Option<&Path>) -> Result<Self> {
        Ok(LocalTopology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_always_fits() {
        let mut topology = LocalTopology::new();
        for n in [1, 64, 1 << 20] {
            assert_eq!(topology.fit(n), Some(vec![LOCAL_NODE.to_string()]));
        }
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nodefile");
        assert!(topology.write_nodefile(&[], &path).unwrap().is_none());
        assert!(!path.exists());
    }
}
