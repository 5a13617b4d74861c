//! Cluster topology models used to pack benchmark jobs without interference.
//!
//! Every variant tracks which parts of the allocation are already claimed in
//! the current *fitting epoch*. A fit claims capacity until [`reset`] is
//! called; nothing handed out by a fit is handed out again within the epoch.
//!
//! Two contracts exist. [`Topology`] variants return the names of the nodes
//! they hand out, so a nodefile can pin each job to its placement.
//! [`CountedTopology`] variants only know node counts and answer yes or no.
//! [`ClusterTopology`] wraps either one for the scheduler.
//!
//! [`reset`]: Topology::reset

/// Dragonfly group → chassis → node.
pub mod dragonfly_chassis;
/// Dragonfly group → rack → node.
pub mod dragonfly_rack;
/// Single synthetic node with unbounded capacity.
pub mod local;
/// Shared two-level pool used by the dragonfly variants.
pub mod pool;
/// Paired racks tracked by node counts.
pub mod rack_pair;
/// One job per fitting epoch.
pub mod serial;

pub use dragonfly_chassis::DragonflyChassisTopology;
pub use dragonfly_rack::DragonflyRackTopology;
pub use local::LocalTopology;
pub use pool::{DragonflyPool, NodeNaming};
pub use rack_pair::RackPairTopology;
pub use serial::SerialTopology;

use crate::config::{TopologyKind, TunerConfig};
use crate::core::error::Result;
use std::path::{Path, PathBuf};

/// Node-returning topology contract.
pub trait Topology: Send {
    /// Claim `num_nodes` nodes, returning their names, or `None` when the
    /// request cannot be satisfied in this epoch.
    fn fit(&mut self, num_nodes: usize) -> Option<Vec<String>>;

    /// Start a new fitting epoch.
    fn reset(&mut self);

    /// Write a nodefile for a placement. Variants without real node names
    /// write nothing and return `None`.
    fn write_nodefile(&self, nodes: &[String], path: &Path) -> Result<Option<PathBuf>>;
}

/// Count-only topology contract: a fit only says whether the job fits.
pub trait CountedTopology: Send {
    /// Claim capacity for `num_nodes` nodes.
    fn fits(&mut self, num_nodes: usize) -> bool;

    /// Start a new fitting epoch.
    fn reset(&mut self);
}

/// Construction of a topology from the live allocation.
pub trait TopologySource: Sized {
    /// Produce the file describing the current allocation, if the variant needs one.
    fn generate_source(config: &TunerConfig, num_processes: u64) -> Result<Option<PathBuf>>;

    /// Build a topology instance from a source produced by [`generate_source`].
    ///
    /// [`generate_source`]: TopologySource::generate_source
    fn parse(source: Option<&Path>) -> Result<Self>;

    /// Generate and parse in one step.
    fn discover(config: &TunerConfig, num_processes: u64) -> Result<Self> {
        let source = Self::generate_source(config, num_processes)?;
        Self::parse(source.as_deref())
    }
}

/// Outcome of a successful fit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Named nodes assigned to the job
    Nodes(Vec<String>),
    /// Capacity reserved without node identities
    Reserved,
}

/// The topology instance driven by the batch scheduler.
pub enum ClusterTopology {
    /// A node-returning variant
    Named(Box<dyn Topology>),
    /// A count-only variant
    Counted(Box<dyn CountedTopology>),
}

impl ClusterTopology {
    /// Discover the topology variant selected in the configuration.
    pub fn from_config(config: &TunerConfig, num_processes: u64) -> Result<Self> {
        log::info!(
            "Discovering {} topology for {} processes",
            config.topology,
            num_processes
        );
        let topology = match config.topology {
            TopologyKind::DragonflyRack => {
                ClusterTopology::Named(Box::new(DragonflyRackTopology::discover(config, num_processes)?))
            }
            TopologyKind::DragonflyChassis => ClusterTopology::Named(Box::new(
                DragonflyChassisTopology::discover(config, num_processes)?,
            )),
            TopologyKind::RackPair => {
                ClusterTopology::Counted(Box::new(RackPairTopology::discover(config, num_processes)?))
            }
            TopologyKind::Local => {
                ClusterTopology::Named(Box::new(LocalTopology::discover(config, num_processes)?))
            }
            TopologyKind::Serial => {
                ClusterTopology::Named(Box::new(SerialTopology::discover(config, num_processes)?))
            }
        };
        Ok(topology)
    }

    /// Attempt to fit a job of `num_nodes` nodes.
    pub fn fit(&mut self, num_nodes: usize) -> Option<Placement> {
        match self {
            ClusterTopology::Named(topology) => topology.fit(num_nodes).map(Placement::Nodes),
            ClusterTopology::Counted(topology) => {
                topology.fits(num_nodes).then_some(Placement::Reserved)
            }
        }
    }

    /// Start a new fitting epoch.
    pub fn reset(&mut self) {
        match self {
            ClusterTopology::Named(topology) => topology.reset(),
            ClusterTopology::Counted(topology) => topology.reset(),
        }
    }

    /// Materialize the nodefile of a placement, if the variant supports one.
    pub fn write_nodefile(&self, placement: &Placement, path: &Path) -> Result<Option<PathBuf>> {
        match (self, placement) {
            (ClusterTopology::Named(topology), Placement::Nodes(nodes)) => {
                topology.write_nodefile(nodes, path)
            }
            _ => Ok(None),
        }
    }
}

impl From<Box<dyn Topology>> for ClusterTopology {
    fn from(topology: Box<dyn Topology>) -> Self {
        ClusterTopology::Named(topology)
    }
}

/// Write node names one per line, without a trailing newline.
pub fn write_nodefile(nodes: &[String], path: &Path) -> Result<PathBuf> {
    std::fs::write(path, nodes.join("\n"))?;
    log::debug!("wrote nodefile {} ({} nodes)", path.display(), nodes.len());
    Ok(path.to_path_buf())
}
