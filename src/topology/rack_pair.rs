//! Rack-pair machines.
//!
//! Racks are paired within the same decade (`c4-1` pairs with `c5-1`, rack 41
//! with 51) and only node counts are tracked: a fit answers whether the job
//! fits, and no nodefile is ever produced. The allocation is discovered by
//! running a node query under the launcher and reading the `cname` lines it prints.

use super::{CountedTopology, TopologySource};
use crate::config::TunerConfig;
use crate::core::constants::RACK_PAIR_CNAME_MARKER;
use crate::core::error::{Result, TunerError};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// File the node query output is captured into, inside the scratch root.
pub const NODE_QUERY_OUTPUT_FILE: &str = "topo.out";

/// Node name of a node query output line, if the line reports one.
pub fn node_name_from_line(line: &str) -> Option<&str> {
    line.find(RACK_PAIR_CNAME_MARKER)
        .map(|index| line[index + RACK_PAIR_CNAME_MARKER.len()..].trim_end())
}

/// Rack number of a node name: the digits on both sides of the dash.
///
/// `Ok(None)` means the name has no dash and is ignored.
pub fn rack_from_name(node: &str) -> std::result::Result<Option<u32>, String> {
    let bytes = node.as_bytes();
    let dash = match node.find('-') {
        Some(dash) => dash,
        None => return Ok(None),
    };
    let digit = |index: Option<usize>| {
        index
            .and_then(|i| bytes.get(i))
            .filter(|b| b.is_ascii_digit())
            .map(|b| u32::from(b - b'0'))
    };
    match (digit(dash.checked_sub(1)), digit(Some(dash + 1))) {
        (Some(cabinet), Some(row)) => Ok(Some(cabinet * 10 + row)),
        _ => Err(format!("'{}' has no digits around its dash", node)),
    }
}

/// Node names of a compute blade carry exactly two `c`, one `s` and one `n`.
fn is_compute_node(node: &str) -> bool {
    let count = |ch| node.chars().filter(|c| *c == ch).count();
    count('c') == 2 && count('s') == 1 && count('n') == 1
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rack {
    id: u32,
    nodes: Vec<String>,
    full: bool,
}

impl Rack {
    fn new(id: u32) -> Self {
        Rack {
            id,
            nodes: Vec::new(),
            full: false,
        }
    }

    fn is_full(&self) -> bool {
        self.nodes.is_empty() || self.full
    }

    fn fit(&mut self, num_nodes: usize) -> usize {
        self.full = true;
        num_nodes.min(self.nodes.len())
    }
}

/// Two sibling racks of one decade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RackPair {
    racks: [Rack; 2],
}

impl RackPair {
    /// Pair containing `rack`: odd racks pair with the rack ten below,
    /// even racks with the rack ten above.
    pub fn containing(rack: u32) -> Self {
        let (first, second) = if (rack % 10) % 2 == 1 {
            (rack.saturating_sub(10), rack)
        } else {
            (rack, rack + 10)
        };
        RackPair {
            racks: [Rack::new(first), Rack::new(second)],
        }
    }

    /// Rack ids of the pair.
    pub fn rack_ids(&self) -> (u32, u32) {
        (self.racks[0].id, self.racks[1].id)
    }

    /// Node counts of the two racks.
    pub fn node_counts(&self) -> (usize, usize) {
        (self.racks[0].nodes.len(), self.racks[1].nodes.len())
    }

    /// Nodes of one rack of the pair (0 or 1).
    pub fn nodes(&self, rack: usize) -> &[String] {
        self.racks.get(rack).map(|r| r.nodes.as_slice()).unwrap_or(&[])
    }

    fn contains(&self, rack: u32) -> bool {
        self.racks.iter().any(|r| r.id == rack)
    }

    fn add_node(&mut self, rack: u32, node: &str) {
        if let Some(target) = self.racks.iter_mut().find(|r| r.id == rack) {
            if !target.nodes.iter().any(|n| n == node) {
                target.nodes.push(node.to_string());
            }
        }
    }

    fn is_full(&self) -> bool {
        self.racks.iter().all(Rack::is_full)
    }

    fn fit(&mut self, num_nodes: usize) -> usize {
        let mut remaining = num_nodes;
        let mut placed = 0;
        for rack in &mut self.racks {
            if remaining == 0 {
                break;
            }
            if !rack.is_full() {
                let taken = rack.fit(remaining);
                placed += taken;
                remaining -= taken;
            }
        }
        placed
    }

    fn reset(&mut self) {
        for rack in &mut self.racks {
            rack.full = false;
        }
    }
}

/// Count-only topology of rack pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RackPairTopology {
    pairs: Vec<RackPair>,
}

impl RackPairTopology {
    /// Add a node to its rack, creating the rack pair on first sight.
    pub fn add_node(&mut self, rack: u32, node: &str) {
        let index = match self.pairs.iter().position(|p| p.contains(rack)) {
            Some(index) => index,
            None => {
                self.pairs.push(RackPair::containing(rack));
                self.pairs.len() - 1
            }
        };
        self.pairs[index].add_node(rack, node);
    }

    /// Build from node query output text. Lines without a `cname` entry and names
    /// that are not compute nodes are skipped.
    pub fn from_node_query_output(content: &str, path: &Path) -> Result<Self> {
        let mut topology = RackPairTopology::default();
        for (index, line) in content.lines().enumerate() {
            let node = match node_name_from_line(line) {
                Some(node) => node,
                None => continue,
            };
            let rack = rack_from_name(node)
                .map_err(|reason| TunerError::topology_parse(path, index + 1, reason))?;
            match rack {
                Some(rack) if is_compute_node(node) => topology.add_node(rack, node),
                _ => log::debug!("skipping non-compute entry '{}'", node),
            }
        }

        log::info!("Topology loaded: {} rack pairs", topology.pairs.len());
        for pair in &topology.pairs {
            log::debug!("  racks {:?}: {:?} nodes", pair.rack_ids(), pair.node_counts());
        }
        Ok(topology)
    }

    /// Rack pairs in discovery order.
    pub fn pairs(&self) -> &[RackPair] {
        &self.pairs
    }
}

impl CountedTopology for RackPairTopology {
    fn fits(&mut self, num_nodes: usize) -> bool {
        let mut unassigned = num_nodes;
        for pair in &mut self.pairs {
            if !pair.is_full() {
                unassigned -= pair.fit(unassigned);
                if unassigned == 0 {
                    return true;
                }
            }
        }
        false
    }

    fn reset(&mut self) {
        for pair in &mut self.pairs {
            pair.reset();
        }
    }
}

impl TopologySource for RackPairTopology {
    /// Run the node query on every allocated process and capture its output.
    fn generate_source(config: &TunerConfig, num_processes: u64) -> Result<Option<PathBuf>> {
        let query = config
            .node_query
            .as_ref()
            .ok_or_else(|| TunerError::config("rack-pair topology needs node_query"))?;
        let output_path = config.scratch_root.join(NODE_QUERY_OUTPUT_FILE);
        let output = std::fs::File::create(&output_path)?;

        let status = Command::new("aprun")
            .arg("-n")
            .arg(num_processes.to_string())
            .arg(query)
            .stdout(Stdio::from(output))
            .status()?;
        if !status.success() {
            log::warn!("node query exited with {}", status);
        }
        Ok(Some(output_path))
    }

    fn parse(source: Option<&Path>) -> Result<Self> {
        let path = source.ok_or_else(|| TunerError::config("rack-pair topology needs node query output"))?;
        let content = std::fs::read_to_string(path)?;
        Self::from_node_query_output(&content, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cname_lines(nodes: &[&str]) -> String {
        nodes
            .iter()
            .enumerate()
            .map(|(i, n)| format!("{}: /proc/cray_xt/cname = {}", i, n))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_line_parsing() {
        assert_eq!(
            node_name_from_line("11: /proc/cray_xt/cname = c6-0c1s3n1 \n"),
            Some("c6-0c1s3n1")
        );
        assert_eq!(node_name_from_line("Application 1 resources"), None);
        assert_eq!(rack_from_name("c5-1c1s3n1"), Ok(Some(51)));
        assert_eq!(rack_from_name("nid00012"), Ok(None));
        assert!(rack_from_name("cx-yc1s3n1").is_err());
    }

    #[test]
    fn test_pairing_rule() {
        assert_eq!(RackPair::containing(51).rack_ids(), (41, 51));
        assert_eq!(RackPair::containing(60).rack_ids(), (60, 70));
    }

    #[test]
    fn test_simple_node_query_output() {
        let text = cname_lines(&["c5-1c1s3n1", "c6-0c1s3n1"]);
        let topology = RackPairTopology::from_node_query_output(&text, Path::new("topo.out")).unwrap();
        assert_eq!(topology.pairs().len(), 2);
        assert_eq!(topology.pairs()[0].rack_ids(), (41, 51));
        assert_eq!(topology.pairs()[0].node_counts(), (0, 1));
        assert_eq!(topology.pairs()[1].rack_ids(), (60, 70));
        assert_eq!(topology.pairs()[1].node_counts(), (1, 0));
        assert_eq!(topology.pairs()[1].nodes(0), &["c6-0c1s3n1".to_string()]);
    }

    #[test]
    fn test_non_compute_names_skipped() {
        let text = cname_lines(&["c6-1c1s1n3", "c6-1c1s1n3", "c6-1s1n3", "c6-1c1c1s1n3"]);
        let topology = RackPairTopology::from_node_query_output(&text, Path::new("topo.out")).unwrap();
        assert_eq!(topology.pairs().len(), 1);
        assert_eq!(topology.pairs()[0].rack_ids(), (51, 61));
        assert_eq!(topology.pairs()[0].node_counts(), (0, 1));
    }

    #[test]
    fn test_counted_fit() {
        let mut topology = RackPairTopology::default();
        for slot in 0..3 {
            topology.add_node(60, &format!("c6-0c0s{}n0", slot));
        }
        for slot in 0..2 {
            topology.add_node(70, &format!("c7-0c0s{}n0", slot));
        }
        topology.add_node(80, "c8-0c0s0n0");
        assert_eq!(topology.pairs().len(), 2);

        // rack 60 is claimed whole even though only two of its nodes are used
        assert!(topology.fits(2));
        assert!(topology.fits(3));
        assert!(!topology.fits(1));

        topology.reset();
        assert!(topology.fits(6));
        topology.reset();
        assert!(!topology.fits(7));
        assert!(!topology.fits(1));
    }
}
