//! Common test utilities for collective tuner integration tests.

#![allow(dead_code)]

use collective_tuner::*;
use ndarray::{Array1, Array2};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Domain suffix of Polaris compute node hostnames.
pub const POLARIS_SUFFIX: &str = ".hsn.cm.polaris.alcf.anl.gov";

/// Candidate bcast algorithms in table order.
pub const BCAST_ALGORITHMS: [&str; 3] = [
    "binomial",
    "scatter_recursive_doubling_allgather",
    "scatter_ring_allgather",
];

/// Polaris hostname for a rack and a `s<slot>b<blade>` position.
pub fn polaris_host(rack: u32, slot: &str) -> String {
    format!("x{}c0s{}n0{}", rack, slot, POLARIS_SUFFIX)
}

/// One rack with two nodes.
pub fn polaris_simple_nodes() -> Vec<String> {
    vec![polaris_host(3005, "25b1"), polaris_host(3005, "31b0")]
}

/// Two dragonfly groups: 800 (racks 3201, 3202) and 750 (racks 3002, 3003),
/// 24 nodes in total.
pub fn polaris_complex_nodes() -> Vec<String> {
    let racks: [(u32, &[&str]); 4] = [
        (3201, &["31b1", "25b0", "19b1", "13b0", "7b1"]),
        (3202, &["13b0", "13b1", "19b0"]),
        (
            3002,
            &["19b1", "13b1", "1b1", "1b0", "25b0", "25b1", "31b0", "31b1", "13b0", "19b0", "7b1"],
        ),
        (3003, &["13b0", "13b1", "19b1", "7b0", "1b1"]),
    ];
    racks
        .iter()
        .flat_map(|(rack, slots)| slots.iter().map(move |slot| polaris_host(*rack, slot)))
        .collect()
}

/// Write a node list (one hostname per line) into `dir`.
pub fn write_node_list(dir: &Path, name: &str, nodes: &[String]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, nodes.join("\n")).expect("Failed to write node list");
    path
}

/// Deterministic latency model: small messages favour the first algorithm,
/// large ones the last, with a per-node overhead.
pub fn synthetic_latency(job: &JobContext) -> f64 {
    let index = BCAST_ALGORITHMS
        .iter()
        .position(|name| *name == job.algorithm)
        .unwrap_or(job.algorithm.len() % 3) as f64;
    let startup = 2.0 + 3.0 * index;
    let per_byte = 1.0 / (1.0 + index);
    startup * (job.n * job.ppn) as f64 + per_byte * job.msg_size as f64
}

/// Runner backed by [`synthetic_latency`].
pub fn synthetic_runner(job: &JobContext, _nodefile: Option<&Path>) -> Result<f64> {
    Ok(synthetic_latency(job))
}

/// Algorithm table CSV covering bcast and allreduce.
pub fn write_algorithm_csv(dir: &Path) -> PathBuf {
    let path = dir.join("all_algs.csv");
    fs::write(
        &path,
        "bcast,binomial,scatter_recursive_doubling_allgather,scatter_ring_allgather,smp\n\
         allreduce,recursive_doubling,reduce_scatter_allgather,tree2\n",
    )
    .expect("Failed to write algorithm table");
    path
}

/// Minimal runtime rule document.
pub fn generic_document() -> Value {
    json!({
        "collective=bcast": {
            "comm_type=intra": {"algorithm=MPIR_Bcast_intra_binomial": {}},
            "comm_type=inter": {"algorithm=MPIR_Bcast_inter_remote_send_local_bcast": {}}
        },
        "collective=allreduce": {
            "comm_type=intra": {"algorithm=MPIR_Allreduce_intra_recursive_doubling": {}},
            "comm_type=inter": {"algorithm=MPIR_Allreduce_inter_reduce_exchange_bcast": {}}
        }
    })
}

/// Shell template for allreduce with one splice point.
pub fn allreduce_shell() -> Value {
    json!({
        "is_op_built_in=no": {"algorithm=MPIR_Allreduce_intra_recursive_doubling": {}},
        "is_op_built_in=yes": {
            "is_commutative=no": {"algorithm=MPIR_Allreduce_intra_recursive_doubling": {}},
            "is_commutative=yes": {"replace me": {}}
        }
    })
}

/// Ensemble whose members agree once enough rows have been measured.
///
/// Every member predicts a smooth function of message size and algorithm;
/// member `m` adds `m / rows` until `settle_at` training rows exist.
#[derive(Debug, Clone)]
pub struct SettlingEnsemble {
    pub settle_at: usize,
    rows: usize,
}

impl SettlingEnsemble {
    pub fn new(settle_at: usize) -> Self {
        SettlingEnsemble { settle_at, rows: 0 }
    }
}

impl EnsembleRegressor for SettlingEnsemble {
    fn fit(&mut self, features: &Array2<f64>, _targets: &Array1<f64>) -> Result<()> {
        self.rows = features.nrows();
        Ok(())
    }

    fn num_members(&self) -> usize {
        4
    }

    fn predict_member(&self, member: usize, features: &Array2<f64>) -> Result<Array1<f64>> {
        let spread = if self.rows >= self.settle_at {
            0.0
        } else {
            member as f64 / self.rows.max(1) as f64
        };
        Ok(features
            .rows()
            .into_iter()
            .map(|row| (row[2] - 1.5) * (row[3] - 1.0) + spread)
            .collect())
    }
}
