//! Topology-aware batch scheduler.
//!
//! Points are fitted onto the topology in order. Jobs that fit accumulate in
//! a ready list; the first point that does not fit triggers a *flush*: all
//! ready jobs run concurrently on a pool sized to the list, the join barrier
//! collects their latencies in submission order, the topology starts a new
//! epoch, and the unfit point is tried again. Results therefore always line
//! up index for index with the input points.
//!
//! A failing job aborts the whole batch. Unfit points are the only thing
//! that is ever retried.

use crate::algorithms::AlgorithmTable;
use crate::config::TunerConfig;
use crate::core::constants::SCRATCH_DIR_PREFIX;
use crate::core::error::{JobContext, Result};
use crate::core::traits::BenchmarkRunner;
use crate::core::types::Point;
use crate::topology::ClusterTopology;
use rand::Rng;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// One benchmark ready to be dispatched.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDescriptor {
    /// Position of the point in the batch
    pub index: usize,
    /// Real benchmark parameters
    pub context: JobContext,
    /// Point being measured
    pub point: Point,
    /// Nodefile pinning the job to its placement
    pub nodefile: Option<PathBuf>,
}

impl JobDescriptor {
    /// Describe the job measuring `point`.
    pub fn new(
        index: usize,
        collective: &str,
        algorithms: &AlgorithmTable,
        point: Point,
        nodefile: Option<PathBuf>,
    ) -> Result<Self> {
        let context = JobContext {
            collective: collective.to_string(),
            algorithm: algorithms.name(point.algorithm)?.to_string(),
            n: point.row.real_n(),
            ppn: point.row.real_ppn(),
            msg_size: point.row.real_msg_size(),
        };
        Ok(JobDescriptor {
            index,
            context,
            point,
            nodefile,
        })
    }
}

/// Result of one scheduled batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    /// Raw latencies in input order
    pub latencies: Vec<f64>,
    /// Number of concurrent dispatches performed
    pub flushes: usize,
    /// Set when fewer or more results than points were collected
    pub count_mismatch: bool,
}

/// Run-unique scratch directory, removed recursively on drop.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create `<root>/<prefix>_<timestamp>_<32 hex digits>`.
    pub fn create(root: &Path) -> Result<Self> {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let id: u128 = rand::thread_rng().gen();
        let path = root.join(format!("{}_{}_{:032x}", SCRATCH_DIR_PREFIX, timestamp, id));
        std::fs::create_dir_all(&path)?;
        log::debug!("created scratch directory {}", path.display());
        Ok(ScratchDir { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            log::warn!("failed to remove scratch directory {}: {}", self.path.display(), e);
        }
    }
}

/// Dispatches measurement batches through a benchmark runner.
pub struct BatchScheduler<R> {
    runner: R,
    topology: Option<ClusterTopology>,
    scratch_root: PathBuf,
}

impl<R: BenchmarkRunner> BatchScheduler<R> {
    /// Scheduler packing jobs onto `topology`. Without a topology every job
    /// runs sequentially with no nodefile.
    pub fn new(runner: R, topology: Option<ClusterTopology>, scratch_root: PathBuf) -> Self {
        BatchScheduler {
            runner,
            topology,
            scratch_root,
        }
    }

    /// Scheduler for a tuning run: the configured topology is discovered for
    /// `num_processes` when `parallel` is enabled.
    pub fn from_config(runner: R, config: &TunerConfig, num_processes: u64) -> Result<Self> {
        let topology = if config.parallel {
            Some(ClusterTopology::from_config(config, num_processes)?)
        } else {
            None
        };
        Ok(Self::new(runner, topology, config.scratch_root.clone()))
    }

    /// True when jobs are packed and run concurrently.
    pub fn is_parallel(&self) -> bool {
        self.topology.is_some()
    }

    /// The benchmark runner.
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Measure every point, returning raw latencies in input order.
    pub fn collect(
        &mut self,
        collective: &str,
        algorithms: &AlgorithmTable,
        points: &[Point],
    ) -> Result<BatchReport> {
        log::info!("Collecting {} points for {}", points.len(), collective);
        let (latencies, flushes) = match self.topology.as_mut() {
            None => (
                collect_sequential(&self.runner, collective, algorithms, points)?,
                0,
            ),
            Some(topology) => collect_packed(
                &self.runner,
                topology,
                &self.scratch_root,
                collective,
                algorithms,
                points,
            )?,
        };

        let count_mismatch = latencies.len() != points.len();
        if count_mismatch {
            log::error!(
                "collected {} results for {} points of {}",
                latencies.len(),
                points.len(),
                collective
            );
        }

        Ok(BatchReport {
            latencies,
            flushes,
            count_mismatch,
        })
    }
}

fn collect_sequential<R: BenchmarkRunner>(
    runner: &R,
    collective: &str,
    algorithms: &AlgorithmTable,
    points: &[Point],
) -> Result<Vec<f64>> {
    points
        .iter()
        .enumerate()
        .map(|(index, point)| {
            let job = JobDescriptor::new(index, collective, algorithms, *point, None)?;
            runner.run(&job.context, None)
        })
        .collect()
}

fn collect_packed<R: BenchmarkRunner>(
    runner: &R,
    topology: &mut ClusterTopology,
    scratch_root: &Path,
    collective: &str,
    algorithms: &AlgorithmTable,
    points: &[Point],
) -> Result<(Vec<f64>, usize)> {
    let scratch = ScratchDir::create(scratch_root)?;
    let mut results = Vec::with_capacity(points.len());
    let mut ready: Vec<JobDescriptor> = Vec::new();
    let mut flushes = 0;
    let mut index = 0;

    topology.reset();
    while index < points.len() {
        let point = points[index];
        let nodes = point.nodes_required();
        match topology.fit(nodes) {
            Some(placement) => {
                let path = scratch.path().join(format!("nodefile{}", index));
                let nodefile = topology.write_nodefile(&placement, &path)?;
                ready.push(JobDescriptor::new(index, collective, algorithms, point, nodefile)?);
                log::debug!("fit {} nodes for point {}", nodes, point);
                index += 1;
            }
            None if ready.is_empty() => {
                topology.reset();
                return Err(crate::scheduling_error!(
                    "point {} needs {} nodes and does not fit into an empty topology",
                    point,
                    nodes
                ));
            }
            None => {
                log::debug!("fit failed for point {}, flushing {} jobs", point, ready.len());
                results.extend(flush(runner, &ready)?);
                flushes += 1;
                topology.reset();
                ready.clear();
            }
        }
    }

    if !ready.is_empty() {
        results.extend(flush(runner, &ready)?);
        flushes += 1;
    }
    topology.reset();
    drop(scratch);

    Ok((results, flushes))
}

/// Run all ready jobs concurrently and return their latencies in submission order.
pub fn flush<R: BenchmarkRunner>(runner: &R, jobs: &[JobDescriptor]) -> Result<Vec<f64>> {
    if jobs.is_empty() {
        return Ok(Vec::new());
    }
    log::info!("Dispatching {} jobs concurrently", jobs.len());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.len())
        .build()
        .map_err(|e| crate::scheduling_error!("Failed to create thread pool: {}", e))?;

    pool.install(|| {
        jobs.par_iter()
            .map(|job| runner.run(&job.context, job.nodefile.as_deref()))
            .collect::<Result<Vec<f64>>>()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::TunerError;
    use crate::core::types::FeatureRow;
    use crate::topology::{DragonflyRackTopology, SerialTopology};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn table() -> AlgorithmTable {
        AlgorithmTable::new("bcast", vec!["a".into(), "b".into()]).unwrap()
    }

    fn latency_of(job: &JobContext) -> f64 {
        (job.n * 1000 + job.ppn * 100 + job.msg_size) as f64 + if job.algorithm == "b" { 0.5 } else { 0.0 }
    }

    #[test]
    fn test_sequential_mode_has_no_nodefiles() {
        let runner = |job: &JobContext, nodefile: Option<&Path>| -> Result<f64> {
            assert!(nodefile.is_none());
            Ok(latency_of(job))
        };
        let dir = tempfile::TempDir::new().unwrap();
        let mut scheduler = BatchScheduler::new(runner, None, dir.path().to_path_buf());
        assert!(!scheduler.is_parallel());

        let points = vec![
            FeatureRow::new(1, 2, 1).with_algorithm(0),
            FeatureRow::new(1, 2, 1).with_algorithm(1),
        ];
        let report = scheduler.collect("bcast", &table(), &points).unwrap();
        assert_eq!(report.latencies, vec![1201.0, 1201.5]);
        assert_eq!(report.flushes, 0);
        assert!(!report.count_mismatch);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_serial_topology_flushes_every_point() {
        let runner = |job: &JobContext, _: Option<&Path>| -> Result<f64> { Ok(latency_of(job)) };
        let dir = tempfile::TempDir::new().unwrap();
        let topology = ClusterTopology::Named(Box::new(SerialTopology::new()));
        let mut scheduler = BatchScheduler::new(runner, Some(topology), dir.path().to_path_buf());

        let points: Vec<Point> = (1..=3)
            .map(|m| FeatureRow::new(2, 1, m).with_algorithm(0))
            .collect();
        let report = scheduler.collect("bcast", &table(), &points).unwrap();
        assert_eq!(report.latencies, vec![2101.0, 2102.0, 2104.0]);
        assert_eq!(report.flushes, 3);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_nodefiles_written_for_named_nodes() {
        let seen = Mutex::new(Vec::new());
        let runner = |job: &JobContext, nodefile: Option<&Path>| -> Result<f64> {
            let path = nodefile.expect("nodefile expected");
            seen.lock().unwrap().push(std::fs::read_to_string(path).unwrap());
            Ok(latency_of(job))
        };
        let dir = tempfile::TempDir::new().unwrap();
        let topology = DragonflyRackTopology::from_nodes([
            "x3005c0s1b0n0",
            "x3005c0s2b0n0",
            "x3101c0s1b0n0",
        ])
        .unwrap();
        let mut scheduler = BatchScheduler::new(
            &runner,
            Some(ClusterTopology::Named(Box::new(topology))),
            dir.path().to_path_buf(),
        );

        let points = vec![
            FeatureRow::new(2, 1, 1).with_algorithm(0),
            FeatureRow::new(1, 2, 1).with_algorithm(1),
        ];
        let report = scheduler.collect("bcast", &table(), &points).unwrap();
        assert_eq!(report.latencies, vec![2101.0, 1201.5]);
        assert_eq!(report.flushes, 1);

        let mut files = seen.into_inner().unwrap();
        files.sort();
        assert_eq!(files, vec!["x3005c0s1b0n0\nx3005c0s2b0n0", "x3101c0s1b0n0"]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_job_failure_aborts_batch_and_cleans_up() {
        let calls = AtomicUsize::new(0);
        let runner = |job: &JobContext, _: Option<&Path>| -> Result<f64> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TunerError::launch(job, "exit status 1"))
        };
        let dir = tempfile::TempDir::new().unwrap();
        let topology = ClusterTopology::Named(Box::new(SerialTopology::new()));
        let mut scheduler = BatchScheduler::new(&runner, Some(topology), dir.path().to_path_buf());

        let points = vec![FeatureRow::new(1, 2, 1).with_algorithm(0); 3];
        let err = scheduler.collect("bcast", &table(), &points).unwrap_err();
        assert_eq!(err.category(), "launch");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unfittable_point_is_scheduling_error() {
        let runner = |job: &JobContext, _: Option<&Path>| -> Result<f64> { Ok(latency_of(job)) };
        let dir = tempfile::TempDir::new().unwrap();
        let topology = DragonflyRackTopology::from_nodes(["x3005c0s1b0n0"]).unwrap();
        let mut scheduler = BatchScheduler::new(
            runner,
            Some(ClusterTopology::Named(Box::new(topology))),
            dir.path().to_path_buf(),
        );

        let points = vec![FeatureRow::new(3, 1, 1).with_algorithm(0)];
        let err = scheduler.collect("bcast", &table(), &points).unwrap_err();
        assert_eq!(err.category(), "scheduling");
    }

    #[test]
    fn test_scratch_dir_name_format() {
        let root = tempfile::TempDir::new().unwrap();
        let scratch = ScratchDir::create(root.path()).unwrap();
        let name = scratch.path().file_name().unwrap().to_string_lossy().to_string();
        let parts: Vec<&str> = name.split('_').collect();
        assert_eq!(parts[0], SCRATCH_DIR_PREFIX);
        assert!(parts[1].split('-').all(|p| p.chars().all(|c| c.is_ascii_digit())));
        assert_eq!(parts[2].len(), 32);
        let path = scratch.path().to_path_buf();
        drop(scratch);
        assert!(!path.exists());
    }
}
