//! Active-learning training loop.
//!
//! A run starts with a bootstrap batch (evenly spaced rows, every algorithm
//! variant), then repeatedly measures the row the ensemble is least sure
//! about until the jackknife history settles or the wall-clock budget runs
//! out. The regressor is refitted from scratch on every iteration.

use crate::algorithms::AlgorithmTable;
use crate::config::TunerConfig;
use crate::core::error::{Result, TunerError};
use crate::core::traits::{BenchmarkRunner, EnsembleRegressor};
use crate::core::types::{AlgorithmId, FeatureRow, Point, NUM_MODEL_FEATURES};
use crate::feature_space::{expand_algorithms, points_matrix, FeatureSpace};
use crate::jackknife::{jackknife, select_single, ConvergenceHistory};
use crate::normalization::{normalize_output, undo_normalize_output};
use crate::rules::document::{wrap_for_collective, RuleDocument};
use crate::rules::miner::mine_rules;
use crate::scheduler::BatchScheduler;
use ndarray::{Array1, Array2};
use std::path::Path;
use std::time::Instant;

/// A collective and the raw maxima of the configurations to tune it for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuningTarget {
    pub collective: String,
    /// Largest node count (power of two)
    pub n: u64,
    /// Largest processes per node (power of two)
    pub ppn: u64,
    /// Largest message size in bytes (power of two)
    pub msg_size: u64,
}

impl TuningTarget {
    pub fn new<S: Into<String>>(collective: S, n: u64, ppn: u64, msg_size: u64) -> Self {
        TuningTarget {
            collective: collective.into(),
            n,
            ppn,
            msg_size,
        }
    }

    /// Processes the topology must be discovered for: every node at full ppn.
    pub fn num_processes(&self, config: &TunerConfig) -> u64 {
        self.n * u64::from(config.max_ppn)
    }
}

/// Measured points with their normalized and raw latencies.
///
/// Points are stored in groups of `num_algorithms`, one group per feature
/// row, algorithms in id order. Normalization is applied per group.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    num_algorithms: usize,
    points: Vec<Point>,
    targets: Vec<f64>,
    raw: Vec<f64>,
}

impl TrainingSet {
    pub fn new(num_algorithms: usize) -> Self {
        TrainingSet {
            num_algorithms,
            points: Vec::new(),
            targets: Vec::new(),
            raw: Vec::new(),
        }
    }

    /// Append a measured batch. `points` must consist of whole algorithm
    /// groups and `raw` must hold one latency per point.
    pub fn push_batch(&mut self, points: &[Point], raw: &[f64]) -> Result<()> {
        if points.len() != raw.len() {
            return Err(TunerError::dimension_mismatch(
                format!("{} latencies", points.len()),
                raw.len().to_string(),
            ));
        }
        if self.num_algorithms == 0 || points.len() % self.num_algorithms != 0 {
            return Err(TunerError::dimension_mismatch(
                format!("groups of {} algorithms", self.num_algorithms),
                format!("{} points", points.len()),
            ));
        }
        for group in points.chunks(self.num_algorithms) {
            let row = group[0].row;
            let well_formed = group
                .iter()
                .enumerate()
                .all(|(algorithm, p)| p.row == row && p.algorithm == algorithm);
            if !well_formed {
                return Err(TunerError::invalid_parameter(
                    "points",
                    row.to_string(),
                    "each group must list every algorithm of one row in order",
                ));
            }
        }

        let (normalized, raw) = normalize_output(raw, self.num_algorithms)?;
        self.points.extend_from_slice(points);
        self.targets.extend(normalized);
        self.raw.extend(raw);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn num_algorithms(&self) -> usize {
        self.num_algorithms
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    pub fn raw(&self) -> &[f64] {
        &self.raw
    }

    /// True when some group of this set measured `row`.
    pub fn contains_row(&self, row: &FeatureRow) -> bool {
        self.points.iter().any(|p| p.row == *row)
    }

    /// Model input matrix of the measured points.
    pub fn features(&self) -> Array2<f64> {
        points_matrix(&self.points)
    }

    /// Normalized targets as an array.
    pub fn target_array(&self) -> Array1<f64> {
        Array1::from(self.targets.clone())
    }

    /// Map normalized model outputs at `query` back to latencies.
    pub fn undo_normalize(&self, query: &[Point], normalized: &[f64]) -> Result<Vec<f64>> {
        undo_normalize_output(&self.points, &self.raw, query, normalized)
    }

    /// Dump the set as headerless CSV rows `n,ppn,msg_size,algorithm,latency`
    /// (encoded features, raw latency).
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path.as_ref())?;
        for (point, latency) in self.points.iter().zip(&self.raw) {
            writer.serialize((
                point.row.n,
                point.row.ppn,
                point.row.msg_size,
                point.algorithm,
                *latency,
            ))?;
        }
        writer.flush()?;
        log::info!(
            "Wrote {} training points to {}",
            self.points.len(),
            path.as_ref().display()
        );
        Ok(())
    }

    /// Read a dump written by [`TrainingSet::write_csv`], renormalizing the
    /// raw latencies.
    pub fn read_csv<P: AsRef<Path>>(path: P, num_algorithms: usize) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_path(path.as_ref())?;

        let mut points = Vec::new();
        let mut raw = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            if record.len() != NUM_MODEL_FEATURES + 1 {
                return Err(TunerError::dimension_mismatch(
                    format!("{} columns", NUM_MODEL_FEATURES + 1),
                    format!("{} on line {}", record.len(), line + 1),
                ));
            }
            let mut values = [0.0; NUM_MODEL_FEATURES + 1];
            for (slot, field) in values.iter_mut().zip(record.iter()) {
                *slot = field.parse::<f64>().map_err(|e| {
                    TunerError::invalid_parameter(
                        format!("line {}", line + 1),
                        field.to_string(),
                        e.to_string(),
                    )
                })?;
            }

            let n = whole(values[0], line)?;
            let ppn = whole(values[1], line)?;
            let msg_size = whole(values[2], line)?;
            let algorithm = whole(values[3], line)? as AlgorithmId;
            points.push(FeatureRow::new(n, ppn, msg_size).with_algorithm(algorithm));
            raw.push(values[4]);
        }

        let mut set = TrainingSet::new(num_algorithms);
        set.push_batch(&points, &raw)?;
        Ok(set)
    }
}

fn whole(value: f64, line: usize) -> Result<u32> {
    if value.fract() != 0.0 || value < 0.0 || value > f64::from(u32::MAX) {
        return Err(TunerError::invalid_parameter(
            format!("line {}", line + 1),
            value.to_string(),
            "feature columns must be non-negative integers",
        ));
    }
    Ok(value as u32)
}

/// Everything a finished training run produced.
#[derive(Debug, Clone)]
pub struct TrainingOutcome<M> {
    pub feature_space: FeatureSpace,
    pub model: M,
    pub history: ConvergenceHistory,
    pub training_set: TrainingSet,
    pub converged: bool,
    /// The wall-clock budget ran out before convergence
    pub timed_out: bool,
    /// Model fits performed, the bootstrap included
    pub iterations: usize,
}

/// Train a regressor for `target` by active learning.
///
/// `new_model` builds a fresh, unfitted regressor for every refit. When
/// `precollected` is given it replaces the bootstrap measurement batch.
/// Running out of time is not an error: the current model is returned with
/// `timed_out` set.
pub fn train_model<R, M, F>(
    config: &TunerConfig,
    target: &TuningTarget,
    algorithms: &AlgorithmTable,
    scheduler: &mut BatchScheduler<R>,
    mut new_model: F,
    precollected: Option<TrainingSet>,
) -> Result<TrainingOutcome<M>>
where
    R: BenchmarkRunner,
    M: EnsembleRegressor,
    F: FnMut() -> M,
{
    config.validate()?;
    if algorithms.collective() != target.collective {
        return Err(TunerError::config(format!(
            "algorithm table is for '{}', not '{}'",
            algorithms.collective(),
            target.collective
        )));
    }

    let started = Instant::now();
    let timeout = config.timeout();
    let num_algorithms = algorithms.len();
    let feature_space =
        FeatureSpace::from_raw(target.n, target.ppn, target.msg_size, &target.collective)?;
    if feature_space.is_empty() {
        return Err(TunerError::training(format!(
            "feature space of {} is empty",
            target.collective
        )));
    }
    let test_points = feature_space.all_points(num_algorithms);
    let test_matrix = points_matrix(&test_points);

    log::info!(
        "Training {} over {} rows x {} algorithms",
        target.collective,
        feature_space.len(),
        num_algorithms
    );

    let mut training_set = match precollected {
        Some(set) => {
            if set.num_algorithms() != num_algorithms || set.is_empty() {
                return Err(TunerError::training(format!(
                    "precollected data has {} points in groups of {}, expected groups of {}",
                    set.len(),
                    set.num_algorithms(),
                    num_algorithms
                )));
            }
            log::info!("Seeding from {} precollected points", set.len());
            set
        }
        None => {
            let points: Vec<Point> = feature_space
                .initial_rows(config.num_initial_points)
                .into_iter()
                .flat_map(|row| expand_algorithms(row, num_algorithms))
                .collect();
            let report = scheduler.collect(&target.collective, algorithms, &points)?;
            let mut set = TrainingSet::new(num_algorithms);
            set.push_batch(&points, &report.latencies)?;
            set
        }
    };

    let mut model = new_model();
    model.fit(&training_set.features(), &training_set.target_array())?;
    let mut history = ConvergenceHistory::new();
    history.push(jackknife(&model, &test_matrix)?);
    let mut iterations = 1;
    log::info!("Bootstrap complete with {} training points", training_set.len());

    let mut converged = false;
    let mut timed_out = false;
    loop {
        if history.is_converged(config.convergence_threshold, config.min_history) {
            converged = true;
            log::info!(
                "{} converged after {} iterations ({} points measured)",
                target.collective,
                iterations,
                training_set.len()
            );
            break;
        }
        if started.elapsed() >= timeout {
            timed_out = true;
            log::warn!(
                "Timeout reached for {} after {} iterations, exiting with the current model",
                target.collective,
                iterations
            );
            break;
        }

        let selected = select_single(&model, &test_matrix)?;
        let row = test_points[selected].row;
        if training_set.contains_row(&row) {
            log::debug!("selected row {} has already been measured", row);
        }

        let points = expand_algorithms(row, num_algorithms);
        let report = scheduler.collect(&target.collective, algorithms, &points)?;
        training_set.push_batch(&points, &report.latencies)?;

        model = new_model();
        model.fit(&training_set.features(), &training_set.target_array())?;
        let estimate = jackknife(&model, &test_matrix)?;
        history.push(estimate);
        iterations += 1;
        log::info!(
            "Iteration {}: measured row {}, jackknife {:.6e}",
            iterations,
            row,
            estimate
        );
    }

    Ok(TrainingOutcome {
        feature_space,
        model,
        history,
        training_set,
        converged,
        timed_out,
        iterations,
    })
}

/// Tune several collectives in turn and merge each mined rule tree into
/// `document`. Algorithm tables come from `config.algorithms_csv` and shell
/// templates from `config.shell_dir`.
pub fn tune_collectives<R, M, F>(
    config: &TunerConfig,
    targets: &[TuningTarget],
    runner: &R,
    mut new_model: F,
    document: &mut RuleDocument,
) -> Result<Vec<TrainingOutcome<M>>>
where
    R: BenchmarkRunner + Clone,
    M: EnsembleRegressor,
    F: FnMut() -> M,
{
    let mut outcomes = Vec::with_capacity(targets.len());
    for target in targets {
        let algorithms = AlgorithmTable::from_csv(&config.algorithms_csv, &target.collective)?;
        let mut scheduler =
            BatchScheduler::from_config(runner.clone(), config, target.num_processes(config))?;
        let outcome = train_model(config, target, &algorithms, &mut scheduler, &mut new_model, None)?;

        let tree = mine_rules(&outcome.model, &outcome.feature_space, &algorithms)?;
        let wrapped = wrap_for_collective(config.shell_dir.as_deref(), &target.collective, tree.to_json())?;
        document.update_collective(&target.collective, wrapped)?;
        outcomes.push(outcome);
    }
    Ok(outcomes)
}
