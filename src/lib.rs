//! # Collective Tuner
//!
//! Active-learning autotuner for MPI collective algorithm selection.
//!
//! For each collective the tuner enumerates a space of (node count,
//! processes per node, message size) configurations, measures a small,
//! deliberately chosen subset of them on the live machine, and trains a
//! bagged regression ensemble on the results. Jackknife variance across the
//! ensemble members decides which configuration to measure next; once the
//! estimate stops moving, the model's fastest-algorithm predictions are
//! mined into a nested decision-rule document the MPI runtime reads.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use collective_tuner::{
//!     AlgorithmTable, BatchScheduler, CommandRunner, ConfigBuilder, RandomForestRegressor,
//!     RuleDocument, TopologyKind, TuningTarget,
//! };
//!
//! # fn main() -> collective_tuner::Result<()> {
//! collective_tuner::init();
//!
//! let config = ConfigBuilder::new()
//!     .topology(TopologyKind::DragonflyRack)
//!     .runner("./collect_point.sh")
//!     .build()?;
//!
//! let target = TuningTarget::new("bcast", 16, 64, 1 << 20);
//! let algorithms = AlgorithmTable::from_csv(&config.algorithms_csv, &target.collective)?;
//! let runner = CommandRunner::from_config(&config);
//! let mut scheduler = BatchScheduler::from_config(runner, &config, target.num_processes(&config))?;
//!
//! let forest = config.forest.clone();
//! let outcome = collective_tuner::train_model(
//!     &config,
//!     &target,
//!     &algorithms,
//!     &mut scheduler,
//!     || RandomForestRegressor::new(forest.clone()),
//!     None,
//! )?;
//!
//! let tree = collective_tuner::mine_rules(&outcome.model, &outcome.feature_space, &algorithms)?;
//! let mut document = RuleDocument::load(&config.rule_document)?;
//! document.update_collective(&target.collective, tree.to_json())?;
//! document.save("tuned.json")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: encoded feature types, constants, errors and collaborator traits
//! - [`config`]: run configuration with file and environment loading
//! - [`feature_space`] and [`normalization`]: what is tuned and how latencies are scaled
//! - [`topology`]: the cluster shapes jobs are packed onto
//! - [`scheduler`] and [`runner`]: batch dispatch of benchmark jobs
//! - [`jackknife`], [`forest`] and [`learner`]: the active-learning loop
//! - [`rules`]: rule mining and the persisted rule document

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(rust_2018_idioms, non_snake_case, non_upper_case_globals)]

pub mod algorithms;
pub mod config;
pub mod core;
pub mod feature_space;
pub mod forest;
pub mod jackknife;
pub mod learner;
pub mod normalization;
pub mod rules;
pub mod runner;
pub mod scheduler;
pub mod topology;

pub use crate::core::{
    constants::*,
    error::{JobContext, Result, TunerError},
    traits::*,
    types::*,
};

pub use algorithms::AlgorithmTable;
pub use config::{load_config, ConfigBuilder, ConfigSource, ForestConfig, TopologyKind, TunerConfig};
pub use feature_space::FeatureSpace;
pub use forest::RandomForestRegressor;
pub use jackknife::{convergence_criteria, jackknife, ConvergenceHistory};
pub use learner::{train_model, tune_collectives, TrainingOutcome, TrainingSet, TuningTarget};
pub use rules::document::RuleDocument;
pub use rules::miner::mine_rules;
pub use rules::{RuleNode, RuleTree};
pub use runner::CommandRunner;
pub use scheduler::{BatchReport, BatchScheduler};
pub use topology::ClusterTopology;

/// Library version.
pub use crate::core::constants::COLLECTIVE_TUNER_VERSION as VERSION;

/// Initialize logging for the tuner.
///
/// Installs `env_logger` with `RUST_LOG=info` unless the variable is already
/// set. Safe to call more than once.
pub fn init() {
    crate::core::initialize_logging();
}
