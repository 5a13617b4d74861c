//! System constants and default configuration values for the collective tuner.

/// Library version string.
pub const COLLECTIVE_TUNER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default wall-clock budget for one training run, in minutes.
pub const DEFAULT_TIMEOUT_MINUTES: f64 = 30.0;

/// Default maximum spread between consecutive jackknife estimates that still
/// counts as stable.
pub const DEFAULT_CONVERGENCE_THRESHOLD: f64 = 1.5e-9;

/// Default number of feature-space rows measured in the bootstrap iteration.
pub const DEFAULT_NUM_INITIAL_POINTS: usize = 3;

/// Length of the sliding window inspected by the convergence test.
pub const CONVERGENCE_WINDOW: usize = 4;

/// Extra linspace samples drawn (then dropped from the top) when choosing
/// bootstrap rows, biasing the initial sample toward small configurations.
pub const INITIAL_OVERSAMPLE: usize = 2;

/// Placeholder key marking splice points in hand-authored shell templates.
pub const SHELL_PLACEHOLDER: &str = "replace me";

/// Pseudo-algorithm that appears in algorithm tables but is never tuned.
pub const IGNORED_ALGORITHM: &str = "smp";

/// Suffix marking collectives tuned as compositions rather than algorithms.
pub const COMPOSITION_SUFFIX: &str = "_ch4";

/// Racks per dragonfly group on dragonfly-rack machines.
pub const RACKS_PER_DRAGONFLY_GROUP: u32 = 4;

/// Environment variable holding the batch system's allocated-node file.
pub const BATCH_NODEFILE_ENV: &str = "PBS_NODEFILE";

/// Marker preceding node names in rack-pair node query output.
pub const RACK_PAIR_CNAME_MARKER: &str = "/proc/cray_xt/cname = ";

/// Default number of trees in the bagged regression ensemble.
pub const DEFAULT_NUM_ESTIMATORS: usize = 100;

/// Default minimum number of samples required to split a tree node.
pub const DEFAULT_MIN_SAMPLES_SPLIT: usize = 2;

/// Default random seed.
pub const DEFAULT_RANDOM_SEED: u64 = 42;

/// Name prefix of per-batch scratch directories.
pub const SCRATCH_DIR_PREFIX: &str = "nodefiles";
