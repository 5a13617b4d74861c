//! Core configuration structures for the collective tuner.
//!
//! A [`TunerConfig`] is built once at process start (from defaults, a file,
//! the environment, or the builder) and then passed by reference to every
//! component that needs it. Tests override fields directly.

use crate::core::constants::*;
use crate::core::error::{Result, TunerError};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Cluster topology variant used to pack concurrent benchmark jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    /// dragonfly group → rack → node, group derived from the rack number
    DragonflyRack,
    /// dragonfly group → chassis → node
    DragonflyChassis,
    /// paired racks tracked by node counts only
    RackPair,
    /// unbounded placement on the local machine
    Local,
    /// one job per fitting epoch
    Serial,
}

impl TopologyKind {
    /// Typical processes per node for a single benchmark on this kind of machine.
    pub fn default_max_ppn(&self) -> u32 {
        match self {
            TopologyKind::DragonflyRack => 64,
            TopologyKind::DragonflyChassis => 96,
            TopologyKind::RackPair => 64,
            TopologyKind::Local => 8,
            TopologyKind::Serial => 64,
        }
    }

    /// Whether fits on this topology produce named nodes for a nodefile.
    pub fn produces_nodefiles(&self) -> bool {
        matches!(self, TopologyKind::DragonflyRack | TopologyKind::DragonflyChassis)
    }
}

impl Default for TopologyKind {
    fn default() -> Self {
        TopologyKind::Local
    }
}

impl fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TopologyKind::DragonflyRack => "dragonfly_rack",
            TopologyKind::DragonflyChassis => "dragonfly_chassis",
            TopologyKind::RackPair => "rack_pair",
            TopologyKind::Local => "local",
            TopologyKind::Serial => "serial",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for TopologyKind {
    type Err = TunerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dragonfly_rack" | "polaris" => Ok(TopologyKind::DragonflyRack),
            "dragonfly_chassis" | "aurora_cpu" | "aurora_xpu" => Ok(TopologyKind::DragonflyChassis),
            "rack_pair" | "theta" => Ok(TopologyKind::RackPair),
            "local" => Ok(TopologyKind::Local),
            "serial" => Ok(TopologyKind::Serial),
            other => Err(crate::config_error!("Unrecognized topology '{}'", other)),
        }
    }
}

/// Settings of the bagged regression-tree ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of trees
    pub num_estimators: usize,
    /// Maximum tree depth (None for unlimited)
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
    /// Draw a bootstrap sample per tree
    pub bootstrap: bool,
    /// Random seed
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        ForestConfig {
            num_estimators: DEFAULT_NUM_ESTIMATORS,
            max_depth: None,
            min_samples_split: DEFAULT_MIN_SAMPLES_SPLIT,
            bootstrap: true,
            seed: DEFAULT_RANDOM_SEED,
        }
    }
}

/// Main configuration for a tuning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Topology variant of the allocation
    pub topology: TopologyKind,
    /// Maximum processes per node for a single benchmark
    pub max_ppn: u32,
    /// Rows measured in the bootstrap iteration
    pub num_initial_points: usize,
    /// Stability threshold of the convergence test
    pub convergence_threshold: f64,
    /// Wall-clock budget of one training run, in minutes
    pub timeout_minutes: f64,
    /// History entries required before convergence is tested (at least 4)
    pub min_history: usize,
    /// Pack jobs onto the topology and run them concurrently
    pub parallel: bool,
    /// Benchmark runner executable
    pub runner: PathBuf,
    /// Runner used for composition (`_ch4`) collectives
    pub alt_runner: Option<PathBuf>,
    /// CSV table of candidate algorithms per collective
    pub algorithms_csv: PathBuf,
    /// Generic rule document merged with the mined trees
    pub rule_document: PathBuf,
    /// Directory of per-collective shell templates
    pub shell_dir: Option<PathBuf>,
    /// Parent directory of per-batch scratch directories
    pub scratch_root: PathBuf,
    /// Executable that prints node names on rack-pair machines
    pub node_query: Option<PathBuf>,
    /// Regressor settings
    pub forest: ForestConfig,
}

impl Default for TunerConfig {
    fn default() -> Self {
        let topology = TopologyKind::default();
        TunerConfig {
            topology,
            max_ppn: topology.default_max_ppn(),
            num_initial_points: DEFAULT_NUM_INITIAL_POINTS,
            convergence_threshold: DEFAULT_CONVERGENCE_THRESHOLD,
            timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
            min_history: CONVERGENCE_WINDOW,
            parallel: true,
            runner: PathBuf::from("runner.sh"),
            alt_runner: None,
            algorithms_csv: PathBuf::from("all_algs.csv"),
            rule_document: PathBuf::from("generic.json"),
            shell_dir: None,
            scratch_root: std::env::temp_dir(),
            node_query: None,
            forest: ForestConfig::default(),
        }
    }
}

impl TunerConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Training budget as a `Duration`. Budgets too large to represent
    /// saturate to `Duration::MAX`.
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::try_from_secs_f64(self.timeout_minutes.max(0.0) * 60.0)
            .unwrap_or(std::time::Duration::MAX)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.max_ppn == 0 {
            return Err(TunerError::invalid_parameter(
                "max_ppn",
                self.max_ppn.to_string(),
                "must be at least 1",
            ));
        }

        if self.num_initial_points == 0 {
            return Err(TunerError::invalid_parameter(
                "num_initial_points",
                self.num_initial_points.to_string(),
                "must be at least 1",
            ));
        }

        if !(self.convergence_threshold >= 0.0) {
            return Err(TunerError::invalid_parameter(
                "convergence_threshold",
                self.convergence_threshold.to_string(),
                "must be non-negative",
            ));
        }

        if !(self.timeout_minutes >= 0.0) {
            return Err(TunerError::invalid_parameter(
                "timeout_minutes",
                self.timeout_minutes.to_string(),
                "must be non-negative",
            ));
        }

        if std::time::Duration::try_from_secs_f64(self.timeout_minutes * 60.0).is_err() {
            return Err(TunerError::invalid_parameter(
                "timeout_minutes",
                self.timeout_minutes.to_string(),
                "must be a finite duration",
            ));
        }

        if self.min_history < CONVERGENCE_WINDOW {
            return Err(TunerError::invalid_parameter(
                "min_history",
                self.min_history.to_string(),
                format!("must be at least {}", CONVERGENCE_WINDOW),
            ));
        }

        if self.forest.num_estimators < 2 {
            return Err(TunerError::invalid_parameter(
                "forest.num_estimators",
                self.forest.num_estimators.to_string(),
                "jackknife needs at least 2 ensemble members",
            ));
        }

        if self.forest.min_samples_split < 2 {
            return Err(TunerError::invalid_parameter(
                "forest.min_samples_split",
                self.forest.min_samples_split.to_string(),
                "must be at least 2",
            ));
        }

        Ok(())
    }

    /// Load configuration from a file (`.toml` or `.json`)
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| TunerError::config(format!("Failed to read config file: {}", e)))?;

        let config: TunerConfig = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| TunerError::config(format!("Failed to parse JSON config: {}", e)))?,
            Some("toml") => toml::from_str(&content)
                .map_err(|e| TunerError::config(format!("Failed to parse TOML config: {}", e)))?,
            _ => {
                return Err(TunerError::config(
                    "Unsupported config file format. Use .json or .toml",
                ))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file (`.toml` or `.json`)
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)
                .map_err(|e| TunerError::config(format!("Failed to serialize to JSON: {}", e)))?,
            Some("toml") => toml::to_string_pretty(self)
                .map_err(|e| TunerError::config(format!("Failed to serialize to TOML: {}", e)))?,
            _ => {
                return Err(TunerError::config(
                    "Unsupported config file format. Use .json or .toml",
                ))
            }
        };

        std::fs::write(path, content)
            .map_err(|e| TunerError::config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Load configuration from `TUNER_*` environment variables
    pub fn load_from_environment() -> Result<Self> {
        let mut config = TunerConfig::default();
        config.apply_environment_overrides()?;
        Ok(config)
    }

    /// Override fields from `TUNER_*` environment variables that are set
    pub fn apply_environment_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("TUNER_TOPOLOGY") {
            self.topology = val.parse()?;
            if std::env::var("TUNER_MAX_PPN").is_err() {
                self.max_ppn = self.topology.default_max_ppn();
            }
        }

        if let Ok(val) = std::env::var("TUNER_MAX_PPN") {
            self.max_ppn = val
                .parse()
                .map_err(|_| TunerError::config("Invalid TUNER_MAX_PPN"))?;
        }

        if let Ok(val) = std::env::var("TUNER_NUM_INITIAL_POINTS") {
            self.num_initial_points = val
                .parse()
                .map_err(|_| TunerError::config("Invalid TUNER_NUM_INITIAL_POINTS"))?;
        }

        if let Ok(val) = std::env::var("TUNER_CONVERGENCE_THRESHOLD") {
            self.convergence_threshold = val
                .parse()
                .map_err(|_| TunerError::config("Invalid TUNER_CONVERGENCE_THRESHOLD"))?;
        }

        if let Ok(val) = std::env::var("TUNER_TIMEOUT") {
            self.timeout_minutes = val
                .parse()
                .map_err(|_| TunerError::config("Invalid TUNER_TIMEOUT"))?;
        }

        if let Ok(val) = std::env::var("TUNER_RUNNER") {
            self.runner = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("TUNER_SCRATCH_ROOT") {
            self.scratch_root = PathBuf::from(val);
        }

        self.validate()
    }
}

/// Builder for [`TunerConfig`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: TunerConfig,
    max_ppn_set: bool,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the topology variant (also resets `max_ppn` to its default unless set explicitly)
    pub fn topology(mut self, topology: TopologyKind) -> Self {
        self.config.topology = topology;
        if !self.max_ppn_set {
            self.config.max_ppn = topology.default_max_ppn();
        }
        self
    }

    /// Set maximum processes per node
    pub fn max_ppn(mut self, max_ppn: u32) -> Self {
        self.config.max_ppn = max_ppn;
        self.max_ppn_set = true;
        self
    }

    /// Set the number of bootstrap rows
    pub fn num_initial_points(mut self, num: usize) -> Self {
        self.config.num_initial_points = num;
        self
    }

    /// Set the convergence threshold
    pub fn convergence_threshold(mut self, threshold: f64) -> Self {
        self.config.convergence_threshold = threshold;
        self
    }

    /// Set the timeout in minutes
    pub fn timeout_minutes(mut self, minutes: f64) -> Self {
        self.config.timeout_minutes = minutes;
        self
    }

    /// Set the minimum convergence history length
    pub fn min_history(mut self, min_history: usize) -> Self {
        self.config.min_history = min_history;
        self
    }

    /// Enable or disable topology-packed concurrent execution
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    /// Set the runner executable
    pub fn runner<P: Into<PathBuf>>(mut self, runner: P) -> Self {
        self.config.runner = runner.into();
        self
    }

    /// Set the runner for composition collectives
    pub fn alt_runner<P: Into<PathBuf>>(mut self, runner: P) -> Self {
        self.config.alt_runner = Some(runner.into());
        self
    }

    /// Set the algorithm table path
    pub fn algorithms_csv<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.algorithms_csv = path.into();
        self
    }

    /// Set the generic rule document path
    pub fn rule_document<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.rule_document = path.into();
        self
    }

    /// Set the shell template directory
    pub fn shell_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.shell_dir = Some(path.into());
        self
    }

    /// Set the scratch root directory
    pub fn scratch_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.scratch_root = path.into();
        self
    }

    /// Set the rack-pair node query executable
    pub fn node_query<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.node_query = Some(path.into());
        self
    }

    /// Set the regressor settings
    pub fn forest(mut self, forest: ForestConfig) -> Self {
        self.config.forest = forest;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<TunerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = TunerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_initial_points, 3);
        assert_eq!(config.convergence_threshold, 1.5e-9);
        assert_eq!(config.timeout_minutes, 30.0);
    }

    #[test]
    fn test_builder_sets_topology_ppn() {
        let config = ConfigBuilder::new()
            .topology(TopologyKind::DragonflyChassis)
            .build()
            .unwrap();
        assert_eq!(config.max_ppn, 96);

        let config = ConfigBuilder::new()
            .max_ppn(12)
            .topology(TopologyKind::DragonflyChassis)
            .build()
            .unwrap();
        assert_eq!(config.max_ppn, 12);
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        assert!(ConfigBuilder::new().timeout_minutes(-1.0).build().is_err());
        assert!(ConfigBuilder::new().min_history(3).build().is_err());
        assert!(ConfigBuilder::new().convergence_threshold(f64::NAN).build().is_err());
        assert!(ConfigBuilder::new().num_initial_points(0).build().is_err());
    }

    #[test]
    fn test_unbounded_timeout_is_rejected() {
        assert!(ConfigBuilder::new().timeout_minutes(f64::INFINITY).build().is_err());
        assert!(ConfigBuilder::new().timeout_minutes(1e300).build().is_err());

        let mut config = TunerConfig::default();
        config.timeout_minutes = f64::INFINITY;
        assert!(config.validate().is_err());
        assert_eq!(config.timeout(), std::time::Duration::MAX);

        config.timeout_minutes = 0.5;
        assert_eq!(config.timeout(), std::time::Duration::from_secs(30));
    }

    #[test]
    fn test_topology_kind_parsing() {
        assert_eq!("polaris".parse::<TopologyKind>().unwrap(), TopologyKind::DragonflyRack);
        assert_eq!("aurora_xpu".parse::<TopologyKind>().unwrap(), TopologyKind::DragonflyChassis);
        assert_eq!("rack_pair".parse::<TopologyKind>().unwrap(), TopologyKind::RackPair);
        assert_eq!("SERIAL".parse::<TopologyKind>().unwrap(), TopologyKind::Serial);
        let err = "frontier".parse::<TopologyKind>().unwrap_err();
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let config = ConfigBuilder::new()
            .topology(TopologyKind::Serial)
            .timeout_minutes(5.0)
            .build()
            .unwrap();

        for name in ["tuner.toml", "tuner.json"] {
            let path = dir.path().join(name);
            config.save_to_file(&path).unwrap();
            let loaded = TunerConfig::load_from_file(&path).unwrap();
            assert_eq!(loaded, config);
        }

        let bad = dir.path().join("tuner.ini");
        assert!(config.save_to_file(&bad).is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "topology = \"rack_pair\"\ntimeout_minutes = 2.5\n").unwrap();
        let loaded = TunerConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.topology, TopologyKind::RackPair);
        assert_eq!(loaded.timeout_minutes, 2.5);
        assert_eq!(loaded.num_initial_points, DEFAULT_NUM_INITIAL_POINTS);
    }
}
