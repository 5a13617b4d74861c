//! Configuration management for the collective tuner.
//!
//! The configuration is an explicit value built once at startup and passed by
//! reference into the training loop, the scheduler and the topology factory.

pub mod core;

pub use self::core::{ConfigBuilder, ForestConfig, TopologyKind, TunerConfig};

use crate::core::error::{Result, TunerError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default configuration file name looked up by [`load_config`].
pub const DEFAULT_CONFIG_FILE: &str = "tuner.toml";

/// Where a configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Default configuration values
    Default,
    /// Configuration from file
    File(PathBuf),
    /// Configuration from environment variables
    Environment,
}

/// Resolve the run configuration.
///
/// An explicit path wins; otherwise `tuner.toml` in the working directory is
/// used when present. Environment overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<(TunerConfig, ConfigSource)> {
    let candidate = path
        .map(Path::to_path_buf)
        .or_else(|| Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()));

    let (mut config, source) = match candidate {
        Some(file) => (TunerConfig::load_from_file(&file)?, ConfigSource::File(file)),
        None => (TunerConfig::default(), ConfigSource::Default),
    };

    let before = config.clone();
    config.apply_environment_overrides()?;
    let source = if config != before && source == ConfigSource::Default {
        ConfigSource::Environment
    } else {
        source
    };

    log::debug!("configuration loaded from {:?}", source);
    Ok((config, source))
}

/// Parse configuration from key-value pairs (unknown keys are ignored with a warning).
pub fn parse_config_from_map(map: &HashMap<String, String>) -> Result<TunerConfig> {
    let mut builder = ConfigBuilder::new();

    for (key, value) in map {
        builder = match key.as_str() {
            "topology" => builder.topology(value.parse()?),
            "max_ppn" => builder.max_ppn(
                value
                    .parse()
                    .map_err(|_| TunerError::config(format!("Invalid max_ppn: {}", value)))?,
            ),
            "num_initial_points" => builder.num_initial_points(value.parse().map_err(|_| {
                TunerError::config(format!("Invalid num_initial_points: {}", value))
            })?),
            "convergence_threshold" => builder.convergence_threshold(value.parse().map_err(
                |_| TunerError::config(format!("Invalid convergence_threshold: {}", value)),
            )?),
            "timeout" | "timeout_minutes" => builder.timeout_minutes(
                value
                    .parse()
                    .map_err(|_| TunerError::config(format!("Invalid timeout: {}", value)))?,
            ),
            "parallel" => builder.parallel(matches!(value.as_str(), "1" | "true" | "yes")),
            "runner" => builder.runner(value),
            "alt_runner" => builder.alt_runner(value),
            "algorithms_csv" => builder.algorithms_csv(value),
            "rule_document" => builder.rule_document(value),
            _ => {
                log::warn!("Unknown configuration parameter: {}", key);
                builder
            }
        };
    }

    builder.build()
}
