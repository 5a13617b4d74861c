//! Error handling and error types for the collective tuner.
//!
//! Every fallible operation in the crate returns [`Result`], whose error type
//! [`TunerError`] separates fatal configuration problems from failures of the
//! external collaborators (benchmark launches, runner output) so callers can
//! decide what to surface to an operator.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the tuner.
#[derive(Error, Debug)]
pub enum TunerError {
    /// Configuration and validation errors (unknown topology, missing template)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid input parameters
    #[error("Invalid parameter: {parameter} = {value}, {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },

    /// A topology source file could not be interpreted
    #[error("Topology parse error in {path:?} (line {line}): {reason}")]
    TopologyParse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// The benchmark process could not be launched or exited without usable output
    #[error("Benchmark launch failed for {collective}/{algorithm} (n={n}, ppn={ppn}, msg_size={msg_size}): {message}")]
    Launch {
        collective: String,
        algorithm: String,
        n: u64,
        ppn: u64,
        msg_size: u64,
        message: String,
    },

    /// The benchmark output did not contain the expected latency line
    #[error("Runner output error for {collective}/{algorithm} (n={n}, ppn={ppn}, msg_size={msg_size}): {message}")]
    RunnerOutput {
        collective: String,
        algorithm: String,
        n: u64,
        ppn: u64,
        msg_size: u64,
        message: String,
    },

    /// Batch scheduling failures
    #[error("Scheduling error: {message}")]
    Scheduling { message: String },

    /// Model fitting errors
    #[error("Training error: {message}")]
    Training { message: String },

    /// Prediction errors
    #[error("Prediction error: {message}")]
    Prediction { message: String },

    /// Dimension mismatch errors
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },

    /// Rule document and shell template errors
    #[error("Rule document error: {message}")]
    RuleDocument { message: String },

    /// Model serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {source}")]
    IO {
        #[from]
        source: io::Error,
    },

    /// CSV parsing errors
    #[error("CSV parsing error: {source}")]
    Csv {
        #[from]
        source: csv::Error,
    },

    /// JSON serialization errors
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

/// Type alias for Results using TunerError
pub type Result<T> = std::result::Result<T, TunerError>;

/// Parameters of a single benchmark invocation, attached to launch and
/// output errors for diagnosis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    /// Collective name
    pub collective: String,
    /// Algorithm name
    pub algorithm: String,
    /// Real node count
    pub n: u64,
    /// Real processes per node
    pub ppn: u64,
    /// Real message size in bytes
    pub msg_size: u64,
}

impl TunerError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        TunerError::Config {
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter<P, V, R>(parameter: P, value: V, reason: R) -> Self
    where
        P: Into<String>,
        V: Into<String>,
        R: Into<String>,
    {
        TunerError::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a topology parse error
    pub fn topology_parse<P, S>(path: P, line: usize, reason: S) -> Self
    where
        P: Into<PathBuf>,
        S: Into<String>,
    {
        TunerError::TopologyParse {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }

    /// Create a launch error for the given job
    pub fn launch<S: Into<String>>(job: &JobContext, message: S) -> Self {
        TunerError::Launch {
            collective: job.collective.clone(),
            algorithm: job.algorithm.clone(),
            n: job.n,
            ppn: job.ppn,
            msg_size: job.msg_size,
            message: message.into(),
        }
    }

    /// Create a runner output error for the given job
    pub fn runner_output<S: Into<String>>(job: &JobContext, message: S) -> Self {
        TunerError::RunnerOutput {
            collective: job.collective.clone(),
            algorithm: job.algorithm.clone(),
            n: job.n,
            ppn: job.ppn,
            msg_size: job.msg_size,
            message: message.into(),
        }
    }

    /// Create a scheduling error
    pub fn scheduling<S: Into<String>>(message: S) -> Self {
        TunerError::Scheduling {
            message: message.into(),
        }
    }

    /// Create a training error
    pub fn training<S: Into<String>>(message: S) -> Self {
        TunerError::Training {
            message: message.into(),
        }
    }

    /// Create a prediction error
    pub fn prediction<S: Into<String>>(message: S) -> Self {
        TunerError::Prediction {
            message: message.into(),
        }
    }

    /// Create a dimension mismatch error
    pub fn dimension_mismatch<E, A>(expected: E, actual: A) -> Self
    where
        E: Into<String>,
        A: Into<String>,
    {
        TunerError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a rule document error
    pub fn rule_document<S: Into<String>>(message: S) -> Self {
        TunerError::RuleDocument {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        TunerError::Serialization {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable.
    ///
    /// Nothing in the crate retries automatically; this only tells an operator
    /// whether re-running the same step could plausibly succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            TunerError::Config { .. } => false,
            TunerError::InvalidParameter { .. } => false,
            TunerError::TopologyParse { .. } => false,
            TunerError::Launch { .. } => true,
            TunerError::RunnerOutput { .. } => true,
            TunerError::Scheduling { .. } => false,
            TunerError::Training { .. } => true,
            TunerError::Prediction { .. } => true,
            TunerError::DimensionMismatch { .. } => false,
            TunerError::RuleDocument { .. } => false,
            TunerError::Serialization { .. } => false,
            TunerError::IO { .. } => false,
            TunerError::Csv { .. } => false,
            TunerError::Json { .. } => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TunerError::Config { .. } => "config",
            TunerError::InvalidParameter { .. } => "invalid_parameter",
            TunerError::TopologyParse { .. } => "topology_parse",
            TunerError::Launch { .. } => "launch",
            TunerError::RunnerOutput { .. } => "runner_output",
            TunerError::Scheduling { .. } => "scheduling",
            TunerError::Training { .. } => "training",
            TunerError::Prediction { .. } => "prediction",
            TunerError::DimensionMismatch { .. } => "dimension_mismatch",
            TunerError::RuleDocument { .. } => "rule_document",
            TunerError::Serialization { .. } => "serialization",
            TunerError::IO { .. } => "io",
            TunerError::Csv { .. } => "csv",
            TunerError::Json { .. } => "json",
        }
    }
}

/// Convenience macros for error creation
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::core::error::TunerError::config($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::core::error::TunerError::config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! scheduling_error {
    ($msg:expr) => {
        $crate::core::error::TunerError::scheduling($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::core::error::TunerError::scheduling(format!($fmt, $($arg)*))
    };
}
