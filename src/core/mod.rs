//! Core infrastructure module for the collective tuner.
//!
//! - [`types`]: encoded feature rows and measurable points
//! - [`constants`]: defaults and machine constants
//! - [`error`]: the error taxonomy
//! - [`traits`]: collaborator seams (regressor, benchmark runner)

pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

pub use constants::*;
pub use error::{JobContext, Result, TunerError};
pub use traits::*;
pub use types::*;

use std::sync::Once;

static LOGGING_INIT: Once = Once::new();

/// Initialize the logging subsystem.
///
/// Defaults `RUST_LOG` to `info` when unset and installs `env_logger`;
/// calling it more than once is harmless.
pub fn initialize_logging() {
    LOGGING_INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_err() {
            std::env::set_var("RUST_LOG", "info");
        }
        let _ = env_logger::try_init();
        log::debug!("collective tuner {} logging initialized", COLLECTIVE_TUNER_VERSION);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_initialization_is_idempotent() {
        initialize_logging();
        initialize_logging();
        assert!(std::env::var("RUST_LOG").is_ok());
    }

    #[test]
    fn test_module_reexports() {
        let _error: TunerError = TunerError::config("test");
        let _row = FeatureRow::new(1, 2, 3);
        assert!(!COLLECTIVE_TUNER_VERSION.is_empty());
    }
}
