//! Runtime error types.

use thiserror::Error;

use pewter_framework::{ActivateError, DeactivateError};

use crate::config::ConfigError;
use crate::state::StateError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A plugin could not be activated.
    #[error(transparent)]
    Activate(#[from] ActivateError),

    /// Deactivation finished with teardown failures.
    #[error(transparent)]
    Deactivate(#[from] DeactivateError),

    /// The activation state store failed.
    #[error(transparent)]
    State(#[from] StateError),

    /// Installing the signal handlers failed.
    #[error("Failed to listen for shutdown signals: {0}")]
    Signal(#[source] std::io::Error),

    /// `start` was called twice.
    #[error("Runtime is already running")]
    AlreadyRunning,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
