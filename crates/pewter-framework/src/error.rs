//! Error types for the Pewter framework.
//!
//! Structural errors (dependencies, names, load failures) block only the
//! plugins involved; per-dispatch errors ([`HandlerError`]) never leave the
//! router or scheduler.

use std::time::Duration;

use thiserror::Error;

pub use tower::BoxError;

// =============================================================================
// Dependency Errors
// =============================================================================

/// Why a plugin's dependency subgraph cannot be activated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    /// Dependencies declared somewhere in the subgraph are not discoverable.
    #[error("plugin '{plugin}' has unsatisfied dependencies: {}", .missing.join(", "))]
    Unsatisfied {
        plugin: String,
        missing: Vec<String>,
    },

    /// The subgraph contains a cycle; `cycle` lists it in edge order.
    #[error("plugin '{plugin}' is part of a dependency cycle: {}", .cycle.join(" -> "))]
    Cyclic { plugin: String, cycle: Vec<String> },
}

impl DependencyError {
    /// The plugins named by this error (missing ones or cycle members).
    pub fn involved(&self) -> &[String] {
        match self {
            Self::Unsatisfied { missing, .. } => missing,
            Self::Cyclic { cycle, .. } => cycle,
        }
    }
}

// =============================================================================
// Lifecycle Errors
// =============================================================================

/// Errors returned by [`PluginRegistry::load`](crate::registry::PluginRegistry::load).
#[derive(Debug, Error)]
pub enum LoadError {
    /// A plugin with this name is currently activated.
    #[error("plugin name '{0}' is in use by an activated plugin")]
    NameInUse(String),

    /// The plugin's configuration does not fit its declared schema.
    #[error("invalid configuration for plugin '{plugin}': {reason}")]
    InvalidConfig { plugin: String, reason: String },

    /// The descriptor's factory failed.
    #[error("failed to construct plugin '{plugin}': {source}")]
    Construction {
        plugin: String,
        #[source]
        source: BoxError,
    },

    /// Two commands of the same plugin share a name.
    #[error("plugin '{plugin}' declares command '{command}' more than once")]
    DuplicateCommand { plugin: String, command: String },
}

/// Errors returned by [`PluginRegistry::activate`](crate::registry::PluginRegistry::activate).
#[derive(Debug, Error)]
pub enum ActivateError {
    /// No descriptor with this name has been loaded.
    #[error("plugin '{0}' is not loaded")]
    NotFound(String),

    #[error("plugin '{plugin}' has unsatisfied dependencies: {}", .missing.join(", "))]
    UnsatisfiedDependency {
        plugin: String,
        missing: Vec<String>,
    },

    #[error("plugin '{plugin}' is part of a dependency cycle: {}", .cycle.join(" -> "))]
    CyclicDependency { plugin: String, cycle: Vec<String> },

    /// A step failed for `plugin`; everything activated by the same call was
    /// rolled back.
    #[error("failed to activate plugin '{plugin}': {source}")]
    Activation {
        plugin: String,
        #[source]
        source: BoxError,
    },
}

impl From<DependencyError> for ActivateError {
    fn from(err: DependencyError) -> Self {
        match err {
            DependencyError::Unsatisfied { plugin, missing } => {
                Self::UnsatisfiedDependency { plugin, missing }
            }
            DependencyError::Cyclic { plugin, cycle } => Self::CyclicDependency { plugin, cycle },
        }
    }
}

/// A single plugin's teardown failure. Logged; never blocks the closure.
#[derive(Debug, Error)]
#[error("plugin '{plugin}' failed to deactivate cleanly: {source}")]
pub struct DeactivationError {
    pub plugin: String,
    #[source]
    pub source: BoxError,
}

/// Errors returned by [`PluginRegistry::deactivate`](crate::registry::PluginRegistry::deactivate).
#[derive(Debug, Error)]
pub enum DeactivateError {
    #[error("plugin '{0}' is not loaded")]
    NotFound(String),

    /// The whole closure was deactivated, but some teardown hooks failed.
    #[error("deactivated {} plugin(s), {} teardown failure(s)", .deactivated.len(), .failures.len())]
    Teardown {
        deactivated: Vec<String>,
        failures: Vec<DeactivationError>,
    },
}

/// Errors returned by [`PluginRegistry::remove`](crate::registry::PluginRegistry::remove).
#[derive(Debug, Clone, Error)]
pub enum RemoveError {
    #[error("plugin '{0}' is not loaded")]
    NotFound(String),

    #[error("plugin '{0}' is activated; deactivate it first")]
    Active(String),
}

// =============================================================================
// Router Errors
// =============================================================================

/// Why the router refused a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// Neither the bare nor the mangled name is free.
    #[error("command '{command}' of plugin '{plugin}' rejected: '{name}' is already taken")]
    NameTaken {
        plugin: String,
        command: String,
        name: String,
    },

    /// The plugin already registered a command with this name.
    #[error("plugin '{plugin}' already registered command '{command}'")]
    Duplicate { plugin: String, command: String },
}

// =============================================================================
// Handler Errors
// =============================================================================

/// A failure caught at the execution boundary.
///
/// Reported to the requesting surface as a generic message; never propagated.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler returned an error: {0}")]
    Failed(#[source] BoxError),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

// =============================================================================
// Scheduler Errors
// =============================================================================

/// Errors returned when scheduling a task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// The owning plugin is not activated, so it may not own tasks.
    #[error("plugin '{0}' cannot schedule tasks while it is not activated")]
    OwnerInactive(String),

    /// Repeating tasks need a non-zero interval.
    #[error("repeat interval must be greater than zero")]
    ZeroInterval,

    /// The fire time would lie beyond what the clock can represent.
    #[error("delay of {0:?} is too large to schedule")]
    DelayTooLarge(Duration),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

pub type LoadResult<T> = Result<T, LoadError>;
pub type ActivateResult<T> = Result<T, ActivateError>;
pub type DeactivateResult<T> = Result<T, DeactivateError>;
pub type ScheduleResult<T> = Result<T, ScheduleError>;
