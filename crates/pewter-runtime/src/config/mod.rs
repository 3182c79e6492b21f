//! Configuration module for the Pewter runtime.
//!
//! This module provides layered configuration loading and validation for
//! logging, command handling, the scheduler, access rules, per-plugin settings
//! and the startup plugin set.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    AccessConfig, AclRule, BotConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    PewterConfig, SchedulerConfig, SpanEventConfig, StartupConfig,
};
pub use validation::validate_config;
