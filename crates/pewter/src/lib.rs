//! # Pewter
//!
//! A plugin lifecycle and command dispatch runtime for chat bots.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐    ┌─────────┐    ┌────────┐    ┌───────────────┐    ┌─────────┐
//! │ Backend  │───▶│ Matcher │───▶│ Access │───▶│ Handler       │───▶│ Backend │
//! │ (inbound)│    │         │    │ filter │    │ (worker pool) │    │ (reply) │
//! └──────────┘    └─────────┘    └────────┘    └───────────────┘    └─────────┘
//!                      ▲                               ▲
//!                      │ commands                      │ timers
//!                 ┌────┴─────────────┐          ┌──────┴────┐
//!                 │ Plugin registry  │─────────▶│ Scheduler │
//!                 └──────────────────┘          └───────────┘
//! ```
//!
//! - **Registry**: loads plugins, activates them with their dependencies and
//!   rolls back on failure
//! - **Router**: owns the live command table, resolves name collisions and
//!   dispatches matches behind an error-isolation boundary
//! - **Scheduler**: plugin-owned one-shot and repeating timers
//! - **Runtime**: configuration, logging, persistence and the built-in plugins
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pewter::prelude::*;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Plugin for Echo {
//!     fn commands(self: Arc<Self>) -> Vec<CommandSpec> {
//!         let grammar = clap::Command::new("echo").arg(clap::Arg::new("text").required(true));
//!         vec![CommandSpec::arg_parse("echo", grammar, |inv: Invocation| async move {
//!             inv.args.raw().to_string()
//!         })]
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = PewterRuntime::builder()
//!         .plugin(PluginDescriptor::new("echo", |_config| Ok(Echo)))
//!         .build()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: `pewter.toml` configuration files
//! - `yaml-config`: `pewter.yaml` configuration files
//! - `json-log`: JSON log output

pub use pewter_core as core;
pub use pewter_framework as framework;
pub use pewter_runtime as runtime;

/// Commonly used types for writing plugins and embedding the runtime.
///
/// ```rust,ignore
/// use pewter::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use pewter_runtime::{PewterRuntime, RuntimeBuilder};

    // Plugin system
    pub use async_trait::async_trait;
    pub use pewter_framework::{
        BoxError, LinkedSource, Plugin, PluginContext, PluginDescriptor, PluginSource,
        StaticSource,
    };

    // Commands and handlers
    pub use pewter_framework::{Arguments, CommandSpec, Invocation, IntoReplies};

    // Timers
    pub use pewter_framework::TaskToken;

    // Messages and collaborators
    pub use pewter_core::{AccessFilter, Backend, Message, Reply, Target};

    pub use std::sync::Arc;
}
