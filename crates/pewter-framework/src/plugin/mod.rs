//! Plugin model.
//!
//! # Architecture
//!
//! A [`PluginDescriptor`] is the immutable description of a plugin: its name,
//! declared dependencies, optional configuration schema and a factory. The
//! registry calls the factory to build a live [`Plugin`] whenever the plugin is
//! loaded or reactivated, and discards the instance on deactivation.
//!
//! While activated, a plugin contributes:
//!
//! - **Commands**, returned from [`Plugin::commands`] and registered with the
//!   router in one step.
//! - **Timers**, scheduled from [`Plugin::on_activate`] through the
//!   [`PluginContext`] scheduler, cancelled automatically on deactivation.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use pewter::prelude::*;
//!
//! struct Ping;
//!
//! #[async_trait]
//! impl Plugin for Ping {
//!     fn commands(self: Arc<Self>) -> Vec<CommandSpec> {
//!         vec![CommandSpec::literal("ping", |_inv: Invocation| async { "pong" })]
//!     }
//! }
//!
//! let descriptor = PluginDescriptor::new("ping", |_config| Ok(Ping));
//! ```
//!
//! # Configuration
//!
//! Each plugin's settings live under `plugins.<name>` in the runtime
//! configuration and are checked against the descriptor's schema before the
//! factory runs:
//!
//! ```toml
//! [plugins.weather]
//! units = "imperial"
//! ```

// ─── Submodules ──────────────────────────────────────────────────────────────
pub mod config;
pub mod core;
pub mod descriptor;
pub mod source;

// ─── Re-exports from submodules ──────────────────────────────────────────────
pub use config::resolve_config;
pub use core::{Plugin, PluginContext};
pub use descriptor::{PluginDescriptor, PluginFactory};
pub use source::{LinkedSource, PLUGINS, PluginSource, StaticSource};
