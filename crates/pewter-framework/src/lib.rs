//! # Pewter Framework
//!
//! Plugin lifecycle and command dispatch for chat bots.
//!
//! This layer provides:
//! - Plugin descriptors, instances and sources ([`plugin`])
//! - Dependency-ordered activation with rollback ([`PluginRegistry`])
//! - Command matching in four tiers: literal, argument-parsing, regex and
//!   catch-all ([`command`])
//! - Collision-aware command routing with access control ([`CommandRouter`])
//! - Plugin-scoped timers ([`Scheduler`])
//!
//! Handlers and timers run behind the same isolation boundary, so a failing
//! plugin never takes the router or the scheduler down with it.

pub mod command;
pub mod error;
pub mod executor;
pub mod graph;
pub mod handler;
pub mod plugin;
pub mod registry;
pub mod router;
pub mod scheduler;

#[doc(hidden)]
pub use linkme;

pub use command::{CommandKind, CommandMatcher, CommandSpec, MatchResult, MatcherConfig};
pub use error::{
    ActivateError, BoxError, DeactivateError, DependencyError, HandlerError, LoadError,
    RemoveError, RouterError, ScheduleError,
};
pub use executor::{Executor, isolate};
pub use graph::DependencyGraph;
pub use handler::{Arguments, Captures, Handler, IntoReplies, Invocation};
pub use plugin::{
    LinkedSource, PLUGINS, Plugin, PluginContext, PluginDescriptor, PluginSource, StaticSource,
};
pub use registry::{PluginRegistry, PluginSnapshot, PluginState};
pub use router::{CommandInfo, CommandRouter, DenialPolicy, Registration, RouterConfig};
pub use scheduler::{Clock, ManualClock, PluginScheduler, Scheduler, SystemClock, TaskToken};
