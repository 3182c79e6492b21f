//! Pewter Runtime - orchestration layer for the Pewter plugin runtime.
//!
//! This crate provides:
//! - Runtime orchestration (`PewterRuntime`, `RuntimeBuilder`)
//! - Layered configuration (`config`)
//! - Logging configuration (`logging`)
//! - A configuration-driven access filter (`AclFilter`)
//! - Persistence of the activated plugin set (`StateStore`)
//! - The built-in `help` and `plugins` plugins
//!
//! ```ignore
//! use pewter_runtime::PewterRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = PewterRuntime::builder()
//!         .plugin(echo_descriptor())
//!         .build()?;
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod acl;
pub mod builtin;
pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod state;

// Re-exports
pub use acl::AclFilter;
pub use config::{ConfigError, ConfigLoader, ConfigResult, PewterConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{PewterRuntime, RuntimeBuilder};
pub use state::{MemoryStateStore, StateError, StateStore};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros and levels.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
