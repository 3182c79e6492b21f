//! # Pewter Core
//!
//! The message model and collaborator contracts shared by every Pewter crate.
//!
//! - **Messages**: [`Message`] in, [`Reply`] out, addressed by [`Target`]
//! - **Collaborators**: [`Backend`] / [`Outbox`] for delivery, [`AccessFilter`]
//!   for per-command permissions, [`Renderer`] for user-visible texts
//!
//! Nothing in this crate knows about plugins; the lifecycle and dispatch
//! machinery lives in `pewter-framework`.

pub mod error;
pub mod integration;
pub mod message;

pub use error::{BackendError, BackendResult, RenderError, RenderResult};
pub use integration::{
    AccessFilter, AllowAll, Backend, BoxedBackend, BuiltinRenderer, MemoryBackend, Outbox,
    Renderer, templates,
};
pub use message::{Message, Reply, Target};
