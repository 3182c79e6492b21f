//! Error types for the collaborator contracts.
//!
//! Lifecycle and dispatch errors live in `pewter-framework`; this module only
//! covers failures reported by the external collaborators themselves.

use thiserror::Error;

// =============================================================================
// Backend Errors
// =============================================================================

/// Errors reported by a chat backend when delivering a message.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// No backend is attached to the runtime.
    #[error("no backend is attached")]
    Unavailable,

    /// The target room or user is unknown to the backend.
    #[error("unknown target: {0}")]
    UnknownTarget(String),

    /// The backend accepted the request but delivery failed.
    #[error("failed to send message: {0}")]
    SendFailed(String),
}

// =============================================================================
// Render Errors
// =============================================================================

/// Errors reported by the template layer.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// No template is registered under the given name.
    #[error("template '{0}' not found")]
    UnknownTemplate(String),

    /// The template exists but the context lacks a value it needs.
    #[error("template '{template}' requires '{field}'")]
    MissingField {
        template: String,
        field: &'static str,
    },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type for template rendering.
pub type RenderResult<T> = Result<T, RenderError>;
