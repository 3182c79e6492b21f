//! Contracts consumed from external collaborators.
//!
//! The runtime core owns none of these concerns; it only calls through the
//! traits below:
//!
//! | Trait            | Contract                                   |
//! |------------------|--------------------------------------------|
//! | [`Backend`]      | `send(target, text)`                       |
//! | [`AccessFilter`] | `allow(command, sender, room) -> bool`     |
//! | [`Renderer`]     | `render(template, context) -> text`        |
//!
//! Each trait comes with a minimal implementation so the runtime is usable
//! (and testable) before real collaborators are wired in.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

use crate::error::{BackendError, BackendResult, RenderError, RenderResult};
use crate::message::{Reply, Target};

// =============================================================================
// Backend
// =============================================================================

/// A chat-network adapter able to deliver outbound text.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Delivers `text` to `target`.
    async fn send(&self, target: &Target, text: &str) -> BackendResult<()>;
}

/// Type alias for a shared backend.
pub type BoxedBackend = Arc<dyn Backend>;

/// A cloneable handle plugins use to send messages outside a reply.
///
/// Scheduled tasks have no inbound message to answer, so they post through an
/// `Outbox` instead of returning replies. An outbox without a backend reports
/// [`BackendError::Unavailable`].
#[derive(Clone, Default)]
pub struct Outbox {
    backend: Option<BoxedBackend>,
}

impl Outbox {
    pub fn new(backend: BoxedBackend) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// An outbox that is not connected to anything.
    pub fn detached() -> Self {
        Self { backend: None }
    }

    /// Returns `true` if a backend is attached.
    pub fn is_attached(&self) -> bool {
        self.backend.is_some()
    }

    /// Sends `text` to `target`.
    pub async fn send(&self, target: &Target, text: &str) -> BackendResult<()> {
        match &self.backend {
            Some(backend) => backend.send(target, text).await,
            None => Err(BackendError::Unavailable),
        }
    }

    /// Delivers every reply in order, logging (not returning) failures.
    pub async fn deliver(&self, replies: Vec<Reply>) {
        for reply in replies {
            if let Err(e) = self.send(&reply.target, &reply.text).await {
                warn!(to = %reply.target, error = %e, "Failed to deliver reply");
            }
        }
    }
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// A backend that records everything it is asked to send.
///
/// Handy for tests and for embedding the runtime behind a custom loop.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    sent: Mutex<Vec<Reply>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything sent so far.
    pub fn sent(&self) -> Vec<Reply> {
        self.sent.lock().clone()
    }

    /// Removes and returns everything sent so far.
    pub fn take(&self) -> Vec<Reply> {
        std::mem::take(&mut *self.sent.lock())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn send(&self, target: &Target, text: &str) -> BackendResult<()> {
        self.sent.lock().push(Reply::new(target.clone(), text));
        Ok(())
    }
}

// =============================================================================
// Access Filter
// =============================================================================

/// Decides whether `sender` may run `command` in `room`.
///
/// Consulted by the router before every dispatch. A denial is not an error.
pub trait AccessFilter: Send + Sync {
    fn allow(&self, command: &str, sender: &str, room: Option<&str>) -> bool;
}

/// An access filter that allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessFilter for AllowAll {
    fn allow(&self, _command: &str, _sender: &str, _room: Option<&str>) -> bool {
        true
    }
}

impl<F> AccessFilter for F
where
    F: Fn(&str, &str, Option<&str>) -> bool + Send + Sync,
{
    fn allow(&self, command: &str, sender: &str, room: Option<&str>) -> bool {
        self(command, sender, room)
    }
}

// =============================================================================
// Renderer
// =============================================================================

/// Template names the runtime renders on its own behalf.
pub mod templates {
    /// Context: `command`, `hint`, `error`.
    pub const USAGE: &str = "usage";
    /// Context: `command`.
    pub const ACCESS_DENIED: &str = "access_denied";
    /// Context: `command`, `plugin`.
    pub const HANDLER_ERROR: &str = "handler_error";
    /// Context: `command`.
    pub const UNKNOWN_COMMAND: &str = "unknown_command";
}

/// The template / i18n text layer.
pub trait Renderer: Send + Sync {
    fn render(&self, template: &str, context: &Value) -> RenderResult<String>;
}

/// Plain English texts for the runtime's own templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinRenderer;

impl BuiltinRenderer {
    fn field<'a>(template: &str, context: &'a Value, field: &'static str) -> RenderResult<&'a str> {
        context
            .get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| RenderError::MissingField {
                template: template.to_string(),
                field,
            })
    }
}

impl Renderer for BuiltinRenderer {
    fn render(&self, template: &str, context: &Value) -> RenderResult<String> {
        match template {
            templates::USAGE => {
                let command = Self::field(template, context, "command")?;
                let error = Self::field(template, context, "error")?;
                Ok(match context.get("hint").and_then(Value::as_str) {
                    Some(hint) => format!("{error}\nUsage: {command} {hint}"),
                    None => format!("{error}\nUsage: {command}"),
                })
            }
            templates::ACCESS_DENIED => {
                let command = Self::field(template, context, "command")?;
                Ok(format!("You're not allowed to access the command '{command}'."))
            }
            templates::HANDLER_ERROR => {
                let command = Self::field(template, context, "command")?;
                Ok(format!(
                    "Sorry, something went wrong while running '{command}'."
                ))
            }
            templates::UNKNOWN_COMMAND => {
                let command = Self::field(template, context, "command")?;
                Ok(format!("Command \"{command}\" not found."))
            }
            other => Err(RenderError::UnknownTemplate(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_detached_outbox() {
        let outbox = Outbox::detached();
        let err = outbox
            .send(&Target::User("bob".into()), "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Unavailable));
    }

    #[tokio::test]
    async fn test_outbox_delivers_in_order() {
        let backend = Arc::new(MemoryBackend::new());
        let outbox = Outbox::new(backend.clone());
        outbox
            .deliver(vec![
                Reply::new(Target::Room("a".into()), "one"),
                Reply::new(Target::Room("a".into()), "two"),
            ])
            .await;
        let texts: Vec<_> = backend.take().into_iter().map(|r| r.text).collect();
        assert_eq!(texts, vec!["one", "two"]);
        assert!(backend.sent().is_empty());
    }

    #[test]
    fn test_closure_access_filter() {
        let filter = |command: &str, sender: &str, _room: Option<&str>| {
            command != "shutdown" || sender == "admin"
        };
        assert!(filter.allow("echo", "bob", None));
        assert!(!filter.allow("shutdown", "bob", None));
        assert!(filter.allow("shutdown", "admin", Some("ops")));
    }

    #[test]
    fn test_builtin_usage_with_hint() {
        let text = BuiltinRenderer
            .render(
                templates::USAGE,
                &json!({ "command": "echo_to_me", "hint": "<target> <text>", "error": "missing target" }),
            )
            .unwrap();
        assert_eq!(text, "missing target\nUsage: echo_to_me <target> <text>");
    }

    #[test]
    fn test_builtin_missing_field() {
        let err = BuiltinRenderer
            .render(templates::ACCESS_DENIED, &json!({}))
            .unwrap_err();
        assert!(matches!(err, RenderError::MissingField { field: "command", .. }));
    }

    #[test]
    fn test_builtin_unknown_template() {
        let err = BuiltinRenderer.render("nope", &json!({})).unwrap_err();
        assert!(matches!(err, RenderError::UnknownTemplate(name) if name == "nope"));
    }
}
