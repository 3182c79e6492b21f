use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tower::BoxError;

use pewter_core::Outbox;

use crate::command::CommandSpec;
use crate::scheduler::PluginScheduler;

// ─── PluginContext ────────────────────────────────────────────────────────────

/// Handed to [`Plugin::on_activate`].
///
/// Carries the plugin's validated configuration, a scheduler scoped to the
/// plugin and an outbox for messages that are not replies.
#[derive(Clone, Debug)]
pub struct PluginContext {
    name: String,
    config: Arc<Value>,
    scheduler: PluginScheduler,
    outbox: Outbox,
}

impl PluginContext {
    pub fn new(
        name: impl Into<String>,
        config: Arc<Value>,
        scheduler: PluginScheduler,
        outbox: Outbox,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            scheduler,
            outbox,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw configuration value, with schema defaults filled in.
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Deserialises the configuration into `T`.
    pub fn get_config<T>(&self) -> serde_json::Result<T>
    where
        T: DeserializeOwned,
    {
        T::deserialize(self.config.as_ref())
    }

    pub fn scheduler(&self) -> &PluginScheduler {
        &self.scheduler
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }
}

// ─── Plugin ───────────────────────────────────────────────────────────────────

/// A live plugin instance.
///
/// Instances are built by their descriptor's factory and owned by the
/// registry. Use interior mutability for state that changes between calls;
/// handlers capture what they need from `self: Arc<Self>`.
///
/// ```rust,ignore
/// struct Greeter { greeting: String }
///
/// #[async_trait]
/// impl Plugin for Greeter {
///     fn commands(self: Arc<Self>) -> Vec<CommandSpec> {
///         vec![CommandSpec::literal("hi", move |inv: Invocation| {
///             let me = Arc::clone(&self);
///             async move { format!("{}, {}", me.greeting, inv.message.sender) }
///         })]
///     }
/// }
/// ```
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Commands registered while the plugin is activated.
    fn commands(self: Arc<Self>) -> Vec<CommandSpec> {
        Vec::new()
    }

    /// Runs after the plugin's commands are registered. Timers go here.
    ///
    /// An error fails the activation and rolls it back.
    async fn on_activate(self: Arc<Self>, ctx: PluginContext) -> Result<(), BoxError> {
        let _ = ctx;
        Ok(())
    }

    /// Runs after commands are unregistered and timers cancelled.
    async fn on_deactivate(&self) -> Result<(), BoxError> {
        Ok(())
    }
}
