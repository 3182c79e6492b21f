//! Command router.
//!
//! The [`CommandRouter`] owns the live command table of every activated
//! plugin. It resolves name collisions when commands are registered, matches
//! incoming messages through the [`CommandMatcher`] and dispatches the result:
//!
//! 1. The access filter decides whether the sender may run the command.
//! 2. The handler runs behind the isolation boundary; failures and panics
//!    become a generic reply instead of escaping.
//! 3. Replies (and usage/denial texts rendered through the [`Renderer`]) are
//!    returned to the caller for delivery.
//!
//! # Collisions
//!
//! Commands are keyed internally as `plugin.command`. The preferred visible
//! name is the bare `command`; if another plugin already holds it, the newcomer
//! is installed as `plugin-command` and told so through
//! [`Registration::CollisionRenamed`]. Unregistering a plugin never hands its
//! bare names over to a renamed sibling.
//!
//! Prefixed commands (literal, arg-parse) and unprefixed ones (regex,
//! catch-all) collide only within their own kind group, so a catch-all named
//! `hi` never pushes a literal `hi` off its bare name.

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower::ServiceExt;
use tracing::{debug, info, warn};

use pewter_core::{AccessFilter, AllowAll, BuiltinRenderer, Message, Renderer, Reply, templates};

use crate::command::{
    CommandMatcher, CommandSpec, CommandTable, MatchResult, Matched, MatcherConfig,
    RegisteredCommand,
};
use crate::error::RouterError;
use crate::executor::isolate;
use crate::handler::Invocation;

// ============================================================================
// Configuration
// ============================================================================

/// What to do when the access filter denies a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DenialPolicy {
    /// Reply with the rendered `access_denied` template.
    #[default]
    Reply,
    /// Drop the message without a reply.
    Silent,
}

/// Router behaviour.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub matcher: MatcherConfig,
    pub denial: DenialPolicy,
    /// Reply with the `handler_error` template when a handler fails.
    pub reply_handler_errors: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            matcher: MatcherConfig::default(),
            denial: DenialPolicy::Reply,
            reply_handler_errors: true,
        }
    }
}

// ============================================================================
// Registration results
// ============================================================================

/// How a command ended up in the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// Installed under its own name.
    Accepted(String),
    /// The bare name belonged to another plugin; installed as `installed`.
    CollisionRenamed {
        requested: String,
        /// Internal key (`plugin.command`) of the command holding the name.
        clashed_with: String,
        installed: String,
    },
}

impl Registration {
    /// The visible name the command was installed under.
    pub fn visible_name(&self) -> &str {
        match self {
            Self::Accepted(name) => name,
            Self::CollisionRenamed { installed, .. } => installed,
        }
    }
}

/// A read-only view of one installed command, for help and listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandInfo {
    pub name: String,
    pub plugin: String,
    pub kind: String,
    pub hint: Option<String>,
    pub help: Option<String>,
    /// The requested name, when the command was renamed after a collision.
    pub renamed_from: Option<String>,
}

impl CommandInfo {
    fn of(command: &RegisteredCommand) -> Self {
        Self {
            name: command.visible.clone(),
            plugin: command.plugin().to_string(),
            kind: command.kind().to_string(),
            hint: command.spec.syntax_hint().map(str::to_string),
            help: command.spec.help_text().map(str::to_string),
            renamed_from: command
                .is_renamed()
                .then(|| command.spec.name().to_string()),
        }
    }
}

// ============================================================================
// CommandRouter
// ============================================================================

/// Aggregates the commands of activated plugins and dispatches messages.
pub struct CommandRouter {
    table: RwLock<CommandTable>,
    matcher: CommandMatcher,
    access: Arc<dyn AccessFilter>,
    renderer: Arc<dyn Renderer>,
    denial: DenialPolicy,
    reply_handler_errors: bool,
}

impl CommandRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            table: RwLock::new(CommandTable::new()),
            matcher: CommandMatcher::new(config.matcher),
            access: Arc::new(AllowAll),
            renderer: Arc::new(BuiltinRenderer),
            denial: config.denial,
            reply_handler_errors: config.reply_handler_errors,
        }
    }

    pub fn with_access_filter(mut self, access: Arc<dyn AccessFilter>) -> Self {
        self.access = access;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn matcher(&self) -> &CommandMatcher {
        &self.matcher
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Installs a single command owned by `spec.plugin()`.
    pub fn register(&self, spec: CommandSpec) -> Result<Registration, RouterError> {
        let mut table = self.table.write();
        install(&mut table, spec).map(|(registration, _)| registration)
    }

    /// Installs all commands of `plugin` in one write section.
    ///
    /// Either every command is installed or, on the first rejection, none is:
    /// matching never observes a partially registered plugin.
    pub fn register_all(
        &self,
        plugin: &str,
        specs: Vec<CommandSpec>,
    ) -> Result<Vec<Registration>, RouterError> {
        let mut table = self.table.write();
        let mut installed = Vec::with_capacity(specs.len());
        let mut commands = Vec::with_capacity(specs.len());

        for spec in specs {
            match install(&mut table, spec.owned_by(plugin)) {
                Ok((registration, command)) => {
                    installed.push(registration);
                    commands.push(command);
                }
                Err(e) => {
                    for command in &commands {
                        table.remove(command);
                    }
                    warn!(plugin = %plugin, error = %e, "Command registration rejected");
                    return Err(e);
                }
            }
        }

        debug!(plugin = %plugin, count = installed.len(), "Commands registered");
        Ok(installed)
    }

    /// Removes every command owned by `plugin`; returns how many were removed.
    pub fn unregister(&self, plugin: &str) -> usize {
        let removed = self.table.write().remove_plugin(plugin);
        if !removed.is_empty() {
            debug!(plugin = %plugin, count = removed.len(), "Commands unregistered");
        }
        removed.len()
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    /// All installed commands in registration order.
    pub fn commands(&self) -> Vec<CommandInfo> {
        self.table.read().iter().map(|c| CommandInfo::of(c)).collect()
    }

    /// Looks up one command by visible name.
    pub fn help(&self, name: &str) -> Option<CommandInfo> {
        self.table.read().get(name).map(|c| CommandInfo::of(c))
    }

    /// Visible names of the commands owned by `plugin`.
    pub fn commands_of(&self, plugin: &str) -> Vec<String> {
        self.table
            .read()
            .iter()
            .filter(|c| c.plugin() == plugin)
            .map(|c| c.visible.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    // ------------------------------------------------------------------------
    // Matching and dispatch
    // ------------------------------------------------------------------------

    /// Matches `message` against the current table.
    pub fn match_message(&self, message: &Message) -> MatchResult {
        let table = self.table.read();
        self.matcher.match_message(&table, message)
    }

    /// Runs whatever `result` selected and returns the replies to send.
    pub async fn dispatch(&self, result: MatchResult, message: Arc<Message>) -> Vec<Reply> {
        match result {
            MatchResult::Command(matched) => self.invoke(matched, &message, false).await,
            MatchResult::Usage {
                command,
                hint,
                error,
            } => {
                if !self.allowed(&command, &message) {
                    return self.deny(&command, &message, false);
                }
                let text = self.render(
                    templates::USAGE,
                    json!({ "command": command.visible, "hint": hint, "error": error }),
                    || match &hint {
                        Some(hint) => format!("{error}\nUsage: {} {hint}", command.visible),
                        None => error.clone(),
                    },
                );
                vec![message.reply(text)]
            }
            MatchResult::CatchAll(all) => {
                let calls = all
                    .into_iter()
                    .map(|matched| self.invoke(matched, &message, true));
                join_all(calls).await.into_iter().flatten().collect()
            }
            MatchResult::NoMatch => Vec::new(),
        }
    }

    /// Matches and dispatches in one step.
    pub async fn route(&self, message: Arc<Message>) -> Vec<Reply> {
        let result = self.match_message(&message);
        self.dispatch(result, message).await
    }

    /// Renders `template`, falling back to `fallback` if the renderer fails.
    pub fn render(&self, template: &str, context: Value, fallback: impl FnOnce() -> String) -> String {
        match self.renderer.render(template, &context) {
            Ok(text) => text,
            Err(e) => {
                warn!(template = %template, error = %e, "Failed to render template, using fallback text");
                fallback()
            }
        }
    }

    fn allowed(&self, command: &RegisteredCommand, message: &Message) -> bool {
        self.access
            .allow(&command.visible, &message.sender, message.room.as_deref())
    }

    fn deny(&self, command: &RegisteredCommand, message: &Message, silent: bool) -> Vec<Reply> {
        debug!(
            command = %command.visible,
            sender = %message.sender,
            "Access denied"
        );
        if silent || self.denial == DenialPolicy::Silent {
            return Vec::new();
        }
        let text = self.render(
            templates::ACCESS_DENIED,
            json!({ "command": command.visible }),
            || format!("Access to '{}' denied.", command.visible),
        );
        vec![message.reply(text)]
    }

    /// Calls one matched command. Catch-alls stay silent on denial and failure.
    async fn invoke(&self, matched: Matched, message: &Arc<Message>, catch_all: bool) -> Vec<Reply> {
        let Matched { command, args } = matched;
        if !self.allowed(&command, message) {
            return self.deny(&command, message, catch_all);
        }

        let invocation = Invocation {
            message: Arc::clone(message),
            command: command.visible.clone(),
            plugin: command.plugin().to_string(),
            args,
        };
        debug!(plugin = %invocation.plugin, command = %invocation.command, "Dispatching command");

        match isolate(command.spec.handler().oneshot(invocation)).await {
            Ok(replies) => replies,
            Err(e) => {
                warn!(
                    plugin = %command.plugin(),
                    command = %command.visible,
                    error = %e,
                    "Command handler failed"
                );
                if self.reply_handler_errors && !catch_all {
                    let text = self.render(
                        templates::HANDLER_ERROR,
                        json!({ "command": command.visible, "plugin": command.plugin() }),
                        || format!("Command '{}' failed.", command.visible),
                    );
                    vec![message.reply(text)]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

impl Default for CommandRouter {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

impl std::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRouter")
            .field("commands", &self.len())
            .field("matcher", &self.matcher)
            .field("denial", &self.denial)
            .finish_non_exhaustive()
    }
}

/// Installs `spec` under its bare name, or `plugin-name` after a clash with
/// a command of the same namespace.
fn install(
    table: &mut CommandTable,
    spec: CommandSpec,
) -> Result<(Registration, Arc<RegisteredCommand>), RouterError> {
    let plugin = spec.plugin().to_string();
    let name = spec.name().to_string();
    let kind = spec.kind();

    if table.contains_key(&plugin, &name) {
        return Err(RouterError::Duplicate {
            plugin,
            command: name,
        });
    }

    let Some(holder) = table.holder(kind, &name) else {
        let command = table.insert(RegisteredCommand {
            visible: name.clone(),
            spec,
        });
        return Ok((Registration::Accepted(name), command));
    };

    let clashed_with = holder.spec.key();
    let mangled = format!("{plugin}-{name}");
    if table.holder(kind, &mangled).is_some() {
        return Err(RouterError::NameTaken {
            plugin,
            command: name,
            name: mangled,
        });
    }

    info!(
        plugin = %plugin,
        command = %name,
        clashed_with = %clashed_with,
        visible = %mangled,
        "Command name taken, installed under plugin-qualified name"
    );
    let command = table.insert(RegisteredCommand {
        visible: mangled.clone(),
        spec,
    });
    Ok((
        Registration::CollisionRenamed {
            requested: name,
            clashed_with,
            installed: mangled,
        },
        command,
    ))
}
