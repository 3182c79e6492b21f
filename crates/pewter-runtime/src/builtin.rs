//! Plugins shipped with the runtime.
//!
//! - `help`: `help` lists the visible commands, `help <command>` describes one.
//! - `plugins`: `plugin list`, `plugin info <name>`, `plugin activate <name>`
//!   and `plugin deactivate <name>`, answering with the same results the
//!   runtime's administrative API returns.
//!
//! Both hold weak handles so the command table never keeps the runtime alive.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use clap::Arg;
use serde_json::json;

use pewter_core::templates;
use pewter_framework::{
    BoxError, CommandRouter, CommandSpec, DeactivateError, Invocation, Plugin, PluginDescriptor,
    PluginSnapshot, PluginState,
};

use crate::runtime::PewterRuntime;

pub const HELP_PLUGIN: &str = "help";
pub const PLUGINS_PLUGIN: &str = "plugins";

fn required_name(command: &'static str) -> clap::Command {
    clap::Command::new(command).arg(Arg::new("name").required(true).help("Plugin name"))
}

fn argument<'a>(inv: &'a Invocation, id: &str) -> Option<&'a str> {
    inv.args
        .matches()
        .and_then(|m| m.get_one::<String>(id))
        .map(String::as_str)
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

// ─── help ────────────────────────────────────────────────────────────────────

pub fn help_descriptor(router: Weak<CommandRouter>) -> PluginDescriptor {
    PluginDescriptor::new(HELP_PLUGIN, move |_config| {
        Ok(Help {
            router: router.clone(),
        })
    })
    .description("Lists commands and shows their usage")
}

struct Help {
    router: Weak<CommandRouter>,
}

impl Help {
    fn answer(&self, inv: &Invocation) -> Result<String, BoxError> {
        let router = self.router.upgrade().ok_or("command router is gone")?;
        let prefix = &router.matcher().config().prefix;

        let Some(name) = argument(inv, "command") else {
            let mut commands = router.commands();
            commands.sort_by(|a, b| a.name.cmp(&b.name));
            let mut lines = vec!["Available commands:".to_string()];
            for info in commands {
                let usage = format!("{prefix}{} {}", info.name, info.hint.unwrap_or_default());
                match info.help {
                    Some(help) => lines.push(format!("  {}  {help}", usage.trim_end())),
                    None => lines.push(format!("  {}", usage.trim_end())),
                }
            }
            return Ok(lines.join("\n"));
        };

        let Some(info) = router.help(name) else {
            return Ok(router.render(
                templates::UNKNOWN_COMMAND,
                json!({ "command": name }),
                || format!("Command \"{name}\" not found."),
            ));
        };

        let usage = format!("{prefix}{} {}", info.name, info.hint.unwrap_or_default());
        let mut lines = vec![format!("Usage: {}", usage.trim_end())];
        if let Some(help) = info.help {
            lines.push(help);
        }
        match info.renamed_from {
            Some(original) => lines.push(format!(
                "Provided by plugin '{}' (renamed from '{original}').",
                info.plugin
            )),
            None => lines.push(format!("Provided by plugin '{}'.", info.plugin)),
        }
        Ok(lines.join("\n"))
    }
}

#[async_trait]
impl Plugin for Help {
    fn commands(self: Arc<Self>) -> Vec<CommandSpec> {
        let grammar = clap::Command::new("help").arg(Arg::new("command").help("Command to describe"));
        vec![
            CommandSpec::arg_parse("help", grammar, move |inv: Invocation| {
                let this = Arc::clone(&self);
                async move { this.answer(&inv) }
            })
            .help("List commands, or describe one"),
        ]
    }
}

// ─── plugins ─────────────────────────────────────────────────────────────────

pub(crate) fn plugins_descriptor(runtime: Weak<PewterRuntime>) -> PluginDescriptor {
    PluginDescriptor::new(PLUGINS_PLUGIN, move |_config| {
        Ok(Plugins {
            runtime: runtime.clone(),
        })
    })
    .description("Inspects, activates and deactivates plugins")
}

struct Plugins {
    runtime: Weak<PewterRuntime>,
}

impl Plugins {
    fn runtime(&self) -> Result<Arc<PewterRuntime>, BoxError> {
        self.runtime.upgrade().ok_or_else(|| "runtime is gone".into())
    }

    fn list(&self) -> Result<String, BoxError> {
        let plugins = self.runtime()?.plugins();
        if plugins.is_empty() {
            return Ok("No plugins loaded.".to_string());
        }
        let lines: Vec<String> = plugins
            .iter()
            .map(|p| match (&p.state, &p.last_error) {
                (PluginState::Failed, Some(error)) => format!("{} [{}] {error}", p.name, p.state),
                _ => format!("{} [{}]", p.name, p.state),
            })
            .collect();
        Ok(lines.join("\n"))
    }

    fn info(&self, name: &str) -> Result<String, BoxError> {
        let Some(snapshot) = self.runtime()?.plugin(name) else {
            return Ok(format!("Plugin '{name}' is not loaded."));
        };
        Ok(describe(&snapshot))
    }

    async fn activate(&self, name: &str) -> Result<String, BoxError> {
        Ok(match self.runtime()?.activate(name).await {
            Ok(activated) if activated.is_empty() => format!("Plugin '{name}' is already active."),
            Ok(activated) => format!("Activated: {}.", activated.join(", ")),
            Err(e) => e.to_string(),
        })
    }

    async fn deactivate(&self, name: &str) -> Result<String, BoxError> {
        Ok(match self.runtime()?.deactivate(name).await {
            Ok(done) if done.is_empty() => format!("Plugin '{name}' is not active."),
            Ok(done) => format!("Deactivated: {}.", done.join(", ")),
            Err(DeactivateError::Teardown {
                deactivated,
                failures,
            }) => {
                let failed: Vec<String> = failures.iter().map(|f| f.plugin.clone()).collect();
                format!(
                    "Deactivated: {}. Teardown failed for: {}.",
                    deactivated.join(", "),
                    failed.join(", ")
                )
            }
            Err(e) => e.to_string(),
        })
    }
}

fn describe(p: &PluginSnapshot) -> String {
    let mut lines = vec![format!("{} [{}]", p.name, p.state)];
    if let Some(description) = &p.description {
        lines.push(description.clone());
    }
    lines.push(format!("Depends on: {}", join_or_none(&p.dependencies)));
    lines.push(format!("Required by: {}", join_or_none(&p.dependents)));
    lines.push(format!("Commands: {}", join_or_none(&p.commands)));
    lines.push(format!("Scheduled tasks: {}", p.scheduled_tasks));
    if let Some(error) = &p.last_error {
        lines.push(format!("Last error: {error}"));
    }
    lines.join("\n")
}

#[async_trait]
impl Plugin for Plugins {
    fn commands(self: Arc<Self>) -> Vec<CommandSpec> {
        let list = Arc::clone(&self);
        let info = Arc::clone(&self);
        let activate = Arc::clone(&self);
        let deactivate = self;

        vec![
            CommandSpec::literal("plugin_list", move |_inv: Invocation| {
                let this = Arc::clone(&list);
                async move { this.list() }
            })
            .help("List loaded plugins and their state"),
            CommandSpec::arg_parse("plugin_info", required_name("plugin_info"), move |inv: Invocation| {
                let this = Arc::clone(&info);
                async move {
                    let name = argument(&inv, "name").ok_or("missing plugin name")?;
                    this.info(name)
                }
            })
            .help("Show a plugin's state, dependencies and commands"),
            CommandSpec::arg_parse(
                "plugin_activate",
                required_name("plugin_activate"),
                move |inv: Invocation| {
                    let this = Arc::clone(&activate);
                    async move {
                        let name = argument(&inv, "name").ok_or("missing plugin name")?;
                        this.activate(name).await
                    }
                },
            )
            .help("Activate a plugin and its dependencies"),
            CommandSpec::arg_parse(
                "plugin_deactivate",
                required_name("plugin_deactivate"),
                move |inv: Invocation| {
                    let this = Arc::clone(&deactivate);
                    async move {
                        let name = argument(&inv, "name").ok_or("missing plugin name")?;
                        this.deactivate(name).await
                    }
                },
            )
            .help("Deactivate a plugin and everything that depends on it"),
        ]
    }
}
