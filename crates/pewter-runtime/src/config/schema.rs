//! Configuration schema definitions.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use pewter_framework::command::MatcherConfig;
use pewter_framework::router::{DenialPolicy, RouterConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PewterConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Command prefix, replies and worker pool.
    #[serde(default)]
    pub bot: BotConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Per-command access rules.
    #[serde(default)]
    pub access: AccessConfig,

    /// Per-plugin configuration values, keyed by plugin name.
    #[serde(default)]
    pub plugins: HashMap<String, Value>,

    #[serde(default)]
    pub startup: StartupConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Rotation of the log file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level; `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file, required when `output` is `file`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line of the call site.
    #[serde(default)]
    pub file_location: bool,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Per-module levels, e.g. `pewter_framework = "debug"`.
    #[serde(default)]
    pub filters: BTreeMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            rotation: LogRotation::Never,
            thread_ids: false,
            file_location: false,
            span_events: SpanEventConfig::default(),
            filters: BTreeMap::new(),
        }
    }
}

// =============================================================================
// Bot
// =============================================================================

/// Command handling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Prefix that marks a message as a command.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Additional accepted prefixes.
    #[serde(default)]
    pub alt_prefixes: Vec<String>,

    /// Direct messages may omit the prefix.
    #[serde(default)]
    pub prefix_optional_in_direct: bool,

    /// Reply to prefixed messages that name no known command.
    #[serde(default)]
    pub reply_unknown_command: bool,

    /// Reply or stay silent when access is denied.
    #[serde(default)]
    pub denial: DenialPolicy,

    /// Reply with a generic message when a handler fails.
    #[serde(default = "default_true")]
    pub reply_handler_errors: bool,

    /// Upper bound on concurrently running handlers.
    #[serde(default = "default_max_concurrent_handlers")]
    pub max_concurrent_handlers: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            alt_prefixes: Vec::new(),
            prefix_optional_in_direct: false,
            reply_unknown_command: false,
            denial: DenialPolicy::Reply,
            reply_handler_errors: true,
            max_concurrent_handlers: default_max_concurrent_handlers(),
        }
    }
}

impl BotConfig {
    /// Converts to the router's configuration.
    pub fn to_router_config(&self) -> RouterConfig {
        RouterConfig {
            matcher: MatcherConfig {
                prefix: self.prefix.clone(),
                alt_prefixes: self.alt_prefixes.clone(),
                prefix_optional_in_direct: self.prefix_optional_in_direct,
            },
            denial: self.denial,
            reply_handler_errors: self.reply_handler_errors,
        }
    }
}

fn default_prefix() -> String {
    "!".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent_handlers() -> usize {
    16
}

// =============================================================================
// Scheduler
// =============================================================================

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Longest the scheduler loop sleeps before re-reading the clock.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

fn default_tick_ms() -> u64 {
    1000
}

// =============================================================================
// Access
// =============================================================================

/// Allow and deny lists for one command.
///
/// Deny lists win over allow lists; an empty allow list allows everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRule {
    #[serde(default)]
    pub allow_users: Vec<String>,
    #[serde(default)]
    pub deny_users: Vec<String>,
    #[serde(default)]
    pub allow_rooms: Vec<String>,
    #[serde(default)]
    pub deny_rooms: Vec<String>,
}

/// Access control settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Users allowed to run every command.
    #[serde(default)]
    pub admins: Vec<String>,

    /// Commands only admins may run.
    #[serde(default = "default_admin_commands")]
    pub admin_commands: Vec<String>,

    /// Rules keyed by visible command name; `*` applies to commands without a
    /// rule of their own.
    #[serde(default)]
    pub rules: BTreeMap<String, AclRule>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            admins: Vec::new(),
            admin_commands: default_admin_commands(),
            rules: BTreeMap::new(),
        }
    }
}

fn default_admin_commands() -> Vec<String> {
    vec!["plugin_activate".to_string(), "plugin_deactivate".to_string()]
}

// =============================================================================
// Startup
// =============================================================================

/// Plugins brought up when the runtime starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupConfig {
    /// Activated after the persisted set has been replayed.
    #[serde(default = "default_startup_activate")]
    pub activate: Vec<String>,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            activate: default_startup_activate(),
        }
    }
}

fn default_startup_activate() -> Vec<String> {
    vec!["help".to_string(), "plugins".to_string()]
}
