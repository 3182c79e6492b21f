//! Command specifications contributed by plugins.

use std::fmt;

use tower::BoxError;

use crate::handler::{BoxedHandlerService, Handler, into_service};

/// How a command is recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Prefix plus name; the rest of the line is passed through untouched.
    Literal,
    /// Prefix plus name; the rest is shell-split and parsed by a clap grammar.
    ArgParse,
    /// A regular expression tested against the whole message body.
    Regex,
    /// Sees every message no other command claimed.
    CatchAll,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Literal => "literal",
            Self::ArgParse => "arg-parse",
            Self::Regex => "regex",
            Self::CatchAll => "catch-all",
        })
    }
}

impl CommandKind {
    /// Whether the command is named after a prefix. Regex and catch-all
    /// commands are not, so their names never shadow a prefixed command.
    pub fn is_prefixed(self) -> bool {
        matches!(self, Self::Literal | Self::ArgParse)
    }
}

/// The matcher payload of a command.
#[derive(Clone)]
pub enum Pattern {
    Literal,
    ArgParse(Box<clap::Command>),
    Regex(regex::Regex),
    CatchAll,
}

impl Pattern {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Literal => CommandKind::Literal,
            Self::ArgParse(_) => CommandKind::ArgParse,
            Self::Regex(_) => CommandKind::Regex,
            Self::CatchAll => CommandKind::CatchAll,
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal => f.write_str("Literal"),
            Self::ArgParse(cmd) => f.debug_tuple("ArgParse").field(&cmd.get_name()).finish(),
            Self::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            Self::CatchAll => f.write_str("CatchAll"),
        }
    }
}

/// A single command a plugin contributes while activated.
///
/// ```rust,ignore
/// CommandSpec::literal("ping", |_inv: Invocation| async { "pong" })
///     .help("Checks that the bot is alive");
///
/// CommandSpec::arg_parse(
///     "echo_to_me",
///     clap::Command::new("echo_to_me")
///         .arg(clap::Arg::new("target").required(true))
///         .arg(clap::Arg::new("text").required(true).num_args(1..)),
///     echo_to_me,
/// )
/// .hint("<target> <text>");
/// ```
#[derive(Clone)]
pub struct CommandSpec {
    name: String,
    plugin: String,
    pattern: Pattern,
    hint: Option<String>,
    help: Option<String>,
    handler: BoxedHandlerService,
}

impl CommandSpec {
    fn new(name: impl Into<String>, pattern: Pattern, handler: BoxedHandlerService) -> Self {
        Self {
            name: name.into(),
            plugin: String::new(),
            pattern,
            hint: None,
            help: None,
            handler,
        }
    }

    /// A literal command. Multi-word names are written with `_`
    /// (`plugin_activate` matches `!plugin activate` and `!plugin_activate`).
    pub fn literal<H, R>(name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<R>,
        R: 'static,
    {
        Self::new(name, Pattern::Literal, into_service(handler))
    }

    /// A command whose arguments are parsed by `grammar`.
    ///
    /// Without an explicit [`hint`](Self::hint) the hint is derived from the
    /// grammar's usage line.
    pub fn arg_parse<H, R>(name: impl Into<String>, grammar: clap::Command, handler: H) -> Self
    where
        H: Handler<R>,
        R: 'static,
    {
        let hint = usage_hint(&grammar);
        let mut spec = Self::new(name, Pattern::ArgParse(Box::new(grammar)), into_service(handler));
        spec.hint = hint;
        spec
    }

    /// A command matching `pattern` anywhere in the message body.
    pub fn regex<H, R>(name: impl Into<String>, pattern: &str, handler: H) -> Result<Self, BoxError>
    where
        H: Handler<R>,
        R: 'static,
    {
        let regex = regex::Regex::new(pattern)?;
        Ok(Self::new(name, Pattern::Regex(regex), into_service(handler)))
    }

    /// A command that receives every message nothing else matched.
    pub fn catch_all<H, R>(name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<R>,
        R: 'static,
    {
        Self::new(name, Pattern::CatchAll, into_service(handler))
    }

    /// Sets the syntax hint shown in usage and help replies.
    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Sets the one-line help text.
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Assigns the owning plugin. The registry does this for every spec a
    /// plugin contributes.
    pub fn owned_by(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = plugin.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owning plugin; empty until the registry claims the spec.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn kind(&self) -> CommandKind {
        self.pattern.kind()
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn syntax_hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn help_text(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub(crate) fn handler(&self) -> BoxedHandlerService {
        self.handler.clone()
    }

    /// The internal key, `plugin.command`.
    pub fn key(&self) -> String {
        format!("{}.{}", self.plugin, self.name)
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("plugin", &self.plugin)
            .field("pattern", &self.pattern)
            .field("hint", &self.hint)
            .field("help", &self.help)
            .finish_non_exhaustive()
    }
}

/// The argument part of a grammar's usage line, e.g. `<target> <text>...`.
fn usage_hint(grammar: &clap::Command) -> Option<String> {
    let mut grammar = grammar.clone();
    let usage = grammar.render_usage().to_string();
    let usage = usage.trim();
    let usage = usage.strip_prefix("Usage:").unwrap_or(usage).trim_start();
    let args = usage
        .split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim())
        .unwrap_or_default();
    (!args.is_empty()).then(|| args.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Invocation;
    use clap::Arg;

    #[test]
    fn test_literal_builder() {
        let spec = CommandSpec::literal("ping", |_inv: Invocation| async { "pong" })
            .help("Checks the bot")
            .owned_by("core");
        assert_eq!(spec.kind(), CommandKind::Literal);
        assert_eq!(spec.key(), "core.ping");
        assert_eq!(spec.help_text(), Some("Checks the bot"));
        assert_eq!(spec.syntax_hint(), None);
    }

    #[test]
    fn test_arg_parse_derives_hint() {
        let grammar = clap::Command::new("greet").arg(Arg::new("who").required(true));
        let spec = CommandSpec::arg_parse("greet", grammar, |_inv: Invocation| async {});
        let hint = spec.syntax_hint().unwrap();
        assert!(hint.contains("who"), "hint was {hint:?}");
    }

    #[test]
    fn test_explicit_hint_wins() {
        let grammar = clap::Command::new("greet").arg(Arg::new("who").required(true));
        let spec = CommandSpec::arg_parse("greet", grammar, |_inv: Invocation| async {})
            .hint("<name>");
        assert_eq!(spec.syntax_hint(), Some("<name>"));
    }

    #[test]
    fn test_invalid_regex() {
        assert!(CommandSpec::regex("bad", "(", |_inv: Invocation| async {}).is_err());
    }
}
