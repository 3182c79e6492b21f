//! Classifies one incoming message against the command table.
//!
//! Strategies are tried in a fixed order and the first tier that produces a
//! result wins:
//!
//! 1. **Literal**: the word(s) after the prefix name a literal command. The
//!    longest multi-word name wins, so `!plugin activate x` prefers
//!    `plugin_activate` over `plugin`.
//! 2. **Arg-parse**: the same name lookup, then the clap grammar over the
//!    shell-split remainder. When every candidate fails to parse the result is
//!    [`MatchResult::Usage`]; regex commands are not consulted.
//! 3. **Regex**: tested against the whole body, prefix or not. The first
//!    registered match wins.
//! 4. **Catch-all**: every catch-all command receives the message.

use std::sync::Arc;

use clap::error::ErrorKind;

use pewter_core::Message;

use super::spec::Pattern;
use super::split::{shell_split, word_spans};
use super::table::{CommandTable, RegisteredCommand};
use crate::handler::{Arguments, Captures};

/// Prefix rules for prefixed commands.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    pub prefix: String,
    pub alt_prefixes: Vec<String>,
    /// Direct messages may omit the prefix.
    pub prefix_optional_in_direct: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            prefix: "!".to_string(),
            alt_prefixes: Vec::new(),
            prefix_optional_in_direct: false,
        }
    }
}

/// A command selected for dispatch, with its arguments.
#[derive(Debug, Clone)]
pub struct Matched {
    pub command: Arc<RegisteredCommand>,
    pub args: Arguments,
}

/// Outcome of matching one message.
#[derive(Debug, Clone)]
pub enum MatchResult {
    /// Exactly one command claimed the message.
    Command(Matched),
    /// An arg-parse command was named but its arguments did not parse.
    Usage {
        command: Arc<RegisteredCommand>,
        hint: Option<String>,
        error: String,
    },
    /// No command claimed the message; every catch-all gets it.
    CatchAll(Vec<Matched>),
    NoMatch,
}

impl MatchResult {
    pub fn is_no_match(&self) -> bool {
        matches!(self, Self::NoMatch)
    }
}

/// Stateless matcher over a [`CommandTable`] snapshot.
#[derive(Debug, Clone)]
pub struct CommandMatcher {
    config: MatcherConfig,
    /// Prefixes longest first, so `!!` is tried before `!`.
    prefixes: Vec<String>,
}

impl CommandMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        let mut prefixes: Vec<String> = std::iter::once(config.prefix.clone())
            .chain(config.alt_prefixes.iter().cloned())
            .collect();
        prefixes.sort_by(|a, b| b.len().cmp(&a.len()));
        prefixes.dedup();
        Self { config, prefixes }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// The message body after its command prefix, if it is addressed as a
    /// command at all.
    pub fn strip_prefix<'a>(&self, message: &'a Message) -> Option<&'a str> {
        let body = message.body.trim_start();
        for prefix in &self.prefixes {
            if let Some(rest) = body.strip_prefix(prefix.as_str()) {
                return Some(rest);
            }
        }
        (message.is_direct() && self.config.prefix_optional_in_direct).then_some(body)
    }

    /// The first word after the prefix, used to report unknown commands.
    pub fn attempted_command(&self, message: &Message) -> Option<String> {
        self.strip_prefix(message)?
            .split_whitespace()
            .next()
            .map(str::to_string)
    }

    pub fn match_message(&self, table: &CommandTable, message: &Message) -> MatchResult {
        if let Some(rest) = self.strip_prefix(message) {
            let candidates = named_candidates(table, rest);

            // Tier 1: literal.
            for (command, remainder) in &candidates {
                if matches!(command.spec.pattern(), Pattern::Literal) {
                    return MatchResult::Command(Matched {
                        command: Arc::clone(command),
                        args: Arguments::Raw(remainder.to_string()),
                    });
                }
            }

            // Tier 2: arg-parse.
            let mut first_failure: Option<(Arc<RegisteredCommand>, String)> = None;
            for (command, remainder) in &candidates {
                let Pattern::ArgParse(grammar) = command.spec.pattern() else {
                    continue;
                };
                let argv = std::iter::once(command.visible.clone()).chain(shell_split(remainder));
                match (**grammar)
                    .clone()
                    .bin_name(command.visible.clone())
                    .try_get_matches_from(argv)
                {
                    Ok(matches) => {
                        return MatchResult::Command(Matched {
                            command: Arc::clone(command),
                            args: Arguments::Parsed(matches),
                        });
                    }
                    Err(err) => {
                        if first_failure.is_none() {
                            first_failure = Some((Arc::clone(command), summarize(&err)));
                        }
                    }
                }
            }
            if let Some((command, error)) = first_failure {
                return MatchResult::Usage {
                    hint: command.spec.syntax_hint().map(str::to_string),
                    command,
                    error,
                };
            }
        }

        // Tier 3: regex.
        for command in table.iter() {
            if let Pattern::Regex(regex) = command.spec.pattern()
                && let Some(caps) = regex.captures(&message.body)
            {
                return MatchResult::Command(Matched {
                    command: Arc::clone(command),
                    args: Arguments::Captures(Captures::from_regex(regex, &caps)),
                });
            }
        }

        // Tier 4: catch-all.
        let catch_alls: Vec<Matched> = table
            .iter()
            .filter(|c| matches!(c.spec.pattern(), Pattern::CatchAll))
            .map(|c| Matched {
                command: Arc::clone(c),
                args: Arguments::None,
            })
            .collect();
        if catch_alls.is_empty() {
            MatchResult::NoMatch
        } else {
            MatchResult::CatchAll(catch_alls)
        }
    }
}

impl Default for CommandMatcher {
    fn default() -> Self {
        Self::new(MatcherConfig::default())
    }
}

/// Commands named by the leading words of `rest`, longest name first, each
/// with the text that follows the name.
fn named_candidates<'a>(
    table: &CommandTable,
    rest: &'a str,
) -> Vec<(Arc<RegisteredCommand>, &'a str)> {
    let spans = word_spans(rest);
    let longest = spans.len().min(table.max_words());
    let mut candidates = Vec::new();

    for words in (1..=longest).rev() {
        let name = spans[..words]
            .iter()
            .map(|&(start, end)| &rest[start..end])
            .collect::<Vec<_>>()
            .join("_");
        if let Some(command) = table.get_prefixed(&name) {
            let remainder = rest[spans[words - 1].1..].trim();
            candidates.push((Arc::clone(command), remainder));
        }
    }

    candidates
}

/// A one-line description of a clap parse failure.
fn summarize(err: &clap::Error) -> String {
    let rendered = err.to_string();
    if matches!(
        err.kind(),
        ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
    ) {
        return rendered.trim().to_string();
    }

    let text = rendered
        .lines()
        .map(str::trim)
        .take_while(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    text.strip_prefix("error:")
        .map(str::trim)
        .unwrap_or(&text)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::spec::CommandSpec;
    use crate::handler::Invocation;
    use clap::Arg;

    fn install(table: &mut CommandTable, plugin: &str, spec: CommandSpec) {
        let spec = spec.owned_by(plugin);
        let visible = spec.name().to_string();
        table.insert(RegisteredCommand { visible, spec });
    }

    fn literal(name: &str) -> CommandSpec {
        CommandSpec::literal(name, |_inv: Invocation| async {})
    }

    fn echo_to_me() -> CommandSpec {
        let grammar = clap::Command::new("echo_to_me")
            .arg(Arg::new("target").required(true))
            .arg(Arg::new("text").required(true).num_args(1..));
        CommandSpec::arg_parse("echo_to_me", grammar, |_inv: Invocation| async {})
            .hint("<target> <text>")
    }

    fn matched_name(result: &MatchResult) -> Option<&str> {
        match result {
            MatchResult::Command(m) => Some(m.command.visible.as_str()),
            _ => None,
        }
    }

    #[test]
    fn test_literal_beats_catch_all() {
        let mut table = CommandTable::new();
        install(&mut table, "chat", CommandSpec::catch_all("listen", |_inv: Invocation| async {}));
        install(&mut table, "greet", literal("hi"));

        let matcher = CommandMatcher::default();
        let result = matcher.match_message(&table, &Message::in_room("r", "u", "!hi"));
        assert_eq!(matched_name(&result), Some("hi"));

        let result = matcher.match_message(&table, &Message::in_room("r", "u", "hello"));
        assert!(matches!(result, MatchResult::CatchAll(ref all) if all.len() == 1));
    }

    #[test]
    fn test_literal_passes_remainder() {
        let mut table = CommandTable::new();
        install(&mut table, "p", literal("echo"));
        let result = CommandMatcher::default()
            .match_message(&table, &Message::direct("u", "!echo  hello   world "));
        match result {
            MatchResult::Command(m) => assert_eq!(m.args.raw(), "hello   world"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_multi_word_name_longest_wins() {
        let mut table = CommandTable::new();
        install(&mut table, "admin", literal("plugin"));
        install(&mut table, "admin", literal("plugin_activate"));
        let matcher = CommandMatcher::default();

        for body in ["!plugin activate echo", "!plugin_activate echo"] {
            let result = matcher.match_message(&table, &Message::direct("u", body));
            match result {
                MatchResult::Command(m) => {
                    assert_eq!(m.command.visible, "plugin_activate");
                    assert_eq!(m.args.raw(), "echo");
                }
                other => panic!("unexpected {other:?} for {body}"),
            }
        }

        let result = matcher.match_message(&table, &Message::direct("u", "!plugin list"));
        assert_eq!(matched_name(&result), Some("plugin"));
    }

    #[test]
    fn test_name_match_is_case_insensitive() {
        let mut table = CommandTable::new();
        install(&mut table, "p", literal("ping"));
        let result =
            CommandMatcher::default().match_message(&table, &Message::direct("u", "!PING"));
        assert_eq!(matched_name(&result), Some("ping"));
    }

    #[test]
    fn test_arg_parse_success() {
        let mut table = CommandTable::new();
        install(&mut table, "echo", echo_to_me());
        let result = CommandMatcher::default().match_message(
            &table,
            &Message::direct("u", r#"!echo_to_me bob "hello there""#),
        );
        match result {
            MatchResult::Command(m) => {
                let matches = m.args.matches().unwrap();
                assert_eq!(matches.get_one::<String>("target").unwrap(), "bob");
                let text: Vec<_> = matches.get_many::<String>("text").unwrap().collect();
                assert_eq!(text, vec!["hello there"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_arg_parse_failure_yields_usage() {
        let mut table = CommandTable::new();
        install(&mut table, "echo", echo_to_me());
        install(
            &mut table,
            "spy",
            CommandSpec::regex("any", ".*", |_inv: Invocation| async {}).unwrap(),
        );
        let result = CommandMatcher::default()
            .match_message(&table, &Message::direct("u", "!echo_to_me"));
        match result {
            MatchResult::Usage { command, hint, error } => {
                assert_eq!(command.visible, "echo_to_me");
                assert_eq!(hint.as_deref(), Some("<target> <text>"));
                assert!(!error.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_regex_ignores_prefix_first_registered_wins() {
        let mut table = CommandTable::new();
        install(
            &mut table,
            "a",
            CommandSpec::regex("weather", r"weather in (?P<city>\w+)", |_inv: Invocation| async {})
                .unwrap(),
        );
        install(
            &mut table,
            "b",
            CommandSpec::regex("anything", r"in", |_inv: Invocation| async {}).unwrap(),
        );
        let result = CommandMatcher::default()
            .match_message(&table, &Message::in_room("r", "u", "what's the weather in Paris"));
        match result {
            MatchResult::Command(m) => {
                assert_eq!(m.command.visible, "weather");
                assert_eq!(m.args.captures().unwrap().name("city"), Some("Paris"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_prefix_rules() {
        let mut table = CommandTable::new();
        install(&mut table, "p", literal("ping"));
        let matcher = CommandMatcher::new(MatcherConfig {
            prefix: "!".into(),
            alt_prefixes: vec!["bot:".into()],
            prefix_optional_in_direct: true,
        });

        assert!(matched_name(&matcher.match_message(&table, &Message::in_room("r", "u", "bot: ping"))).is_some());
        assert!(matched_name(&matcher.match_message(&table, &Message::direct("u", "ping"))).is_some());
        assert!(matcher
            .match_message(&table, &Message::in_room("r", "u", "ping"))
            .is_no_match());
    }

    #[test]
    fn test_attempted_command() {
        let matcher = CommandMatcher::default();
        assert_eq!(
            matcher.attempted_command(&Message::direct("u", "!frobnicate now")),
            Some("frobnicate".to_string())
        );
        assert_eq!(matcher.attempted_command(&Message::direct("u", "hello")), None);
    }
}
