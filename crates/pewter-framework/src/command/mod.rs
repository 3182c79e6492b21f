//! Command specifications, the live command table and message matching.
//!
//! Plugins describe their commands as [`CommandSpec`]s. While a plugin is
//! activated its specs live in a [`CommandTable`] under a visible name, and
//! [`CommandMatcher`] classifies every incoming message against that table.

pub mod matcher;
pub mod spec;
pub mod split;
pub mod table;

pub use matcher::{CommandMatcher, MatchResult, Matched, MatcherConfig};
pub use spec::{CommandKind, CommandSpec, Pattern};
pub use split::shell_split;
pub use table::{CommandTable, RegisteredCommand};
