//! The live command table.

use std::collections::HashMap;
use std::sync::Arc;

use super::spec::{CommandKind, CommandSpec};

/// A command installed in the table under its visible name.
#[derive(Debug)]
pub struct RegisteredCommand {
    /// The externally visible name; bare or `plugin-command` after a clash.
    pub visible: String,
    pub spec: CommandSpec,
}

impl RegisteredCommand {
    pub fn plugin(&self) -> &str {
        self.spec.plugin()
    }

    pub fn kind(&self) -> CommandKind {
        self.spec.kind()
    }

    pub fn is_renamed(&self) -> bool {
        self.visible != self.spec.name()
    }
}

/// Visible name → command, plus registration order.
///
/// Prefixed commands (literal and arg-parse) and unprefixed ones (regex and
/// catch-all) live in separate namespaces: a visible name is unique within its
/// namespace, compared case-insensitively, and prefix lookup only ever sees
/// the prefixed one.
#[derive(Debug, Default)]
pub struct CommandTable {
    entries: Vec<Arc<RegisteredCommand>>,
    prefixed: HashMap<String, Arc<RegisteredCommand>>,
    unprefixed: HashMap<String, Arc<RegisteredCommand>>,
    max_words: usize,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks a command up by visible name, prefixed commands first.
    pub fn get(&self, name: &str) -> Option<&Arc<RegisteredCommand>> {
        let key = name.to_lowercase();
        self.prefixed.get(&key).or_else(|| self.unprefixed.get(&key))
    }

    /// Looks a prefixed command up by visible name.
    pub fn get_prefixed(&self, name: &str) -> Option<&Arc<RegisteredCommand>> {
        self.prefixed.get(&name.to_lowercase())
    }

    /// The command holding `name` in the namespace of `kind`.
    pub fn holder(&self, kind: CommandKind, name: &str) -> Option<&Arc<RegisteredCommand>> {
        self.namespace(kind).get(&name.to_lowercase())
    }

    /// Whether `plugin` already owns a command named `command`.
    pub fn contains_key(&self, plugin: &str, command: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.plugin() == plugin && e.spec.name() == command)
    }

    /// Commands in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<RegisteredCommand>> {
        self.entries.iter()
    }

    /// Most `_`-separated words any prefixed name is made of.
    pub(crate) fn max_words(&self) -> usize {
        self.max_words
    }

    fn namespace(&self, kind: CommandKind) -> &HashMap<String, Arc<RegisteredCommand>> {
        if kind.is_prefixed() {
            &self.prefixed
        } else {
            &self.unprefixed
        }
    }

    fn namespace_mut(&mut self, kind: CommandKind) -> &mut HashMap<String, Arc<RegisteredCommand>> {
        if kind.is_prefixed() {
            &mut self.prefixed
        } else {
            &mut self.unprefixed
        }
    }

    pub(crate) fn insert(&mut self, command: RegisteredCommand) -> Arc<RegisteredCommand> {
        let command = Arc::new(command);
        if command.kind().is_prefixed() {
            self.max_words = self.max_words.max(word_count(&command.visible));
        }
        self.namespace_mut(command.kind())
            .insert(command.visible.to_lowercase(), Arc::clone(&command));
        self.entries.push(Arc::clone(&command));
        command
    }

    /// Removes one installed command.
    pub(crate) fn remove(&mut self, command: &Arc<RegisteredCommand>) -> bool {
        let key = command.visible.to_lowercase();
        let namespace = self.namespace_mut(command.kind());
        if !namespace.get(&key).is_some_and(|held| Arc::ptr_eq(held, command)) {
            return false;
        }
        namespace.remove(&key);
        self.entries.retain(|e| !Arc::ptr_eq(e, command));
        self.recount();
        true
    }

    /// Removes every command owned by `plugin`, returning them.
    pub(crate) fn remove_plugin(&mut self, plugin: &str) -> Vec<Arc<RegisteredCommand>> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| e.plugin() == plugin);
        self.entries = kept;
        for command in &removed {
            let key = command.visible.to_lowercase();
            self.namespace_mut(command.kind()).remove(&key);
        }
        self.recount();
        removed
    }

    fn recount(&mut self) {
        self.max_words = self
            .entries
            .iter()
            .filter(|e| e.kind().is_prefixed())
            .map(|e| word_count(&e.visible))
            .max()
            .unwrap_or(0);
    }
}

fn word_count(name: &str) -> usize {
    name.split('_').filter(|w| !w.is_empty()).count().max(1)
}
