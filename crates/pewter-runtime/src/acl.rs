//! Configuration-driven access filter.
//!
//! Evaluation for a command, first match wins:
//!
//! 1. admins may run everything;
//! 2. admin-only commands are refused to everyone else;
//! 3. the command's own rule, or the `*` rule, applies its deny lists, then
//!    its allow lists;
//! 4. without a rule the command is open.

use std::collections::{HashMap, HashSet};

use pewter_core::AccessFilter;

use crate::config::{AccessConfig, AclRule};

/// An [`AccessFilter`] built from the `access` config section.
#[derive(Debug, Clone, Default)]
pub struct AclFilter {
    admins: HashSet<String>,
    admin_commands: HashSet<String>,
    rules: HashMap<String, AclRule>,
}

impl AclFilter {
    pub fn new(config: &AccessConfig) -> Self {
        Self {
            admins: config.admins.iter().cloned().collect(),
            admin_commands: config
                .admin_commands
                .iter()
                .map(|c| c.to_lowercase())
                .collect(),
            rules: config
                .rules
                .iter()
                .map(|(name, rule)| (name.to_lowercase(), rule.clone()))
                .collect(),
        }
    }

    pub fn is_admin(&self, sender: &str) -> bool {
        self.admins.contains(sender)
    }

    fn rule_for(&self, command: &str) -> Option<&AclRule> {
        self.rules.get(command).or_else(|| self.rules.get("*"))
    }
}

fn listed(list: &[String], value: &str) -> bool {
    list.iter().any(|entry| entry == value)
}

impl AccessFilter for AclFilter {
    fn allow(&self, command: &str, sender: &str, room: Option<&str>) -> bool {
        if self.is_admin(sender) {
            return true;
        }

        let command = command.to_lowercase();
        if self.admin_commands.contains(&command) {
            return false;
        }

        let Some(rule) = self.rule_for(&command) else {
            return true;
        };

        if listed(&rule.deny_users, sender) {
            return false;
        }
        if let Some(room) = room
            && listed(&rule.deny_rooms, room)
        {
            return false;
        }
        if !rule.allow_users.is_empty() && !listed(&rule.allow_users, sender) {
            return false;
        }
        if !rule.allow_rooms.is_empty() && !room.is_some_and(|r| listed(&rule.allow_rooms, r)) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn filter() -> AclFilter {
        let mut rules = BTreeMap::new();
        rules.insert(
            "weather".to_string(),
            AclRule {
                deny_users: strings(&["troll"]),
                allow_rooms: strings(&["#lobby"]),
                ..AclRule::default()
            },
        );
        rules.insert(
            "*".to_string(),
            AclRule {
                deny_rooms: strings(&["#quiet"]),
                ..AclRule::default()
            },
        );
        AclFilter::new(&AccessConfig {
            admins: strings(&["root"]),
            admin_commands: strings(&["plugin_activate"]),
            rules,
        })
    }

    #[test]
    fn test_admin_commands() {
        let acl = filter();
        assert!(!acl.allow("plugin_activate", "alice", None));
        assert!(!acl.allow("Plugin_Activate", "alice", None));
        assert!(acl.allow("plugin_activate", "root", None));
    }

    #[test]
    fn test_command_rule() {
        let acl = filter();
        assert!(acl.allow("weather", "alice", Some("#lobby")));
        assert!(!acl.allow("weather", "alice", Some("#random")));
        assert!(!acl.allow("weather", "alice", None));
        assert!(!acl.allow("weather", "troll", Some("#lobby")));
        assert!(acl.allow("weather", "root", Some("#random")));
    }

    #[test]
    fn test_wildcard_rule() {
        let acl = filter();
        assert!(acl.allow("echo", "alice", Some("#lobby")));
        assert!(acl.allow("echo", "alice", None));
        assert!(!acl.allow("echo", "alice", Some("#quiet")));
    }

    #[test]
    fn test_default_config_locks_admin_commands() {
        let acl = AclFilter::new(&AccessConfig::default());
        assert!(!acl.allow("plugin_deactivate", "anyone", None));
        assert!(acl.allow("plugin_list", "anyone", None));
    }
}
