//! Where plugin descriptors come from.
//!
//! Packaging is not the runtime's concern; it only asks a [`PluginSource`] for
//! descriptors. Two sources ship with the framework:
//!
//! - [`StaticSource`]: descriptors handed over in code.
//! - [`LinkedSource`]: descriptors contributed to the [`PLUGINS`] distributed
//!   slice by any crate linked into the binary.
//!
//! ```rust,ignore
//! use pewter_framework::linkme::distributed_slice;
//! use pewter_framework::plugin::{PLUGINS, PluginDescriptor};
//!
//! #[distributed_slice(PLUGINS)]
//! #[linkme(crate = pewter_framework::linkme)]
//! static WEATHER: fn() -> PluginDescriptor = weather_descriptor;
//! ```

use linkme::distributed_slice;

use super::descriptor::PluginDescriptor;

/// Registry of statically linked plugin descriptor constructors.
#[distributed_slice]
pub static PLUGINS: [fn() -> PluginDescriptor];

/// Supplies plugin descriptors to the runtime.
pub trait PluginSource: Send + Sync {
    /// Returns every descriptor this source can currently offer.
    fn discover(&self) -> Vec<PluginDescriptor>;
}

/// Descriptors supplied directly.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    descriptors: Vec<PluginDescriptor>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, descriptor: PluginDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn push(&mut self, descriptor: PluginDescriptor) {
        self.descriptors.push(descriptor);
    }
}

impl FromIterator<PluginDescriptor> for StaticSource {
    fn from_iter<I: IntoIterator<Item = PluginDescriptor>>(iter: I) -> Self {
        Self {
            descriptors: iter.into_iter().collect(),
        }
    }
}

impl PluginSource for StaticSource {
    fn discover(&self) -> Vec<PluginDescriptor> {
        self.descriptors.clone()
    }
}

/// Descriptors from the [`PLUGINS`] distributed slice.
#[derive(Debug, Clone, Default)]
pub struct LinkedSource {
    only: Option<Vec<String>>,
}

impl LinkedSource {
    /// Every linked plugin.
    pub fn all() -> Self {
        Self::default()
    }

    /// Only the linked plugins with the given names.
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            only: Some(names.into_iter().map(Into::into).collect()),
        }
    }

    /// Looks up one linked plugin by name.
    pub fn find(name: &str) -> Option<PluginDescriptor> {
        PLUGINS.iter().map(|make| make()).find(|d| d.name() == name)
    }
}

impl PluginSource for LinkedSource {
    fn discover(&self) -> Vec<PluginDescriptor> {
        PLUGINS
            .iter()
            .map(|make| make())
            .filter(|d| {
                self.only
                    .as_ref()
                    .is_none_or(|names| names.iter().any(|n| n == d.name()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Plugin;

    struct Linked;
    impl Plugin for Linked {}

    fn linked_descriptor() -> PluginDescriptor {
        PluginDescriptor::new("linked-test", |_config| Ok(Linked))
    }

    #[distributed_slice(PLUGINS)]
    static LINKED_TEST: fn() -> PluginDescriptor = linked_descriptor;

    #[test]
    fn test_linked_source_discovers_slice_entries() {
        let names: Vec<_> = LinkedSource::all()
            .discover()
            .into_iter()
            .map(|d| d.name().to_string())
            .collect();
        assert!(names.contains(&"linked-test".to_string()));
        assert!(LinkedSource::find("linked-test").is_some());
        assert!(LinkedSource::only(["nothing"]).discover().is_empty());
    }

    #[test]
    fn test_static_source() {
        let source: StaticSource = [
            PluginDescriptor::new("a", |_config| Ok(Linked)),
            PluginDescriptor::new("b", |_config| Ok(Linked)).depends_on("a"),
        ]
        .into_iter()
        .collect();
        let found = source.discover();
        assert_eq!(found.len(), 2);
        assert!(found[1].dependencies().contains("a"));
    }
}
