//! Plugin descriptor: the immutable handle a source hands to the registry.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tower::BoxError;

use super::core::Plugin;

/// Builds a plugin instance from its validated configuration.
pub type PluginFactory = Arc<dyn Fn(&Value) -> Result<Arc<dyn Plugin>, BoxError> + Send + Sync>;

// ─── PluginDescriptor ─────────────────────────────────────────────────────────

/// Identifies a plugin and knows how to construct it.
///
/// Descriptors are created at discovery time and never change afterwards; the
/// registry builds a fresh instance from the factory on every (re)activation.
///
/// ```rust,ignore
/// PluginDescriptor::new("weather", |config| Ok(Weather::from_config(config)?))
///     .depends_on("http")
///     .config_schema(json!({ "api_key": "", "units": "metric" }))
///     .description("Answers weather questions");
/// ```
#[derive(Clone)]
pub struct PluginDescriptor {
    name: String,
    dependencies: BTreeSet<String>,
    source: Option<PathBuf>,
    config_schema: Option<Value>,
    description: Option<String>,
    factory: PluginFactory,
}

impl PluginDescriptor {
    pub fn new<F, P>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Value) -> Result<P, BoxError> + Send + Sync + 'static,
        P: Plugin,
    {
        Self {
            name: name.into(),
            dependencies: BTreeSet::new(),
            source: None,
            config_schema: None,
            description: None,
            factory: Arc::new(move |config: &Value| {
                let plugin: Arc<dyn Plugin> = Arc::new(factory(config)?);
                Ok(plugin)
            }),
        }
    }

    /// Declares a dependency on another plugin.
    pub fn depends_on(mut self, plugin: impl Into<String>) -> Self {
        self.dependencies.insert(plugin.into());
        self
    }

    pub fn dependencies_from<I, S>(mut self, plugins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(plugins.into_iter().map(Into::into));
        self
    }

    /// Where the plugin was found, for diagnostics.
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// A JSON template describing the accepted configuration and its defaults.
    pub fn config_schema(mut self, schema: Value) -> Self {
        self.config_schema = Some(schema);
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn schema(&self) -> Option<&Value> {
        self.config_schema.as_ref()
    }

    pub fn description_text(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Runs the factory.
    pub fn instantiate(&self, config: &Value) -> Result<Arc<dyn Plugin>, BoxError> {
        (self.factory)(config)
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("source", &self.source)
            .field("has_schema", &self.config_schema.is_some())
            .finish_non_exhaustive()
    }
}
