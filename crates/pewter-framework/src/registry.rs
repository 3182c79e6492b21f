//! Plugin lifecycle management.
//!
//! [`PluginRegistry`] is the single owner of every plugin descriptor and live
//! instance. It:
//!
//! - Loads descriptors: validates the plugin's configuration against its
//!   schema and builds the instance in state [`PluginState::Loaded`]. A failed
//!   load is recorded as [`PluginState::Failed`] and stays inspectable.
//! - Activates plugins together with their dependency closure, dependencies
//!   first. Each step registers the plugin's commands with the router, opens
//!   its scheduler scope and runs its activation hook. Any failure rolls back
//!   every plugin activated by the same call.
//! - Deactivates a plugin together with everything that depends on it, in
//!   reverse activation order. Teardown errors are collected, never blocking.
//!
//! All mutations are serialized behind one async lock; the state table itself
//! sits behind a short synchronous lock that is never held across `.await`.
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = PluginRegistry::new(router, scheduler);
//! registry.load(PluginDescriptor::new("db", |_| Ok(Db))).await?;
//! registry.load(PluginDescriptor::new("app", |_| Ok(App)).depends_on("db")).await?;
//! assert_eq!(registry.activate("app").await?, ["db", "app"]);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tower::BoxError;
use tracing::{debug, error, info, warn};

use pewter_core::Outbox;

use crate::error::{
    ActivateError, ActivateResult, DeactivateError, DeactivateResult, DeactivationError,
    LoadError, LoadResult, RemoveError,
};
use crate::executor::{isolate, panic_message};
use crate::graph::DependencyGraph;
use crate::plugin::{Plugin, PluginContext, PluginDescriptor, PluginSource, resolve_config};
use crate::router::CommandRouter;
use crate::scheduler::{PluginScheduler, Scheduler};

// =============================================================================
// State
// =============================================================================

/// Lifecycle state of a loaded plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    /// Instance built, not serving.
    Loaded,
    /// Commands registered and scheduler scope open.
    Activated,
    /// Loading or activation failed; see the last error.
    Failed,
    /// Was activated, instance discarded. Activation treats it like `Loaded`
    /// and builds a fresh instance.
    Deactivated,
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Loaded => "loaded",
            Self::Activated => "activated",
            Self::Failed => "failed",
            Self::Deactivated => "deactivated",
        })
    }
}

/// A point-in-time view of one plugin.
#[derive(Debug, Clone, Serialize)]
pub struct PluginSnapshot {
    pub name: String,
    pub state: PluginState,
    pub dependencies: Vec<String>,
    /// Plugins that directly depend on this one.
    pub dependents: Vec<String>,
    /// Visible names of the commands currently registered.
    pub commands: Vec<String>,
    pub scheduled_tasks: usize,
    pub last_error: Option<String>,
    pub source: Option<PathBuf>,
    pub description: Option<String>,
}

struct Entry {
    descriptor: PluginDescriptor,
    state: PluginState,
    instance: Option<Arc<dyn Plugin>>,
    config: Arc<Value>,
    last_error: Option<String>,
    /// Activation sequence number; orders teardown.
    activated_seq: u64,
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    graph: DependencyGraph,
}

// =============================================================================
// PluginRegistry
// =============================================================================

/// Owns plugin descriptors, instances and their activation state.
pub struct PluginRegistry {
    lifecycle: Mutex<()>,
    inner: RwLock<Inner>,
    router: Arc<CommandRouter>,
    scheduler: Arc<Scheduler>,
    outbox: Outbox,
    configs: HashMap<String, Value>,
    seq: AtomicU64,
}

impl PluginRegistry {
    pub fn new(router: Arc<CommandRouter>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            lifecycle: Mutex::new(()),
            inner: RwLock::new(Inner::default()),
            router,
            scheduler,
            outbox: Outbox::detached(),
            configs: HashMap::new(),
            seq: AtomicU64::new(0),
        }
    }

    /// Outbox handed to plugins on activation.
    pub fn with_outbox(mut self, outbox: Outbox) -> Self {
        self.outbox = outbox;
        self
    }

    /// Per-plugin configuration values, keyed by plugin name.
    pub fn with_plugin_configs(mut self, configs: HashMap<String, Value>) -> Self {
        self.configs = configs;
        self
    }

    pub fn router(&self) -> &Arc<CommandRouter> {
        &self.router
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    // -------------------------------------------------------------------------
    // Loading
    // -------------------------------------------------------------------------

    /// Loads a descriptor and builds its instance.
    ///
    /// A name that is already loaded is replaced unless that plugin is
    /// activated. On failure the plugin is kept as [`PluginState::Failed`].
    pub async fn load(&self, descriptor: PluginDescriptor) -> LoadResult<PluginSnapshot> {
        let _guard = self.lifecycle.lock().await;
        self.load_locked(descriptor)
    }

    /// Loads everything `source` offers. Failures are logged and returned.
    pub async fn load_from(&self, source: &dyn PluginSource) -> Vec<LoadError> {
        let _guard = self.lifecycle.lock().await;
        source
            .discover()
            .into_iter()
            .filter_map(|descriptor| self.load_locked(descriptor).err())
            .collect()
    }

    fn load_locked(&self, descriptor: PluginDescriptor) -> LoadResult<PluginSnapshot> {
        let name = descriptor.name().to_string();
        if self.state(&name) == Some(PluginState::Activated) {
            return Err(LoadError::NameInUse(name));
        }

        let built = self.build(&descriptor);
        let result = {
            let mut inner = self.inner.write();
            inner
                .graph
                .insert(name.clone(), descriptor.dependencies().iter().cloned());
            match built {
                Ok((instance, config)) => {
                    inner.entries.insert(
                        name.clone(),
                        Entry {
                            descriptor,
                            state: PluginState::Loaded,
                            instance: Some(instance),
                            config,
                            last_error: None,
                            activated_seq: 0,
                        },
                    );
                    let inner = &*inner;
                    Ok(self.snapshot(inner, &name, &inner.entries[&name]))
                }
                Err(e) => {
                    inner.entries.insert(
                        name.clone(),
                        Entry {
                            descriptor,
                            state: PluginState::Failed,
                            instance: None,
                            config: Arc::new(Value::Null),
                            last_error: Some(e.to_string()),
                            activated_seq: 0,
                        },
                    );
                    Err(e)
                }
            }
        };

        match result {
            Ok(snapshot) => {
                info!(plugin = %name, "Plugin loaded");
                Ok(snapshot)
            }
            Err(e) => {
                warn!(plugin = %name, error = %e, "Plugin failed to load");
                Err(e)
            }
        }
    }

    /// Validates configuration, runs the factory and checks command names.
    fn build(&self, descriptor: &PluginDescriptor) -> LoadResult<(Arc<dyn Plugin>, Arc<Value>)> {
        let plugin = descriptor.name();
        let config = resolve_config(descriptor.schema(), self.configs.get(plugin)).map_err(
            |reason| LoadError::InvalidConfig {
                plugin: plugin.to_string(),
                reason,
            },
        )?;

        let instance = std::panic::catch_unwind(AssertUnwindSafe(|| descriptor.instantiate(&config)))
            .unwrap_or_else(|payload| Err(panic_message(payload.as_ref()).into()))
            .map_err(|source| LoadError::Construction {
                plugin: plugin.to_string(),
                source,
            })?;

        let mut seen = HashSet::new();
        for spec in Arc::clone(&instance).commands() {
            if !seen.insert(spec.name().to_string()) {
                return Err(LoadError::DuplicateCommand {
                    plugin: plugin.to_string(),
                    command: spec.name().to_string(),
                });
            }
        }

        Ok((instance, Arc::new(config)))
    }

    // -------------------------------------------------------------------------
    // Activation
    // -------------------------------------------------------------------------

    /// Activates `name` and everything it depends on.
    ///
    /// Returns the plugins this call activated, dependencies first; already
    /// active plugins are skipped. Nothing stays activated if any step fails.
    pub async fn activate(&self, name: &str) -> ActivateResult<Vec<String>> {
        let _guard = self.lifecycle.lock().await;
        self.activate_locked(name).await
    }

    async fn activate_locked(&self, name: &str) -> ActivateResult<Vec<String>> {
        let order = {
            let inner = self.inner.read();
            if !inner.entries.contains_key(name) {
                return Err(ActivateError::NotFound(name.to_string()));
            }
            inner.graph.activation_order(name)?
        };

        let mut activated: Vec<String> = Vec::new();
        for plugin in order {
            if self.state(&plugin) == Some(PluginState::Activated) {
                continue;
            }
            if let Err(source) = self.activate_one(&plugin).await {
                for done in activated.iter().rev() {
                    if let Err(e) = self.deactivate_one(done).await {
                        warn!(plugin = %done, error = %e, "Teardown failed during rollback");
                    }
                }
                error!(
                    plugin = %plugin,
                    requested = %name,
                    rolled_back = ?activated,
                    error = %source,
                    "Activation failed"
                );
                return Err(ActivateError::Activation { plugin, source });
            }
            activated.push(plugin);
        }

        if activated.is_empty() {
            debug!(plugin = %name, "Plugin already active");
        } else {
            info!(plugin = %name, activated = ?activated, "Plugin activated");
        }
        Ok(activated)
    }

    /// Brings one plugin up. On failure the plugin is left `Failed` with
    /// nothing registered.
    async fn activate_one(&self, name: &str) -> Result<(), BoxError> {
        let (reusable, descriptor) = {
            let inner = self.inner.read();
            let entry = inner
                .entries
                .get(name)
                .ok_or_else(|| BoxError::from(format!("plugin '{name}' vanished")))?;
            let reusable = match (&entry.instance, entry.state) {
                (Some(instance), PluginState::Loaded) => {
                    Some((Arc::clone(instance), Arc::clone(&entry.config)))
                }
                _ => None,
            };
            (reusable, entry.descriptor.clone())
        };

        let (instance, config) = match reusable {
            Some(ready) => ready,
            None => self.build(&descriptor).map_err(|e| {
                let e: BoxError = Box::new(e);
                self.mark_failed(name, &e);
                e
            })?,
        };

        if let Err(e) = self
            .router
            .register_all(name, Arc::clone(&instance).commands())
        {
            let e: BoxError = Box::new(e);
            self.mark_failed(name, &e);
            return Err(e);
        }

        self.scheduler.open(name);
        let ctx = PluginContext::new(
            name,
            Arc::clone(&config),
            PluginScheduler::new(Arc::clone(&self.scheduler), name),
            self.outbox.clone(),
        );

        if let Err(e) = isolate(Arc::clone(&instance).on_activate(ctx)).await {
            self.router.unregister(name);
            self.scheduler.close(name);
            if let Err(teardown) = isolate(instance.on_deactivate()).await {
                debug!(plugin = %name, error = %teardown, "Teardown after failed activation also failed");
            }
            let e: BoxError = Box::new(e);
            self.mark_failed(name, &e);
            return Err(e);
        }

        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(entry) = self.inner.write().entries.get_mut(name) {
            entry.state = PluginState::Activated;
            entry.instance = Some(instance);
            entry.config = config;
            entry.last_error = None;
            entry.activated_seq = seq;
        }
        debug!(plugin = %name, "Plugin step activated");
        Ok(())
    }

    fn mark_failed(&self, name: &str, error: &BoxError) {
        if let Some(entry) = self.inner.write().entries.get_mut(name) {
            entry.state = PluginState::Failed;
            entry.instance = None;
            entry.last_error = Some(error.to_string());
        }
    }

    // -------------------------------------------------------------------------
    // Deactivation
    // -------------------------------------------------------------------------

    /// Deactivates `name` and every activated plugin that depends on it.
    ///
    /// Returns the deactivated plugins in teardown order. Teardown failures
    /// never stop the closure; they are reported in
    /// [`DeactivateError::Teardown`] after everything went down.
    pub async fn deactivate(&self, name: &str) -> DeactivateResult<Vec<String>> {
        let _guard = self.lifecycle.lock().await;
        let targets = {
            let inner = self.inner.read();
            if !inner.entries.contains_key(name) {
                return Err(DeactivateError::NotFound(name.to_string()));
            }
            let closure = inner.graph.deactivation_closure(name);
            Self::teardown_order(&inner, |plugin| closure.contains(plugin))
        };
        let result = self.deactivate_in_order(targets).await;
        if let Ok(done) = &result
            && !done.is_empty()
        {
            info!(plugin = %name, deactivated = ?done, "Plugin deactivated");
        }
        result
    }

    /// Activated plugins matching `pred`, most recently activated first.
    fn teardown_order(inner: &Inner, pred: impl Fn(&str) -> bool) -> Vec<String> {
        let mut targets: Vec<(u64, String)> = inner
            .entries
            .iter()
            .filter(|(name, entry)| entry.state == PluginState::Activated && pred(name))
            .map(|(name, entry)| (entry.activated_seq, name.clone()))
            .collect();
        targets.sort_by(|a, b| b.0.cmp(&a.0));
        targets.into_iter().map(|(_, name)| name).collect()
    }

    async fn deactivate_in_order(&self, targets: Vec<String>) -> DeactivateResult<Vec<String>> {
        let mut deactivated = Vec::with_capacity(targets.len());
        let mut failures = Vec::new();

        for plugin in targets {
            if let Err(source) = self.deactivate_one(&plugin).await {
                failures.push(DeactivationError {
                    plugin: plugin.clone(),
                    source,
                });
            }
            deactivated.push(plugin);
        }

        if failures.is_empty() {
            Ok(deactivated)
        } else {
            Err(DeactivateError::Teardown {
                deactivated,
                failures,
            })
        }
    }

    /// Takes one plugin down: commands, timers, teardown hook, instance.
    async fn deactivate_one(&self, name: &str) -> Result<(), BoxError> {
        self.router.unregister(name);
        self.scheduler.close(name);

        let instance = self.inner.write().entries.get_mut(name).and_then(|entry| {
            entry.state = PluginState::Deactivated;
            entry.instance.take()
        });

        let result = match instance {
            Some(instance) => isolate(instance.on_deactivate())
                .await
                .map_err(|e| -> BoxError { Box::new(e) }),
            None => Ok(()),
        };

        match &result {
            Ok(()) => debug!(plugin = %name, "Plugin step deactivated"),
            Err(e) => {
                warn!(plugin = %name, error = %e, "Plugin teardown failed");
                if let Some(entry) = self.inner.write().entries.get_mut(name) {
                    entry.last_error = Some(e.to_string());
                }
            }
        }
        result
    }

    // -------------------------------------------------------------------------
    // Removal and shutdown
    // -------------------------------------------------------------------------

    /// Forgets a plugin that is not activated.
    pub async fn remove(&self, name: &str) -> Result<PluginDescriptor, RemoveError> {
        let _guard = self.lifecycle.lock().await;
        let mut inner = self.inner.write();
        match inner.entries.get(name).map(|e| e.state) {
            None => Err(RemoveError::NotFound(name.to_string())),
            Some(PluginState::Activated) => Err(RemoveError::Active(name.to_string())),
            Some(_) => {
                inner.graph.remove(name);
                let entry = inner
                    .entries
                    .remove(name)
                    .ok_or_else(|| RemoveError::NotFound(name.to_string()))?;
                info!(plugin = %name, "Plugin removed");
                Ok(entry.descriptor)
            }
        }
    }

    /// Deactivates every activated plugin, most recently activated first.
    pub async fn shutdown(&self) -> DeactivateResult<Vec<String>> {
        let _guard = self.lifecycle.lock().await;
        let targets = Self::teardown_order(&self.inner.read(), |_| true);
        let result = self.deactivate_in_order(targets).await;
        info!("Plugin registry shut down");
        result
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Names of activated plugins in activation order.
    pub fn active_names(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut active: Vec<(u64, &String)> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.state == PluginState::Activated)
            .map(|(name, e)| (e.activated_seq, name))
            .collect();
        active.sort();
        active.into_iter().map(|(_, name)| name.clone()).collect()
    }

    pub fn state(&self, name: &str) -> Option<PluginState> {
        self.inner.read().entries.get(name).map(|e| e.state)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().entries.contains_key(name)
    }

    /// Whether `name` could be activated now, with the missing or cyclic
    /// plugins when it cannot.
    pub fn can_activate(&self, name: &str) -> (bool, BTreeSet<String>) {
        self.inner.read().graph.can_activate(name)
    }

    pub fn get(&self, name: &str) -> Option<PluginSnapshot> {
        let inner = self.inner.read();
        let entry = inner.entries.get(name)?;
        Some(self.snapshot(&inner, name, entry))
    }

    /// Snapshots of every loaded plugin, by name.
    pub fn list(&self) -> Vec<PluginSnapshot> {
        let inner = self.inner.read();
        inner
            .entries
            .iter()
            .map(|(name, entry)| self.snapshot(&inner, name, entry))
            .collect()
    }

    fn snapshot(&self, inner: &Inner, name: &str, entry: &Entry) -> PluginSnapshot {
        PluginSnapshot {
            name: name.to_string(),
            state: entry.state,
            dependencies: entry.descriptor.dependencies().iter().cloned().collect(),
            dependents: inner.graph.dependents(name).into_iter().collect(),
            commands: self.router.commands_of(name),
            scheduled_tasks: self.scheduler.pending(name),
            last_error: entry.last_error.clone(),
            source: entry.descriptor.source_path().map(PathBuf::from),
            description: entry.descriptor.description_text().map(str::to_string),
        }
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let plugins = self.inner.read().entries.len();
        f.debug_struct("PluginRegistry")
            .field("plugins", &plugins)
            .field("active", &self.active_names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use pewter_core::Message;

    use crate::command::CommandSpec;
    use crate::executor::Executor;
    use crate::handler::Invocation;
    use crate::scheduler::ManualClock;

    type Log = Arc<parking_lot::Mutex<Vec<String>>>;

    #[derive(Clone, Default)]
    struct Behaviour {
        commands: Vec<&'static str>,
        fail_activate: bool,
        fail_deactivate: bool,
        timer: bool,
    }

    struct Probe {
        name: String,
        log: Log,
        behaviour: Behaviour,
    }

    #[async_trait]
    impl Plugin for Probe {
        fn commands(self: Arc<Self>) -> Vec<CommandSpec> {
            self.behaviour
                .commands
                .iter()
                .map(|&command| {
                    let owner = self.name.clone();
                    CommandSpec::literal(command, move |_inv: Invocation| {
                        let owner = owner.clone();
                        async move { format!("{owner}:{command}") }
                    })
                })
                .collect()
        }

        async fn on_activate(self: Arc<Self>, ctx: PluginContext) -> Result<(), BoxError> {
            self.log.lock().push(format!("activate:{}", self.name));
            if self.behaviour.timer {
                ctx.scheduler()
                    .schedule_repeating(Duration::from_secs(60), || async { Ok(()) })?;
            }
            if self.behaviour.fail_activate {
                return Err("activation refused".into());
            }
            Ok(())
        }

        async fn on_deactivate(&self) -> Result<(), BoxError> {
            self.log.lock().push(format!("deactivate:{}", self.name));
            if self.behaviour.fail_deactivate {
                return Err("teardown refused".into());
            }
            Ok(())
        }
    }

    struct Fixture {
        registry: PluginRegistry,
        log: Log,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_configs(HashMap::new())
        }

        fn with_configs(configs: HashMap<String, Value>) -> Self {
            let router = Arc::new(CommandRouter::default());
            let scheduler = Arc::new(Scheduler::new(
                Arc::new(ManualClock::default()),
                Executor::new(4),
            ));
            Self {
                registry: PluginRegistry::new(router, scheduler).with_plugin_configs(configs),
                log: Log::default(),
            }
        }

        fn probe(&self, name: &str, deps: &[&str], behaviour: Behaviour) -> PluginDescriptor {
            let log = Arc::clone(&self.log);
            let plugin = name.to_string();
            PluginDescriptor::new(name, move |_config| {
                Ok(Probe {
                    name: plugin.clone(),
                    log: Arc::clone(&log),
                    behaviour: behaviour.clone(),
                })
            })
            .dependencies_from(deps.iter().copied())
        }

        async fn load(&self, name: &str, deps: &[&str]) {
            self.load_with(name, deps, Behaviour::default()).await;
        }

        async fn load_with(&self, name: &str, deps: &[&str], behaviour: Behaviour) {
            self.registry
                .load(self.probe(name, deps, behaviour))
                .await
                .unwrap();
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().clone()
        }
    }

    #[tokio::test]
    async fn test_activate_closure_dependencies_first() {
        let fx = Fixture::new();
        fx.load("app", &["db", "cache"]).await;
        fx.load("cache", &["db"]).await;
        fx.load("db", &[]).await;
        fx.load("unrelated", &["db"]).await;

        let activated = fx.registry.activate("app").await.unwrap();
        assert_eq!(activated, vec!["db", "cache", "app"]);
        assert_eq!(fx.registry.active_names(), vec!["db", "cache", "app"]);
        assert_eq!(fx.registry.state("unrelated"), Some(PluginState::Loaded));

        // Already active: nothing to do.
        assert!(fx.registry.activate("app").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cycle_activates_nothing() {
        let fx = Fixture::new();
        fx.load("root", &["a"]).await;
        fx.load("a", &["b"]).await;
        fx.load("b", &["a"]).await;

        let err = fx.registry.activate("root").await.unwrap_err();
        assert!(matches!(err, ActivateError::CyclicDependency { .. }));
        assert!(fx.registry.active_names().is_empty());
        assert!(fx.log().is_empty());
    }

    #[tokio::test]
    async fn test_missing_dependency_activates_nothing() {
        let fx = Fixture::new();
        fx.load("app", &["db"]).await;
        let err = fx.registry.activate("app").await.unwrap_err();
        match err {
            ActivateError::UnsatisfiedDependency { plugin, missing } => {
                assert_eq!(plugin, "app");
                assert_eq!(missing, vec!["db"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(fx.registry.active_names().is_empty());
        assert!(matches!(
            fx.registry.activate("ghost").await,
            Err(ActivateError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_deactivate_dependents_then_reactivate_only_single() {
        let fx = Fixture::new();
        fx.load("Single", &[]).await;
        fx.load("Parent1", &["Single"]).await;
        fx.load("Parent2", &["Single"]).await;
        fx.load("Other", &[]).await;
        fx.registry.activate("Parent1").await.unwrap();
        fx.registry.activate("Parent2").await.unwrap();
        fx.registry.activate("Other").await.unwrap();

        let down = fx.registry.deactivate("Single").await.unwrap();
        assert_eq!(down, vec!["Parent2", "Parent1", "Single"]);
        assert_eq!(fx.registry.active_names(), vec!["Other"]);
        assert_eq!(fx.registry.state("Parent1"), Some(PluginState::Deactivated));

        let up = fx.registry.activate("Single").await.unwrap();
        assert_eq!(up, vec!["Single"]);
        assert_eq!(fx.registry.active_names(), vec!["Other", "Single"]);
    }

    #[tokio::test]
    async fn test_failed_activation_rolls_back() {
        let fx = Fixture::new();
        fx.load_with(
            "base",
            &[],
            Behaviour {
                commands: vec!["status"],
                timer: true,
                ..Behaviour::default()
            },
        )
        .await;
        fx.load_with(
            "mid",
            &["base"],
            Behaviour {
                commands: vec!["mid"],
                timer: true,
                fail_activate: true,
                ..Behaviour::default()
            },
        )
        .await;
        fx.load("top", &["mid"]).await;

        let err = fx.registry.activate("top").await.unwrap_err();
        match err {
            ActivateError::Activation { plugin, .. } => assert_eq!(plugin, "mid"),
            other => panic!("unexpected {other:?}"),
        }

        assert!(fx.registry.active_names().is_empty());
        assert!(fx.registry.router().is_empty());
        assert!(fx.registry.scheduler().is_empty());
        assert_eq!(fx.registry.state("base"), Some(PluginState::Deactivated));
        assert_eq!(fx.registry.state("top"), Some(PluginState::Loaded));

        let mid = fx.registry.get("mid").unwrap();
        assert_eq!(mid.state, PluginState::Failed);
        assert!(mid.last_error.unwrap().contains("activation refused"));
        assert_eq!(
            fx.log(),
            vec!["activate:base", "activate:mid", "deactivate:mid", "deactivate:base"]
        );
    }

    #[tokio::test]
    async fn test_load_failures_are_recorded() {
        let fx = Fixture::with_configs(HashMap::from([(
            "typed".to_string(),
            json!({ "retries": "many" }),
        )]));

        let broken = PluginDescriptor::new("broken", |_config| {
            Err::<Probe, BoxError>("no database".into())
        });
        let err = fx.registry.load(broken).await.unwrap_err();
        assert!(matches!(err, LoadError::Construction { .. }));
        let snapshot = fx.registry.get("broken").unwrap();
        assert_eq!(snapshot.state, PluginState::Failed);
        assert!(snapshot.last_error.unwrap().contains("no database"));

        let typed = fx
            .probe("typed", &[], Behaviour::default())
            .config_schema(json!({ "retries": 3 }));
        let err = fx.registry.load(typed).await.unwrap_err();
        assert!(matches!(err, LoadError::InvalidConfig { .. }));

        let dup = fx.probe(
            "dup",
            &[],
            Behaviour {
                commands: vec!["x", "x"],
                ..Behaviour::default()
            },
        );
        let err = fx.registry.load(dup).await.unwrap_err();
        assert!(matches!(err, LoadError::DuplicateCommand { ref command, .. } if command == "x"));
    }

    #[tokio::test]
    async fn test_panicking_factory_is_a_load_error() {
        let fx = Fixture::new();
        let descriptor = PluginDescriptor::new("panicky", |_config| -> Result<Probe, BoxError> {
            panic!("factory exploded")
        });
        let err = fx.registry.load(descriptor).await.unwrap_err();
        assert!(err.to_string().contains("factory exploded"));
        assert_eq!(fx.registry.state("panicky"), Some(PluginState::Failed));
    }

    #[tokio::test]
    async fn test_name_in_use_only_while_activated() {
        let fx = Fixture::new();
        fx.load("echo", &[]).await;
        fx.load("echo", &[]).await;
        fx.registry.activate("echo").await.unwrap();

        let err = fx
            .registry
            .load(fx.probe("echo", &[], Behaviour::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::NameInUse(name) if name == "echo"));
    }

    #[tokio::test]
    async fn test_teardown_failures_are_collected() {
        let fx = Fixture::new();
        fx.load_with(
            "base",
            &[],
            Behaviour {
                fail_deactivate: true,
                ..Behaviour::default()
            },
        )
        .await;
        fx.load("user", &["base"]).await;
        fx.registry.activate("user").await.unwrap();

        match fx.registry.deactivate("base").await.unwrap_err() {
            DeactivateError::Teardown {
                deactivated,
                failures,
            } => {
                assert_eq!(deactivated, vec!["user", "base"]);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].plugin, "base");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(fx.registry.active_names().is_empty());
    }

    #[tokio::test]
    async fn test_commands_follow_activation() {
        let fx = Fixture::new();
        let shared = Behaviour {
            commands: vec!["foo"],
            ..Behaviour::default()
        };
        fx.load_with("alpha", &[], shared.clone()).await;
        fx.load_with("beta", &[], shared).await;
        fx.registry.activate("alpha").await.unwrap();
        fx.registry.activate("beta").await.unwrap();

        let router = fx.registry.router();
        let a = router.route(Arc::new(Message::direct("u", "!foo"))).await;
        let b = router.route(Arc::new(Message::direct("u", "!beta-foo"))).await;
        assert_eq!(a[0].text, "alpha:foo");
        assert_eq!(b[0].text, "beta:foo");
        assert_eq!(fx.registry.get("beta").unwrap().commands, vec!["beta-foo"]);

        fx.registry.deactivate("alpha").await.unwrap();
        assert!(router.route(Arc::new(Message::direct("u", "!foo"))).await.is_empty());
    }

    #[tokio::test]
    async fn test_reactivation_builds_fresh_instance() {
        let fx = Fixture::new();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let descriptor = PluginDescriptor::new("fresh", move |_config| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Probe {
                name: "fresh".into(),
                log: Log::default(),
                behaviour: Behaviour::default(),
            })
        });

        fx.registry.load(descriptor).await.unwrap();
        fx.registry.activate("fresh").await.unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 1);

        fx.registry.deactivate("fresh").await.unwrap();
        fx.registry.activate("fresh").await.unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_remove_and_shutdown() {
        let fx = Fixture::new();
        fx.load("a", &[]).await;
        fx.load("b", &["a"]).await;
        fx.registry.activate("b").await.unwrap();

        assert!(matches!(
            fx.registry.remove("a").await,
            Err(RemoveError::Active(_))
        ));

        let down = fx.registry.shutdown().await.unwrap();
        assert_eq!(down, vec!["b", "a"]);
        assert!(fx.registry.remove("b").await.is_ok());
        assert!(!fx.registry.contains("b"));
        assert!(!fx.registry.can_activate("b").0);
        assert!(matches!(
            fx.registry.remove("b").await,
            Err(RemoveError::NotFound(_))
        ));
    }
}
