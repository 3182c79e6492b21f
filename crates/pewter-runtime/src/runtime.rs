//! Main runtime orchestration.
//!
//! [`PewterRuntime`] wires the framework together: it owns the command router,
//! the scheduler, the plugin registry and the worker pool, loads plugins from
//! the configured sources and turns inbound messages into replies.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use pewter_runtime::PewterRuntime;
//!
//! let runtime = PewterRuntime::builder()
//!     .config_file("pewter.toml")
//!     .source(LinkedSource::all())
//!     .backend(Arc::new(MyBackend::connect().await?))
//!     .build()?;
//!
//! // Feed messages from the chat network:
//! runtime.handle_message(message);
//!
//! runtime.run().await?;
//! ```
//!
//! # Lifecycle
//!
//! `start` loads the built-in plugins and every source, replays the persisted
//! activation state, activates `startup.activate` and spawns the scheduler
//! loop. `shutdown` stops the scheduler, drains in-flight handlers, persists
//! the active set and deactivates every plugin.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::json;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, info, warn};

use pewter_core::{
    AccessFilter, BoxedBackend, BuiltinRenderer, Message, Outbox, Renderer, Reply, templates,
};
use pewter_framework::error::{ActivateResult, DeactivateResult, LoadResult};
use pewter_framework::{
    Clock, CommandRouter, DeactivateError, Executor, MatchResult, PluginDescriptor,
    PluginRegistry, PluginSnapshot, PluginSource, Scheduler, StaticSource, SystemClock,
};

use crate::acl::AclFilter;
use crate::builtin::{help_descriptor, plugins_descriptor};
use crate::config::{ConfigLoader, PewterConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::state::{MemoryStateStore, StateStore};

/// The Pewter runtime.
pub struct PewterRuntime {
    config: PewterConfig,
    router: Arc<CommandRouter>,
    scheduler: Arc<Scheduler>,
    registry: PluginRegistry,
    executor: Executor,
    outbox: Outbox,
    sources: Vec<Box<dyn PluginSource>>,
    state: Arc<dyn StateStore>,
    builtins: bool,
    shutdown: CancellationToken,
    scheduler_task: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl PewterRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from a loaded configuration with default
    /// collaborators and no plugin sources.
    pub fn from_config(config: PewterConfig) -> RuntimeResult<Arc<Self>> {
        RuntimeBuilder::new().config(config).build()
    }

    pub fn config(&self) -> &PewterConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<CommandRouter> {
        &self.router
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Loads plugins, restores the activation state and starts the scheduler.
    ///
    /// Plugins that fail to load or activate are logged and skipped; only a
    /// second call fails.
    pub async fn start(self: &Arc<Self>) -> RuntimeResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyRunning);
        }
        info!("Starting Pewter runtime");

        if self.builtins {
            let builtins = StaticSource::new()
                .with(help_descriptor(Arc::downgrade(&self.router)))
                .with(plugins_descriptor(Arc::downgrade(self)));
            self.registry.load_from(&builtins).await;
        }
        for source in &self.sources {
            let failures = self.registry.load_from(source.as_ref()).await;
            if !failures.is_empty() {
                warn!(failed = failures.len(), "Some plugins failed to load");
            }
        }

        let persisted = self.state.load_active().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load activation state, starting empty");
            Vec::new()
        });
        let wanted = persisted.iter().chain(&self.config.startup.activate);
        for name in wanted {
            if let Err(e) = self.registry.activate(name).await {
                warn!(plugin = %name, error = %e, "Failed to activate plugin at startup");
            }
        }
        self.persist();

        let loop_task = tokio::spawn(Arc::clone(&self.scheduler).run(self.shutdown.child_token()));
        *self.scheduler_task.lock() = Some(loop_task);

        info!(
            active = ?self.registry.active_names(),
            commands = self.router.len(),
            "Runtime started"
        );
        Ok(())
    }

    /// Stops the scheduler, drains the worker pool, persists the active set
    /// and deactivates every plugin.
    pub async fn shutdown(&self) -> RuntimeResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Runtime is not running");
            return Ok(());
        }
        info!("Stopping Pewter runtime");

        self.shutdown.cancel();
        let loop_task = self.scheduler_task.lock().take();
        if let Some(task) = loop_task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Scheduler loop ended abnormally");
        }
        self.executor.shutdown().await;

        self.persist();
        if let Err(e) = self.registry.shutdown().await {
            warn!(error = %e, "Some plugins failed to tear down");
        }

        info!("Runtime stopped");
        Ok(())
    }

    /// Starts, waits for Ctrl+C or SIGTERM, then shuts down.
    pub async fn run(self: &Arc<Self>) -> RuntimeResult<()> {
        self.start().await?;
        info!("Pewter runtime is now running. Press Ctrl+C to stop.");
        let waited = wait_for_shutdown().await;
        self.shutdown().await?;
        waited
    }

    /// Starts, waits for `shutdown`, then shuts down.
    pub async fn run_until<F>(self: &Arc<Self>, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.shutdown().await
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Matches `message` on the calling task, then dispatches it on the worker
    /// pool and delivers the replies through the backend.
    ///
    /// The message is matched against the command table as it is on arrival,
    /// so busy handlers never hold up matching.
    pub fn handle_message(self: &Arc<Self>, message: Message) -> JoinHandle<()> {
        let message = Arc::new(message);
        let span = dispatch_span(&message);
        let result = span.in_scope(|| self.router.match_message(&message));

        let runtime = Arc::clone(self);
        self.executor.spawn(
            async move {
                let replies = runtime.dispatch(result, message).await;
                runtime.outbox.deliver(replies).await;
            }
            .instrument(span),
        )
    }

    /// Matches and dispatches `message` on the current task, returning the
    /// replies.
    pub async fn process_message(&self, message: Message) -> Vec<Reply> {
        let message = Arc::new(message);
        let span = dispatch_span(&message);
        let result = span.in_scope(|| self.router.match_message(&message));
        self.dispatch(result, message).instrument(span).await
    }

    async fn dispatch(&self, result: MatchResult, message: Arc<Message>) -> Vec<Reply> {
        if result.is_no_match() {
            return self.unknown_command(&message);
        }
        self.router.dispatch(result, message).await
    }

    fn unknown_command(&self, message: &Message) -> Vec<Reply> {
        if !self.config.bot.reply_unknown_command {
            return Vec::new();
        }
        let Some(command) = self.router.matcher().attempted_command(message) else {
            return Vec::new();
        };
        debug!(command = %command, "Unknown command");
        let text = self.router.render(
            templates::UNKNOWN_COMMAND,
            json!({ "command": command }),
            || format!("Command \"{command}\" not found."),
        );
        vec![message.reply(text)]
    }

    /// Classifies `message` without dispatching it.
    pub fn match_message(&self, message: &Message) -> MatchResult {
        self.router.match_message(message)
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Loads (or replaces) a plugin.
    pub async fn load(&self, descriptor: PluginDescriptor) -> LoadResult<PluginSnapshot> {
        self.registry.load(descriptor).await
    }

    /// Activates `name` with its dependencies and persists the active set.
    pub async fn activate(&self, name: &str) -> ActivateResult<Vec<String>> {
        let activated = self.registry.activate(name).await?;
        if !activated.is_empty() {
            self.persist();
        }
        Ok(activated)
    }

    /// Deactivates `name` with its dependents and persists the active set.
    pub async fn deactivate(&self, name: &str) -> DeactivateResult<Vec<String>> {
        let result = self.registry.deactivate(name).await;
        if !matches!(result, Err(DeactivateError::NotFound(_))) {
            self.persist();
        }
        result
    }

    /// Activated plugins in activation order.
    pub fn list_active(&self) -> Vec<String> {
        self.registry.active_names()
    }

    pub fn plugins(&self) -> Vec<PluginSnapshot> {
        self.registry.list()
    }

    pub fn plugin(&self, name: &str) -> Option<PluginSnapshot> {
        self.registry.get(name)
    }

    fn persist(&self) {
        let active = self.registry.active_names();
        match self.state.save_active(&active) {
            Ok(()) => debug!(active = ?active, "Activation state saved"),
            Err(e) => warn!(error = %e, "Failed to save activation state"),
        }
    }
}

impl std::fmt::Debug for PewterRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PewterRuntime")
            .field("running", &self.is_running())
            .field("registry", &self.registry)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

fn dispatch_span(message: &Message) -> tracing::Span {
    debug_span!("dispatch", sender = %message.sender, room = ?message.room)
}

/// Waits for Ctrl+C or SIGTERM.
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(RuntimeError::Signal)?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.map_err(RuntimeError::Signal)?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.map_err(RuntimeError::Signal)?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`PewterRuntime`].
///
/// ```rust,ignore
/// let runtime = PewterRuntime::builder()
///     .profile("production")
///     .plugin(weather_descriptor())
///     .state_store(Arc::new(MyStore::open("state.json")?))
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<PewterConfig>,
    sources: Vec<Box<dyn PluginSource>>,
    plugins: StaticSource,
    backend: Option<BoxedBackend>,
    access: Option<Arc<dyn AccessFilter>>,
    renderer: Option<Arc<dyn Renderer>>,
    state: Option<Arc<dyn StateStore>>,
    clock: Option<Arc<dyn Clock>>,
    builtins: bool,
    init_logging: bool,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            config: None,
            sources: Vec::new(),
            plugins: StaticSource::new(),
            backend: None,
            access: None,
            renderer: None,
            state: None,
            clock: None,
            builtins: true,
            init_logging: true,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: PewterConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Uses `config` as is, skipping every configuration source.
    pub fn config(mut self, config: PewterConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Adds a plugin source consulted at startup.
    pub fn source(mut self, source: impl PluginSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Adds a single plugin descriptor.
    pub fn plugin(mut self, descriptor: PluginDescriptor) -> Self {
        self.plugins.push(descriptor);
        self
    }

    /// Attaches the chat backend replies and plugin messages go through.
    pub fn backend(mut self, backend: BoxedBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Replaces the configuration-driven [`AclFilter`].
    pub fn access_filter(mut self, access: Arc<dyn AccessFilter>) -> Self {
        self.access = Some(access);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Where the activated plugin set is persisted. Defaults to memory.
    pub fn state_store(mut self, state: Arc<dyn StateStore>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Leaves out the `help` and `plugins` plugins.
    pub fn without_builtins(mut self) -> Self {
        self.builtins = false;
        self
    }

    /// Leaves the global tracing subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Loads the configuration and assembles the runtime.
    pub fn build(self) -> RuntimeResult<Arc<PewterRuntime>> {
        let config = match self.config {
            Some(config) => {
                validate_config(&config)?;
                config
            }
            None => self.config_loader.load()?,
        };

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let access = self
            .access
            .unwrap_or_else(|| Arc::new(AclFilter::new(&config.access)));
        let renderer = self.renderer.unwrap_or_else(|| Arc::new(BuiltinRenderer));
        let router = Arc::new(
            CommandRouter::new(config.bot.to_router_config())
                .with_access_filter(access)
                .with_renderer(renderer),
        );

        let executor = Executor::new(config.bot.max_concurrent_handlers);
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let scheduler = Arc::new(
            Scheduler::new(clock, executor.clone()).with_tick(config.scheduler.tick()),
        );

        let outbox = self.backend.map(Outbox::new).unwrap_or_default();
        let registry = PluginRegistry::new(Arc::clone(&router), Arc::clone(&scheduler))
            .with_outbox(outbox.clone())
            .with_plugin_configs(config.plugins.clone());

        let mut sources = self.sources;
        sources.push(Box::new(self.plugins));

        info!(
            log_level = %config.logging.level,
            prefix = %config.bot.prefix,
            workers = executor.limit(),
            "Runtime initialized from configuration"
        );

        Ok(Arc::new(PewterRuntime {
            config,
            router,
            scheduler,
            registry,
            executor,
            outbox,
            sources,
            state: self
                .state
                .unwrap_or_else(|| Arc::new(MemoryStateStore::new())),
            builtins: self.builtins,
            shutdown: CancellationToken::new(),
            scheduler_task: Mutex::new(None),
            running: AtomicBool::new(false),
        }))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
