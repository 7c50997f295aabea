//! The plugin context: what the host constructs on load, feeds editor
//! callbacks into, and tears down on unload.
//!
//! ## Flow
//!
//! ```text
//! host callback → filter → debounce → dispatcher queue → (window) → wakatime-cli
//!                                                               ↓
//!                                                     Host::set_status
//! ```
//!
//! All mutable state (settings, last heartbeat, lifecycle, tool location)
//! sits behind one coarse lock. Host methods are never called with it held.

use crate::cli::{CliCommand, CliInvocation, CliOutcome, CliRunner, InvocationOptions, ProcessRunner};
use crate::config::Paths;
use crate::debounce::DebounceConfig;
use crate::dispatcher::{Batch, BatchSink, DispatchState, Dispatcher, DEFAULT_BUFFER_WINDOW};
use crate::error::{Result, WakaError};
use crate::install::{CliInstaller, GithubInstaller};
use crate::lifecycle::{Effect, Lifecycle, LifecycleEvent, LifecycleState};
use crate::locator::{install_path, CliLocator};
use crate::patterns::EntityFilter;
use crate::project::resolve_project;
use crate::settings::{is_valid_api_key, EffectiveSettings, Settings, SettingsStore};
use crate::types::{EditorInfo, Heartbeat, LastHeartbeat, TrackingStatus, ViewSnapshot};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const API_KEY_PROMPT: &str = "Enter your wakatime.com api key:";
pub const INVALID_API_KEY_PROMPT: &str = "Invalid api key. Enter your wakatime.com api key:";

/// Callbacks the editor invokes on activity.
pub trait EventListener {
    fn on_post_save(&self, view: &ViewSnapshot);
    fn on_activated(&self, view: &ViewSnapshot);
    fn on_modified(&self, view: &ViewSnapshot);
    fn on_selection_modified(&self, view: &ViewSnapshot);
}

/// What the plugin asks of the editor. Implementations must not block.
pub trait Host: Send + Sync {
    /// `message` is `None` when the user turned status text off.
    fn set_status(&self, status: TrackingStatus, message: Option<&str>);
    fn prompt_api_key(&self, message: &str);
    fn show_error(&self, message: &str);
}

pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now(&self) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }
}

struct Shared {
    settings: EffectiveSettings,
    filter: EntityFilter,
    last: Option<LastHeartbeat>,
    lifecycle: Lifecycle,
    cli: Option<CliCommand>,
}

struct Core {
    editor: EditorInfo,
    paths: Paths,
    store: SettingsStore,
    debounce: DebounceConfig,
    host: Arc<dyn Host>,
    clock: Arc<dyn Clock>,
    runner: Arc<dyn CliRunner>,
    installer: Arc<dyn CliInstaller>,
    state: Mutex<Shared>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

pub struct PluginBuilder {
    editor: EditorInfo,
    paths: Paths,
    host: Arc<dyn Host>,
    debounce: DebounceConfig,
    buffer_window: Option<Duration>,
    clock: Arc<dyn Clock>,
    runner: Arc<dyn CliRunner>,
    installer: Option<Arc<dyn CliInstaller>>,
}

impl PluginBuilder {
    pub fn debounce(mut self, debounce: DebounceConfig) -> Self {
        self.debounce = debounce;
        self
    }

    /// Overrides both the default and the `buffer_seconds` setting.
    pub fn buffer_window(mut self, window: Duration) -> Self {
        self.buffer_window = Some(window);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn runner(mut self, runner: Arc<dyn CliRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn installer(mut self, installer: Arc<dyn CliInstaller>) -> Self {
        self.installer = Some(installer);
        self
    }

    pub fn build(self) -> WakaTimePlugin {
        let store = SettingsStore::new(self.paths.settings_file.clone());
        let installer = self.installer.unwrap_or_else(|| {
            let proxy = store
                .load_effective(&self.paths)
                .ok()
                .and_then(|settings| settings.proxy);
            Arc::new(
                GithubInstaller::new(
                    &self.paths.resources_dir,
                    &self.paths.state_file,
                    self.editor.user_agent(),
                )
                .with_proxy(proxy),
            )
        });

        let core = Core {
            editor: self.editor,
            paths: self.paths,
            store,
            debounce: self.debounce,
            host: self.host,
            clock: self.clock,
            runner: self.runner,
            installer,
            state: Mutex::new(Shared {
                settings: EffectiveSettings::merge(Settings::default(), &Default::default()),
                filter: EntityFilter::default(),
                last: None,
                lifecycle: Lifecycle::new(),
                cli: None,
            }),
            background: Mutex::new(Vec::new()),
        };

        WakaTimePlugin {
            core: Arc::new(core),
            dispatcher: Mutex::new(None),
            buffer_window: self.buffer_window,
        }
    }
}

pub struct WakaTimePlugin {
    core: Arc<Core>,
    dispatcher: Mutex<Option<Dispatcher>>,
    buffer_window: Option<Duration>,
}

impl WakaTimePlugin {
    pub fn builder(editor: EditorInfo, paths: Paths, host: Arc<dyn Host>) -> PluginBuilder {
        PluginBuilder {
            editor,
            paths,
            host,
            debounce: DebounceConfig::default(),
            buffer_window: None,
            clock: Arc::new(SystemClock),
            runner: Arc::new(ProcessRunner),
            installer: None,
        }
    }

    /// Reads settings, locates the tool, starts the dispatcher and kicks off
    /// any download or prompt the current configuration needs.
    pub fn load(&self) -> Result<()> {
        match self.core.store.migrate_legacy_conf(&self.core.paths.legacy_conf) {
            Ok(true) => info!("Migrated api key from legacy conf file"),
            Ok(false) => {}
            Err(err) => warn!(error = %err, "Legacy conf migration failed"),
        }

        self.core.refresh_settings();
        let window = self.buffer_window(&self.core.state.lock().settings.settings);
        let dispatcher = Dispatcher::spawn(window, Arc::clone(&self.core) as Arc<dyn BatchSink>)?;
        *self.dispatcher.lock() = Some(dispatcher);

        let located = self.core.locate();
        let (effects, update_in_place) = {
            let mut state = self.core.state.lock();
            let has_api_key = state.settings.api_key.is_some();
            let (cli_present, update_in_place, unavailable) = match located {
                Ok(command) => {
                    let managed = install_path(&self.core.paths.resources_dir)
                        .map(|path| path == command.program)
                        .unwrap_or(false);
                    state.cli = Some(command);
                    (true, managed, None)
                }
                Err(WakaError::CliNotFound) => (false, false, None),
                Err(err) => (true, false, Some(err.to_string())),
            };

            let mut effects = state.lifecycle.apply(LifecycleEvent::Loaded {
                has_api_key,
                cli_present,
            });
            if let Some(reason) = unavailable {
                effects.extend(state.lifecycle.apply(LifecycleEvent::ToolUnavailable { reason }));
            }
            (effects, update_in_place)
        };

        info!(
            editor = %self.core.editor.user_agent(),
            state = ?self.state(),
            buffer_secs = window.as_secs_f64(),
            "WakaTime plugin loaded"
        );

        // Report before effects so a fast install thread's status is last.
        let status = self.state().status();
        self.core.report_status(status);
        Core::run_effects(&self.core, effects);
        if update_in_place {
            Core::spawn_install(&self.core);
        }
        Ok(())
    }

    fn buffer_window(&self, settings: &Settings) -> Duration {
        self.buffer_window
            .or_else(|| {
                settings
                    .buffer_seconds
                    .filter(|secs| secs.is_finite() && *secs >= 0.0)
                    .map(Duration::from_secs_f64)
            })
            .unwrap_or(DEFAULT_BUFFER_WINDOW)
    }

    /// Flushes pending heartbeats and stops the worker.
    pub fn unload(&self) {
        if let Some(dispatcher) = self.dispatcher.lock().take() {
            dispatcher.shutdown();
        }
        self.core.state.lock().last = None;
        info!("WakaTime plugin unloaded");
    }

    /// Validates and stores a key entered by the user.
    pub fn provide_api_key(&self, key: &str) -> Result<()> {
        let key = key.trim();
        if !is_valid_api_key(key) {
            self.core.host.prompt_api_key(INVALID_API_KEY_PROMPT);
            return Err(WakaError::InvalidApiKey);
        }

        let mut settings = self.core.store.load()?;
        settings.api_key = Some(key.to_string());
        self.core.store.save(&settings)?;
        info!("Saved api key");

        self.reload_settings();
        Ok(())
    }

    /// Re-reads settings after the user edited them.
    ///
    /// Key and tool overrides apply immediately; `buffer_seconds` is read
    /// when the dispatcher starts, so a changed window waits for the next
    /// `load()`.
    pub fn reload_settings(&self) {
        let (before, had_key) = {
            let state = self.core.state.lock();
            (state.settings.settings.clone(), state.settings.api_key.is_some())
        };
        self.core.refresh_settings();
        let after = self.core.state.lock().settings.settings.clone();

        if after.cli_path != before.cli_path || after.python_binary != before.python_binary {
            match self.core.locate() {
                Ok(command) => {
                    info!(program = %command.program.display(), "Re-located wakatime-cli");
                    self.core.state.lock().cli = Some(command);
                }
                Err(err) => warn!(error = %err, "Keeping previous wakatime-cli after settings change"),
            }
        }
        if after.buffer_seconds != before.buffer_seconds {
            info!("buffer_seconds changed; takes effect on next load");
        }

        let effects = {
            let mut state = self.core.state.lock();
            match (had_key, state.settings.api_key.is_some()) {
                (false, true) => state.lifecycle.apply(LifecycleEvent::ApiKeyProvided),
                (true, false) => {
                    warn!("API key removed or invalid; tracking paused");
                    state.lifecycle.apply(LifecycleEvent::ApiKeyRemoved)
                }
                _ => Vec::new(),
            }
        };
        // Status first so the prompt is the last thing the host sees.
        let status = self.state().status();
        self.core.report_status(status);
        Core::run_effects(&self.core, effects);
    }

    pub fn state(&self) -> LifecycleState {
        self.core.state.lock().lifecycle.state()
    }

    pub fn dispatch_state(&self) -> DispatchState {
        self.dispatcher
            .lock()
            .as_ref()
            .map(Dispatcher::state)
            .unwrap_or(DispatchState::Idle)
    }

    pub fn last_heartbeat(&self) -> Option<LastHeartbeat> {
        self.core.state.lock().last.clone()
    }

    /// Sends queued heartbeats now instead of at the end of the window.
    pub fn flush(&self) -> Result<()> {
        match self.dispatcher.lock().as_ref() {
            Some(dispatcher) => dispatcher.flush_now(),
            None => Err(WakaError::DispatcherClosed),
        }
    }

    /// Blocks until background downloads started so far have finished.
    pub fn wait_for_background(&self) {
        let handles: Vec<JoinHandle<()>> = self.core.background.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                error!("Background install thread panicked");
            }
        }
    }

    fn handle_activity(&self, view: &ViewSnapshot, is_write: bool) {
        let entity = match view.file_name.as_deref().map(str::trim) {
            Some(entity) if !entity.is_empty() => entity,
            _ => return,
        };
        let now = self.core.clock.now();

        let heartbeat = {
            let mut state = self.core.state.lock();
            if !state.lifecycle.is_ready() {
                debug!(state = ?state.lifecycle.state(), "Skipping activity; plugin not ready");
                return;
            }
            if !state.filter.should_track(entity) {
                debug!(entity, "Skipping ignored entity");
                return;
            }

            let decision = self
                .core
                .debounce
                .decide(state.last.as_ref(), entity, now, is_write);
            if !decision.is_send() {
                return;
            }

            let project = resolve_project(entity, &view.folders, view.project_name.as_deref());
            let heartbeat = Heartbeat {
                entity: entity.to_string(),
                timestamp: now,
                is_write,
                cursorpos: view.cursor_pos,
                lineno: view.lineno,
                lines_in_file: view.lines_in_file,
                project: project.project,
                alternate_project: project.alternate_project,
            };
            state.last = Some(LastHeartbeat::from(&heartbeat));
            debug!(entity, is_write, reason = ?decision, "Queued heartbeat");
            heartbeat
        };

        match self.dispatcher.lock().as_ref() {
            Some(dispatcher) => {
                if let Err(err) = dispatcher.enqueue(heartbeat) {
                    warn!(error = %err, "Failed to queue heartbeat");
                }
            }
            None => debug!("Dropping heartbeat; plugin not loaded"),
        }
    }
}

impl EventListener for WakaTimePlugin {
    fn on_post_save(&self, view: &ViewSnapshot) {
        self.handle_activity(view, true);
    }

    fn on_activated(&self, view: &ViewSnapshot) {
        self.handle_activity(view, false);
    }

    fn on_modified(&self, view: &ViewSnapshot) {
        self.handle_activity(view, false);
    }

    fn on_selection_modified(&self, view: &ViewSnapshot) {
        self.handle_activity(view, false);
    }
}

impl Drop for WakaTimePlugin {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.get_mut().take() {
            dispatcher.shutdown();
        }
    }
}

impl Core {
    fn refresh_settings(&self) {
        let effective = match self.store.load_effective(&self.paths) {
            Ok(effective) => effective,
            Err(err) => {
                warn!(error = %err, "Failed to load settings; using defaults");
                EffectiveSettings::merge(Settings::default(), &Default::default())
            }
        };
        let filter = EntityFilter::new(&effective.settings.include, &effective.settings.ignore);

        let mut state = self.state.lock();
        state.filter = filter;
        state.settings = effective;
    }

    fn locator(&self) -> CliLocator {
        let state = self.state.lock();
        CliLocator::new(&self.paths.resources_dir)
            .with_cli_override(state.settings.settings.cli_path.as_deref())
            .with_python_override(state.settings.settings.python_binary.as_deref())
    }

    fn locate(&self) -> Result<CliCommand> {
        self.locator().locate()
    }

    fn run_effects(core: &Arc<Core>, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::PromptApiKey => core.host.prompt_api_key(API_KEY_PROMPT),
                Effect::StartDownload => Core::spawn_install(core),
                Effect::ShowFatal(reason) => {
                    error!(reason = %reason, "WakaTime cannot run");
                    core.host.show_error(&format!("WakaTime Error: {}", reason));
                }
            }
        }
    }

    /// Installs or updates wakatime-cli off the editor thread.
    fn spawn_install(core: &Arc<Core>) {
        let worker = Arc::clone(core);
        let spawned = thread::Builder::new()
            .name("wakatime-install".to_string())
            .spawn(move || worker.install_blocking());
        match spawned {
            Ok(handle) => core.background.lock().push(handle),
            Err(err) => warn!(error = %err, "Failed to spawn install thread"),
        }
    }

    fn install_blocking(self: &Arc<Self>) {
        let event = match self.installer.install() {
            Ok(path) => {
                info!(path = %path.display(), "wakatime-cli ready");
                match self.locate() {
                    Ok(command) => {
                        self.state.lock().cli = Some(command);
                        LifecycleEvent::DownloadSucceeded
                    }
                    Err(WakaError::CliNotFound) => LifecycleEvent::DownloadFailed {
                        reason: format!("installed cli not found at {}", path.display()),
                    },
                    Err(err) => LifecycleEvent::ToolUnavailable {
                        reason: err.to_string(),
                    },
                }
            }
            Err(err) => LifecycleEvent::DownloadFailed {
                reason: err.to_string(),
            },
        };

        let (effects, status) = {
            let mut state = self.state.lock();
            let effects = state.lifecycle.apply(event);
            (effects, state.lifecycle.state().status())
        };
        Core::run_effects(self, effects);
        self.report_status(status);
    }

    fn report_status(&self, status: TrackingStatus) {
        let (enabled, with_message) = {
            let state = self.state.lock();
            (
                state.settings.settings.status_bar_enabled,
                state.settings.settings.status_bar_message,
            )
        };
        if enabled {
            let message = with_message.then(|| status.message());
            self.host.set_status(status, message);
        }
    }

    fn invocation_options(&self, settings: &EffectiveSettings, api_key: &str) -> InvocationOptions {
        InvocationOptions {
            plugin: self.editor.user_agent(),
            api_key: api_key.to_string(),
            include: settings.settings.include.clone(),
            exclude: settings.settings.ignore.clone(),
            proxy: settings.proxy.clone(),
            verbose: settings.debug,
            hide_file_names: settings.settings.hide_file_names,
        }
    }
}

impl BatchSink for Core {
    fn send_batch(&self, batch: Batch) {
        let prepared = {
            let state = self.state.lock();
            match (&state.cli, &state.settings.api_key) {
                (Some(command), Some(key)) => {
                    Some((command.clone(), self.invocation_options(&state.settings, key)))
                }
                _ => None,
            }
        };
        let (command, options) = match prepared {
            Some(prepared) => prepared,
            None => {
                warn!(heartbeats = batch.len(), "Dropping batch; wakatime-cli or api key missing");
                return;
            }
        };

        let invocation = match CliInvocation::build(&command, &batch.primary, &batch.extras, &options)
        {
            Ok(invocation) => invocation,
            Err(err) => {
                error!(error = %err, "Failed to build wakatime-cli command");
                self.report_status(TrackingStatus::Error);
                return;
            }
        };
        debug!(command = %invocation.redacted(), heartbeats = batch.len(), "Running wakatime-cli");

        let outcome = match self.runner.run(&invocation) {
            Ok(output) => CliOutcome::classify(&output),
            Err(err) => CliOutcome::Failed {
                code: None,
                output: err.to_string(),
            },
        };

        match &outcome {
            CliOutcome::Success => debug!("wakatime-cli succeeded"),
            CliOutcome::Skipped(code) => debug!(code, "wakatime-cli skipped sending"),
            CliOutcome::Failed { code, output } => {
                error!(code = ?code, output = %output, "wakatime-cli failed")
            }
        }
        self.report_status(outcome.status());
    }
}
