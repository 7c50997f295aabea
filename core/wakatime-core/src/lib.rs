//! # wakatime-core
//!
//! Editor-side half of WakaTime: turns editor activity callbacks into
//! heartbeats and hands them to `wakatime-cli`, which owns queueing,
//! offline storage and the API.
//!
//! ## Design Principles
//!
//! - **Host-agnostic**: the editor is reached only through [`Host`] and
//!   drives the plugin only through [`EventListener`].
//! - **Never blocks the editor**: process spawning, downloads and the flush
//!   timer live on worker threads.
//! - **Graceful degradation**: every failure ends in "not tracking" plus a
//!   status indicator, never an error surfaced to the editor's main loop.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wakatime_core::{EditorInfo, EventListener, Paths, ViewSnapshot, WakaTimePlugin};
//!
//! let plugin = WakaTimePlugin::builder(EditorInfo::new("Sublime Text", "4169"), Paths::discover()?, host)
//!     .build();
//! plugin.load()?;
//! plugin.on_post_save(&ViewSnapshot::for_file("/src/main.rs"));
//! plugin.unload();
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod debounce;
pub mod dispatcher;
pub mod error;
pub mod install;
pub mod lifecycle;
pub mod locator;
pub mod patterns;
pub mod plugin;
pub mod project;
pub mod settings;
pub mod types;

pub use cli::{CliCommand, CliInvocation, CliOutcome, CliOutput, CliRunner, ProcessRunner};
pub use config::Paths;
pub use debounce::{should_send, DebounceConfig, Decision};
pub use dispatcher::{Batch, DispatchState};
pub use error::{Result, WakaError};
pub use install::{CliInstaller, GithubInstaller};
pub use lifecycle::LifecycleState;
pub use locator::CliLocator;
pub use plugin::{Clock, EventListener, Host, PluginBuilder, SystemClock, WakaTimePlugin};
pub use settings::{Settings, SettingsStore};
pub use types::*;
