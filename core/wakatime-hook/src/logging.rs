//! File logging for the hook. Stdout carries the editor protocol, so nothing
//! may be logged there.

use std::env;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use wakatime_core::{Paths, SettingsStore};

const DEBUG_ENV: &str = "WAKATIME_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "wakatime-hook.log";

/// Installs the global subscriber. The guard must live until exit so the
/// background writer drains.
pub fn init(paths: &Paths) -> Option<WorkerGuard> {
    let filter = if debug_enabled(paths) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if let Err(err) = fs_err::create_dir_all(&paths.logs_dir) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        tracing::warn!(error = %err, "Log directory unavailable; logging to stderr");
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(&paths.logs_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    Some(guard)
}

fn debug_enabled(paths: &Paths) -> bool {
    let from_env = env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    from_env
        || SettingsStore::new(paths.settings_file.clone())
            .load_effective(paths)
            .map(|settings| settings.debug)
            .unwrap_or(false)
}
