//! `status`: where settings, key and wakatime-cli were resolved from.

use serde::Serialize;
use std::path::{Path, PathBuf};
use wakatime_core::cache::load_cache;
use wakatime_core::cli::mask_key;
use wakatime_core::install::installed_version;
use wakatime_core::settings::{EffectiveSettings, KeySource};
use wakatime_core::{CliLocator, Paths, SettingsStore, WakaError};

#[derive(Debug, Serialize)]
struct StatusReport {
    settings_file: PathBuf,
    settings_found: bool,
    api_key: Option<String>,
    api_key_source: Option<&'static str>,
    cli: Option<PathBuf>,
    cli_error: Option<String>,
    cached_cli: Option<PathBuf>,
    installed_version: Option<String>,
    latest_version: Option<String>,
    last_version_check: Option<String>,
    logs_dir: PathBuf,
}

pub(crate) fn load_settings(paths: &Paths) -> Result<EffectiveSettings, String> {
    let store = SettingsStore::new(paths.settings_file.clone());
    Ok(store.load_effective(paths)?)
}

pub fn run(paths: &Paths) -> Result<(), String> {
    let report = build_report(paths)?;
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| format!("Failed to encode status: {}", e))?;
    println!("{}", json);
    Ok(())
}

fn build_report(paths: &Paths) -> Result<StatusReport, String> {
    let settings = load_settings(paths)?;

    let located = CliLocator::new(&paths.resources_dir)
        .with_cli_override(settings.settings.cli_path.as_deref())
        .with_python_override(settings.settings.python_binary.as_deref())
        .locate();
    let (cli, cli_error) = match located {
        Ok(command) => (Some(cli_path(&command.program, &command.prefix_args)), None),
        Err(WakaError::CliNotFound) => (None, None),
        Err(err) => (None, Some(err.to_string())),
    };

    let cache = load_cache(&paths.state_file);
    let installed = cli.as_deref().and_then(installed_version);

    Ok(StatusReport {
        settings_file: paths.settings_file.clone(),
        settings_found: paths.settings_file.is_file(),
        api_key: settings.api_key.as_deref().map(mask_key),
        api_key_source: settings.api_key_source.map(|source| match source {
            KeySource::SettingsStore => "settings",
            KeySource::LegacyConfig => "wakatime.cfg",
        }),
        cli,
        cli_error,
        cached_cli: cache.cached_cli_path(),
        installed_version: installed,
        latest_version: cache.latest_version,
        last_version_check: cache.last_version_check,
        logs_dir: paths.logs_dir.clone(),
    })
}

/// Script installs run through an interpreter; report the script itself.
fn cli_path(program: &Path, prefix_args: &[String]) -> PathBuf {
    prefix_args
        .first()
        .map(PathBuf::from)
        .unwrap_or_else(|| program.to_path_buf())
}
