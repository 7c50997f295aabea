//! `install`: foreground download or update of wakatime-cli.

use crate::status::load_settings;
use std::path::PathBuf;
use wakatime_core::{CliInstaller, EditorInfo, GithubInstaller, Paths};

/// Installs or updates wakatime-cli in the foreground.
pub fn run(paths: &Paths) -> Result<PathBuf, String> {
    let settings = load_settings(paths)?;
    let editor = EditorInfo::new("wakatime-hook", env!("CARGO_PKG_VERSION"));
    let installer = GithubInstaller::new(&paths.resources_dir, &paths.state_file, editor.user_agent())
        .with_proxy(settings.proxy);

    let path = installer.install()?;
    tracing::info!(path = %path.display(), "wakatime-cli installed");
    Ok(path)
}
