//! Downloading and updating wakatime-cli from its GitHub releases.

use crate::cache::{load_cache, save_cache, CliCache};
use crate::error::{Result, WakaError};
use crate::locator::{archive_name, platform_arch, platform_os, stable_link_path, versioned_binary_name};
use chrono::Utc;
use fs_err as fs;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const RELEASES_API_URL: &str =
    "https://api.github.com/repos/wakatime/wakatime-cli/releases/latest";
pub const DOWNLOAD_BASE_URL: &str = "https://github.com/wakatime/wakatime-cli/releases/download";
const HTTP_TIMEOUT_SECS: u64 = 60;

static VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"v?(\d+\.\d+\.\d+(?:-[0-9A-Za-z.]+)?)").expect("version pattern is valid")
});

/// Normalizes `wakatime-cli v1.2.3`, `1.2.3` and `v1.2.3` to `v1.2.3`.
pub fn parse_version(raw: &str) -> Option<String> {
    VERSION_PATTERN
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| format!("v{}", m.as_str()))
}

/// Asks an installed binary for its version.
pub fn installed_version(cli: &Path) -> Option<String> {
    let output = Command::new(cli)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .ok()?;
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    parse_version(&text)
}

/// Provisions the tool; implementations may block on the network.
pub trait CliInstaller: Send + Sync {
    fn install(&self) -> Result<PathBuf>;
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

#[derive(Debug, Clone)]
pub struct GithubInstaller {
    resources_dir: PathBuf,
    state_file: PathBuf,
    proxy: Option<String>,
    user_agent: String,
    api_url: String,
    download_base: String,
}

impl GithubInstaller {
    pub fn new(resources_dir: &Path, state_file: &Path, user_agent: impl Into<String>) -> Self {
        Self {
            resources_dir: resources_dir.to_path_buf(),
            state_file: state_file.to_path_buf(),
            proxy: None,
            user_agent: user_agent.into(),
            api_url: RELEASES_API_URL.to_string(),
            download_base: DOWNLOAD_BASE_URL.to_string(),
        }
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy.filter(|p| !p.trim().is_empty());
        self
    }

    fn client(&self) -> Result<reqwest::blocking::Client> {
        let mut builder = reqwest::blocking::Client::builder()
            .user_agent(self.user_agent.clone())
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS));
        if let Some(proxy) = &self.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str()).map_err(|source| WakaError::Network {
                url: proxy.clone(),
                source,
            })?;
            builder = builder.proxy(proxy);
        }
        builder.build().map_err(|source| WakaError::Network {
            url: self.api_url.clone(),
            source,
        })
    }

    fn latest_tag(&self, client: &reqwest::blocking::Client) -> Result<String> {
        let network = |source| WakaError::Network {
            url: self.api_url.clone(),
            source,
        };
        let release: Release = client
            .get(&self.api_url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.json())
            .map_err(network)?;
        parse_version(&release.tag_name)
            .ok_or_else(|| WakaError::VersionUnparsable(release.tag_name.clone()))
    }

    fn download(&self, client: &reqwest::blocking::Client, tag: &str, archive: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{}/{}", self.download_base, tag, archive);
        info!(url = %url, "Downloading wakatime-cli");
        let bytes = client
            .get(&url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.bytes())
            .map_err(|source| WakaError::Network {
                url: url.clone(),
                source,
            })?;
        Ok(bytes.to_vec())
    }
}

impl CliInstaller for GithubInstaller {
    fn install(&self) -> Result<PathBuf> {
        let (os, arch) = (platform_os()?, platform_arch()?);
        let binary_name = versioned_binary_name(os, arch);
        let target = self.resources_dir.join(&binary_name);
        let now = Utc::now();
        let mut cache = load_cache(&self.state_file);

        if target.is_file() && !cache.version_check_due(now) {
            debug!(path = %target.display(), "wakatime-cli checked recently; skipping update");
            return Ok(target);
        }

        let client = self.client()?;
        let latest = match self.latest_tag(&client) {
            Ok(tag) => tag,
            Err(err) if target.is_file() => {
                warn!(error = %err, "Version check failed; keeping installed wakatime-cli");
                return Ok(target);
            }
            Err(err) => return Err(err),
        };
        cache.record_version_check(now, &latest);

        let current = if target.is_file() {
            installed_version(&target)
        } else {
            None
        };

        if current.as_deref() != Some(latest.as_str()) {
            info!(current = ?current, latest = %latest, "Installing wakatime-cli");
            let archive = self.download(&client, &latest, &archive_name(os, arch))?;
            extract_cli(&archive, &binary_name, &self.resources_dir)?;
            if let Err(err) = link_stable(&self.resources_dir, &target) {
                warn!(error = %err, "Failed to link wakatime-cli");
            }
        }

        record_location(&mut cache, &target);
        if let Err(err) = save_cache(&self.state_file, &cache) {
            warn!(error = %err, "Failed to persist cli cache");
        }
        Ok(target)
    }
}

fn record_location(cache: &mut CliCache, target: &Path) {
    cache.cli_path = Some(target.to_string_lossy().to_string());
}

/// Pulls `binary_name` out of a release archive into `dest_dir`.
///
/// The archive must contain the platform's binary at its root; anything else
/// means the download is not the release asset we asked for.
pub fn extract_cli(archive: &[u8], binary_name: &str, dest_dir: &Path) -> Result<PathBuf> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|err| WakaError::ArchiveInvalid(err.to_string()))?;
    let mut entry = zip
        .by_name(binary_name)
        .map_err(|err| WakaError::ArchiveInvalid(format!("{}: {}", binary_name, err)))?;

    let mut contents = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut contents)
        .map_err(|err| WakaError::ArchiveInvalid(format!("{}: {}", binary_name, err)))?;
    if contents.is_empty() {
        return Err(WakaError::ArchiveInvalid(format!("{} is empty", binary_name)));
    }

    fs::create_dir_all(dest_dir).map_err(|err| WakaError::io("creating resources dir", err))?;
    let target = dest_dir.join(binary_name);
    let tmp_path = target.with_extension("download");
    fs::write(&tmp_path, &contents).map_err(|err| WakaError::io("writing wakatime-cli", err))?;
    make_executable(&tmp_path)?;
    fs::rename(&tmp_path, &target).map_err(|err| WakaError::io("installing wakatime-cli", err))?;
    Ok(target)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|err| WakaError::io("marking wakatime-cli executable", err))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Points `<resources>/wakatime-cli` at the versioned binary so other
/// WakaTime plugins and shells share one install.
pub fn link_stable(resources_dir: &Path, target: &Path) -> Result<()> {
    let link = stable_link_path(resources_dir);
    if link.symlink_metadata().is_ok() {
        fs::remove_file(&link).map_err(|err| WakaError::io("removing old cli link", err))?;
    }

    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, &link)
            .map_err(|err| WakaError::io("linking wakatime-cli", err))
    }
    #[cfg(not(unix))]
    {
        fs::copy(target, &link)
            .map(|_| ())
            .map_err(|err| WakaError::io("copying wakatime-cli", err))
    }
}
