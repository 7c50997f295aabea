//! Filesystem locations and the legacy INI config.
//!
//! Handles paths for:
//! - the resources dir holding wakatime-cli, logs and cached state
//! - the editor settings store
//! - `~/.wakatime.cfg`, the INI file shared by every WakaTime plugin
//! - `~/.wakatime.conf`, the first-generation plugin's key file

use crate::error::{Result, WakaError};
use fs_err as fs;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

pub const HOME_ENV: &str = "WAKATIME_HOME";
pub const SETTINGS_FILE_NAME: &str = "WakaTime.settings.json";
const STATE_FILE_NAME: &str = "editor-bridge-state.json";

/// Every path the plugin reads or writes, resolved once on load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub home: PathBuf,
    pub resources_dir: PathBuf,
    pub settings_file: PathBuf,
    pub legacy_cfg: PathBuf,
    pub legacy_conf: PathBuf,
    pub state_file: PathBuf,
    pub logs_dir: PathBuf,
}

impl Paths {
    /// Resolves paths from `$WAKATIME_HOME` (falling back to the user's home)
    /// and the platform config dir.
    pub fn discover() -> Result<Self> {
        let home = wakatime_home().ok_or(WakaError::HomeDirNotFound)?;
        let mut paths = Self::with_home(&home);
        if let Some(config_dir) = dirs::config_dir() {
            paths.settings_file = config_dir.join("wakatime").join(SETTINGS_FILE_NAME);
        }
        Ok(paths)
    }

    /// Lays every path out underneath `home`.
    pub fn with_home(home: &Path) -> Self {
        let resources_dir = home.join(".wakatime");
        Self {
            home: home.to_path_buf(),
            settings_file: home.join(".config").join("wakatime").join(SETTINGS_FILE_NAME),
            legacy_cfg: home.join(".wakatime.cfg"),
            legacy_conf: home.join(".wakatime.conf"),
            state_file: resources_dir.join(STATE_FILE_NAME),
            logs_dir: resources_dir.join("logs"),
            resources_dir,
        }
    }

    pub fn with_settings_file(mut self, path: PathBuf) -> Self {
        self.settings_file = path;
        self
    }
}

/// `$WAKATIME_HOME` if set and non-empty, otherwise the user's home dir.
pub fn wakatime_home() -> Option<PathBuf> {
    match env::var(HOME_ENV) {
        Ok(value) if !value.trim().is_empty() => Some(expand_tilde(value.trim())),
        _ => dirs::home_dir(),
    }
}

fn expand_tilde(value: &str) -> PathBuf {
    if let Some(rest) = value.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(value)
}

/// Values read from the `[settings]` section of `~/.wakatime.cfg`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyConfig {
    pub api_key: Option<String>,
    pub proxy: Option<String>,
    pub debug: bool,
}

/// Loads `~/.wakatime.cfg`, returning defaults if it doesn't exist.
pub fn load_legacy_config(path: &Path) -> Result<LegacyConfig> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(LegacyConfig::default())
        }
        Err(err) => return Err(WakaError::io("reading wakatime config", err)),
    };

    let sections = parse_ini(&content).map_err(|details| WakaError::ConfigMalformed {
        path: path.to_path_buf(),
        details,
    })?;

    let settings = match sections.get("settings") {
        Some(settings) => settings,
        None => return Ok(LegacyConfig::default()),
    };

    Ok(LegacyConfig {
        api_key: non_empty(settings.get("api_key")),
        proxy: non_empty(settings.get("proxy")),
        debug: settings
            .get("debug")
            .map(|value| matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false),
    })
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

type IniSections = BTreeMap<String, BTreeMap<String, String>>;

/// Minimal INI reader: `[section]` headers, `key = value` pairs, `#`/`;`
/// comment lines. Keys before the first header land in the "" section.
/// Indented lines continue the previous value, joined with `\n`; other
/// lines without a separator are skipped.
pub fn parse_ini(content: &str) -> std::result::Result<IniSections, String> {
    let mut sections: IniSections = BTreeMap::new();
    let mut current = String::new();
    let mut last_key: Option<String> = None;

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        let indented = raw.starts_with(|c: char| c == ' ' || c == '\t');
        if indented {
            if let Some(key) = &last_key {
                if let Some(value) = sections.get_mut(&current).and_then(|s| s.get_mut(key)) {
                    if !value.is_empty() {
                        value.push('\n');
                    }
                    value.push_str(line);
                    continue;
                }
            }
        }

        if let Some(rest) = line.strip_prefix('[') {
            let name = rest
                .strip_suffix(']')
                .ok_or_else(|| format!("line {}: unterminated section header", index + 1))?;
            current = name.trim().to_string();
            last_key = None;
            sections.entry(current.clone()).or_default();
            continue;
        }

        let Some((key, value)) = line.split_once('=').or_else(|| line.split_once(':')) else {
            tracing::warn!(line = index + 1, "Skipping unparseable line in wakatime.cfg");
            continue;
        };
        let key = key.trim().to_string();
        sections
            .entry(current.clone())
            .or_default()
            .insert(key.clone(), value.trim().to_string());
        last_key = Some(key);
    }

    Ok(sections)
}

/// Reads the `api_key=` line from a first-generation `~/.wakatime.conf`.
pub fn read_legacy_conf_key(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    content.lines().rev().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        if key.trim() == "api_key" {
            non_empty(Some(&value.to_string()))
        } else {
            None
        }
    })
}
