//! The editor-owned settings store.
//!
//! Settings live in a JSON file next to the editor's other preferences. The
//! legacy `~/.wakatime.cfg` is consulted only for values the store leaves
//! unset.

use crate::config::{load_legacy_config, read_legacy_conf_key, LegacyConfig, Paths};
use crate::error::{Result, WakaError};
use fs_err as fs;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

static API_KEY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(waka_)?[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$",
    )
    .expect("api key pattern is valid")
});

pub fn is_valid_api_key(key: &str) -> bool {
    API_KEY_PATTERN.is_match(key.trim())
}

fn default_ignore() -> Vec<String> {
    [
        "^/tmp/",
        "^/etc/",
        "COMMIT_EDITMSG$",
        "PULLREQ_EDITMSG$",
        "MERGE_MSG$",
        "TAG_EDITMSG$",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_true")]
    pub status_bar_enabled: bool,
    #[serde(default = "default_true")]
    pub status_bar_message: bool,
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(default)]
    pub hide_file_names: bool,
    /// Explicit wakatime-cli location; skips discovery when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli_path: Option<String>,
    /// Interpreter for script-based CLIs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_binary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_seconds: Option<f64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            debug: false,
            status_bar_enabled: true,
            status_bar_message: true,
            ignore: default_ignore(),
            include: Vec::new(),
            proxy: None,
            hide_file_names: false,
            cli_path: None,
            python_binary: None,
            buffer_seconds: None,
        }
    }
}

/// Settings after merging the legacy config underneath the store.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveSettings {
    pub settings: Settings,
    pub api_key: Option<String>,
    pub api_key_source: Option<KeySource>,
    pub proxy: Option<String>,
    pub debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    SettingsStore,
    LegacyConfig,
}

impl EffectiveSettings {
    pub fn merge(settings: Settings, legacy: &LegacyConfig) -> Self {
        let (api_key, api_key_source) = match valid_key(settings.api_key.as_deref()) {
            Some(key) => (Some(key), Some(KeySource::SettingsStore)),
            None => match valid_key(legacy.api_key.as_deref()) {
                Some(key) => (Some(key), Some(KeySource::LegacyConfig)),
                None => (None, None),
            },
        };
        let proxy = settings
            .proxy
            .clone()
            .filter(|p| !p.trim().is_empty())
            .or_else(|| legacy.proxy.clone());
        let debug = settings.debug || legacy.debug;

        Self {
            settings,
            api_key,
            api_key_source,
            proxy,
            debug,
        }
    }
}

fn valid_key(candidate: Option<&str>) -> Option<String> {
    candidate
        .map(str::trim)
        .filter(|key| is_valid_api_key(key))
        .map(str::to_string)
}

/// JSON-backed settings persistence.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads settings, returning defaults if the file doesn't exist.
    pub fn load(&self) -> Result<Settings> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Settings::default())
            }
            Err(err) => return Err(WakaError::io("reading settings", err)),
        };

        if content.trim().is_empty() {
            return Ok(Settings::default());
        }

        serde_json::from_str(&content).map_err(|err| WakaError::ConfigMalformed {
            path: self.path.clone(),
            details: err.to_string(),
        })
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        let write_failed = |source: std::io::Error| WakaError::ConfigWriteFailed {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }

        let payload = serde_json::to_vec_pretty(settings)
            .map_err(|err| WakaError::json("serializing settings", err))?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, payload).map_err(write_failed)?;
        fs::rename(&tmp_path, &self.path).map_err(write_failed)?;
        Ok(())
    }

    /// Loads the store and merges `~/.wakatime.cfg` beneath it.
    pub fn load_effective(&self, paths: &Paths) -> Result<EffectiveSettings> {
        let settings = self.load()?;
        let legacy = match load_legacy_config(&paths.legacy_cfg) {
            Ok(legacy) => legacy,
            Err(err) => {
                tracing::warn!(error = %err, "Ignoring unreadable wakatime config");
                LegacyConfig::default()
            }
        };
        Ok(EffectiveSettings::merge(settings, &legacy))
    }

    /// Moves the api key out of a first-generation `~/.wakatime.conf` into
    /// the store and deletes the old file. Returns true if a key moved.
    pub fn migrate_legacy_conf(&self, conf_path: &Path) -> Result<bool> {
        if !conf_path.exists() {
            return Ok(false);
        }

        let mut settings = self.load()?;
        let has_key = settings
            .api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false);
        let migrated = match read_legacy_conf_key(conf_path) {
            Some(key) if !has_key => {
                settings.api_key = Some(key);
                self.save(&settings)?;
                true
            }
            _ => false,
        };

        if let Err(err) = fs::remove_file(conf_path) {
            tracing::debug!(error = %err, "Could not remove legacy conf file");
        }
        Ok(migrated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "waka_3f2c6a4e-1b2d-4c3e-8f9a-0b1c2d3e4f5a";

    #[test]
    fn validates_api_keys() {
        assert!(is_valid_api_key(KEY));
        assert!(is_valid_api_key("3F2C6A4E-1B2D-4C3E-8F9A-0B1C2D3E4F5A"));
        assert!(!is_valid_api_key(""));
        assert!(!is_valid_api_key("not-a-key"));
        // version nibble must be 4
        assert!(!is_valid_api_key("3f2c6a4e-1b2d-5c3e-8f9a-0b1c2d3e4f5a"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = SettingsStore::new(temp_dir.path().join("s.json"));
        let settings = store.load().expect("load");
        assert_eq!(settings, Settings::default());
        assert!(settings.ignore.iter().any(|p| p == "COMMIT_EDITMSG$"));
    }

    #[test]
    fn save_then_load_preserves_values() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = SettingsStore::new(temp_dir.path().join("nested").join("s.json"));
        let settings = Settings {
            api_key: Some(KEY.to_string()),
            debug: true,
            include: vec![".*\\.rs$".to_string()],
            ..Settings::default()
        };
        store.save(&settings).expect("save");
        assert_eq!(store.load().expect("load"), settings);
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[test]
    fn malformed_file_is_reported() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("s.json");
        fs::write(&path, "{ nope").expect("write");
        let err = SettingsStore::new(path).load().unwrap_err();
        assert!(matches!(err, WakaError::ConfigMalformed { .. }));
    }

    #[test]
    fn store_key_takes_precedence_over_legacy() {
        let legacy = LegacyConfig {
            api_key: Some("waka_00000000-0000-4000-8000-000000000000".to_string()),
            proxy: Some("http://legacy:1".to_string()),
            debug: true,
        };
        let settings = Settings {
            api_key: Some(KEY.to_string()),
            ..Settings::default()
        };
        let effective = EffectiveSettings::merge(settings, &legacy);
        assert_eq!(effective.api_key.as_deref(), Some(KEY));
        assert_eq!(effective.api_key_source, Some(KeySource::SettingsStore));
        assert_eq!(effective.proxy.as_deref(), Some("http://legacy:1"));
        assert!(effective.debug);
    }

    #[test]
    fn invalid_store_key_falls_back_to_legacy() {
        let legacy = LegacyConfig {
            api_key: Some(KEY.to_string()),
            ..LegacyConfig::default()
        };
        let settings = Settings {
            api_key: Some("garbage".to_string()),
            ..Settings::default()
        };
        let effective = EffectiveSettings::merge(settings, &legacy);
        assert_eq!(effective.api_key_source, Some(KeySource::LegacyConfig));
    }

    #[test]
    fn migrates_first_generation_conf() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let conf = temp_dir.path().join(".wakatime.conf");
        fs::write(&conf, format!("api_key={KEY}\n")).expect("write");
        let store = SettingsStore::new(temp_dir.path().join("s.json"));

        assert!(store.migrate_legacy_conf(&conf).expect("migrate"));
        assert!(!conf.exists());
        assert_eq!(store.load().expect("load").api_key.as_deref(), Some(KEY));
        assert!(!store.migrate_legacy_conf(&conf).expect("second run"));
    }
}
