//! Cached tool location and version-check bookkeeping.
//!
//! Lets a plugin load skip the GitHub round trip when the last check is
//! recent.

use chrono::{DateTime, Duration, Utc};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const VERSION_CHECK_INTERVAL_HOURS: i64 = 24;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliCache {
    #[serde(default)]
    pub cli_path: Option<String>,
    #[serde(default)]
    pub last_version_check: Option<String>,
    #[serde(default)]
    pub latest_version: Option<String>,
}

impl CliCache {
    pub fn version_check_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_version_check.as_deref().and_then(parse_timestamp) {
            Some(checked_at) => {
                now.signed_duration_since(checked_at) >= Duration::hours(VERSION_CHECK_INTERVAL_HOURS)
            }
            None => true,
        }
    }

    pub fn record_version_check(&mut self, now: DateTime<Utc>, latest: &str) {
        self.last_version_check = Some(now.to_rfc3339());
        self.latest_version = Some(latest.to_string());
    }

    pub fn cached_cli_path(&self) -> Option<PathBuf> {
        self.cli_path
            .as_deref()
            .map(PathBuf::from)
            .filter(|path| path.is_file())
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Loads the cache; unreadable or corrupt state falls back to defaults.
pub fn load_cache(path: &Path) -> CliCache {
    match read_cache(path) {
        Ok(cache) => cache,
        Err(err) => {
            warn!(error = %err, "Discarding unreadable cli cache");
            CliCache::default()
        }
    }
}

fn read_cache(path: &Path) -> Result<CliCache, String> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(CliCache::default()),
        Err(err) => return Err(format!("Failed to read cli cache: {}", err)),
    };

    serde_json::from_slice(&data).map_err(|err| format!("Failed to parse cli cache: {}", err))
}

pub fn save_cache(path: &Path, cache: &CliCache) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("Failed to create cli cache dir: {}", err))?;
    }

    let payload = serde_json::to_vec_pretty(cache)
        .map_err(|err| format!("Failed to serialize cli cache: {}", err))?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, payload).map_err(|err| format!("Failed to write cli cache: {}", err))?;
    fs::rename(&tmp_path, path).map_err(|err| format!("Failed to commit cli cache: {}", err))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_due_without_history() {
        assert!(CliCache::default().version_check_due(Utc::now()));
    }

    #[test]
    fn recent_check_is_not_due() {
        let now = Utc::now();
        let mut cache = CliCache::default();
        cache.record_version_check(now - Duration::hours(3), "v1.90.0");
        assert!(!cache.version_check_due(now));
        assert_eq!(cache.latest_version.as_deref(), Some("v1.90.0"));
    }

    #[test]
    fn stale_check_is_due() {
        let now = Utc::now();
        let mut cache = CliCache::default();
        cache.record_version_check(now - Duration::hours(VERSION_CHECK_INTERVAL_HOURS + 1), "v1");
        assert!(cache.version_check_due(now));
    }

    #[test]
    fn corrupt_timestamp_counts_as_due() {
        let cache = CliCache {
            last_version_check: Some("yesterday".to_string()),
            ..CliCache::default()
        };
        assert!(cache.version_check_due(Utc::now()));
    }

    #[test]
    fn save_and_load() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("state").join("cache.json");
        let cache = CliCache {
            cli_path: Some("/x/wakatime-cli".to_string()),
            ..CliCache::default()
        };
        save_cache(&path, &cache).expect("save");
        assert_eq!(load_cache(&path), cache);
    }

    #[test]
    fn corrupt_file_loads_defaults() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("cache.json");
        fs::write(&path, "{{{").expect("write");
        assert_eq!(load_cache(&path), CliCache::default());
    }
}
