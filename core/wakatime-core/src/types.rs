//! Shared data types for heartbeats and editor state.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PLUGIN_NAME: &str = "sublime-wakatime";
pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A single activity event destined for wakatime-cli.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub entity: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub is_write: bool,
    pub cursorpos: Option<u64>,
    pub lineno: Option<u64>,
    pub lines_in_file: Option<u64>,
    pub project: Option<String>,
    pub alternate_project: Option<String>,
}

/// The most recently recorded heartbeat, kept only for debounce comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct LastHeartbeat {
    pub entity: String,
    pub timestamp: f64,
    pub is_write: bool,
}

impl From<&Heartbeat> for LastHeartbeat {
    fn from(heartbeat: &Heartbeat) -> Self {
        Self {
            entity: heartbeat.entity.clone(),
            timestamp: heartbeat.timestamp,
            is_write: heartbeat.is_write,
        }
    }
}

/// Indicator the host renders (status bar or equivalent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    Ok,
    Error,
    Unconfigured,
    Downloading,
}

impl TrackingStatus {
    /// Status bar text shown when `status_bar_message` is on.
    pub fn message(self) -> &'static str {
        match self {
            TrackingStatus::Ok => "WakaTime: OK",
            TrackingStatus::Error => "WakaTime: Error",
            TrackingStatus::Unconfigured => "WakaTime: API key needed",
            TrackingStatus::Downloading => "WakaTime: Downloading wakatime-cli",
        }
    }
}

/// What the host reports about the view an event happened in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewSnapshot {
    /// `None` for buffers that were never saved to disk.
    pub file_name: Option<String>,
    pub cursor_pos: Option<u64>,
    pub lineno: Option<u64>,
    pub lines_in_file: Option<u64>,
    pub folders: Vec<String>,
    pub project_name: Option<String>,
}

impl ViewSnapshot {
    pub fn for_file(path: impl Into<String>) -> Self {
        Self {
            file_name: Some(path.into()),
            ..Self::default()
        }
    }
}

/// Identifies the editor and plugin to wakatime-cli.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorInfo {
    pub editor_name: String,
    pub editor_version: String,
    pub plugin_name: String,
    pub plugin_version: String,
}

impl EditorInfo {
    pub fn new(editor_name: impl Into<String>, editor_version: impl Into<String>) -> Self {
        Self {
            editor_name: editor_name.into(),
            editor_version: editor_version.into(),
            plugin_name: DEFAULT_PLUGIN_NAME.to_string(),
            plugin_version: PLUGIN_VERSION.to_string(),
        }
    }

    /// Value for `--plugin`, e.g. `Sublime Text/4169 sublime-wakatime/0.3.0`.
    pub fn user_agent(&self) -> String {
        format!(
            "{}/{} {}/{}",
            self.editor_name, self.editor_version, self.plugin_name, self.plugin_version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_joins_editor_and_plugin() {
        let mut info = EditorInfo::new("Sublime Text", "4169");
        info.plugin_version = "11.0.0".to_string();
        assert_eq!(info.user_agent(), "Sublime Text/4169 sublime-wakatime/11.0.0");
    }

    #[test]
    fn last_heartbeat_copies_debounce_fields() {
        let heartbeat = Heartbeat {
            entity: "/a.rs".to_string(),
            timestamp: 12.5,
            is_write: true,
            cursorpos: Some(4),
            lineno: None,
            lines_in_file: None,
            project: None,
            alternate_project: None,
        };
        let last = LastHeartbeat::from(&heartbeat);
        assert_eq!(last.entity, "/a.rs");
        assert_eq!(last.timestamp, 12.5);
        assert!(last.is_write);
    }
}
