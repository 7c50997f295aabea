//! Wire types and validation for the editor ↔ wakatime-hook channel.
//!
//! The editor-side shim writes one [`HostEvent`] per line to the hook's
//! stdin and reads one [`HostCommand`] per line from its stdout. Both sides
//! share this crate to prevent schema drift; the hook remains the authority
//! on validation.

use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_LINE_BYTES: usize = 1024 * 1024; // 1MB

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum EventKind {
    Activated,
    Modified,
    SelectionModified,
    PostSave,
    ApiKey,
    SettingsChanged,
    Unload,
}

impl EventKind {
    /// Events that describe activity in a view and therefore carry one.
    pub fn is_view_event(self) -> bool {
        matches!(
            self,
            EventKind::Activated
                | EventKind::Modified
                | EventKind::SelectionModified
                | EventKind::PostSave
        )
    }
}

/// Snapshot of the active view as the editor sees it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ViewPayload {
    /// Absent for scratch buffers that were never saved.
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub cursor_pos: Option<u64>,
    #[serde(default)]
    pub lineno: Option<u64>,
    #[serde(default)]
    pub lines_in_file: Option<u64>,
    #[serde(default)]
    pub folders: Vec<String>,
    #[serde(default)]
    pub project_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HostEvent {
    pub event: EventKind,
    #[serde(default)]
    pub protocol_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<ViewPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl HostEvent {
    pub fn view(event: EventKind, view: ViewPayload) -> Self {
        Self {
            event,
            protocol_version: Some(PROTOCOL_VERSION),
            view: Some(view),
            api_key: None,
        }
    }

    pub fn validate(&self) -> Result<(), ErrorInfo> {
        if let Some(version) = self.protocol_version {
            if version != PROTOCOL_VERSION {
                return Err(ErrorInfo::new(
                    "unsupported_protocol",
                    format!(
                        "protocol_version {} is not supported (expected {})",
                        version, PROTOCOL_VERSION
                    ),
                ));
            }
        }

        match self.event {
            kind if kind.is_view_event() => {
                if self.view.is_none() {
                    return Err(ErrorInfo::new("missing_field", "view is required"));
                }
            }
            EventKind::ApiKey => require_string(&self.api_key, "api_key")?,
            _ => {}
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Ok,
    Error,
    Unconfigured,
    Downloading,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum HostCommand {
    SetStatus {
        status: StatusKind,
        /// Status bar text; absent when the user disabled it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    PromptApiKey { message: String },
    ErrorMessage { message: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

pub fn parse_event(line: &str) -> Result<HostEvent, ErrorInfo> {
    if line.len() > MAX_LINE_BYTES {
        return Err(ErrorInfo::new(
            "line_too_large",
            format!("event line exceeds {} bytes", MAX_LINE_BYTES),
        ));
    }

    let event: HostEvent = serde_json::from_str(line).map_err(|err| {
        ErrorInfo::new("invalid_json", format!("event line is invalid JSON: {}", err))
    })?;
    event.validate()?;
    Ok(event)
}

fn require_string(value: &Option<String>, field: &str) -> Result<(), ErrorInfo> {
    if let Some(candidate) = value {
        if !candidate.trim().is_empty() {
            return Ok(());
        }
    }
    Err(ErrorInfo::new(
        "missing_field",
        format!("{} is required", field),
    ))
}
