//! Editor session loop.
//!
//! ```text
//! activated / modified / selection_modified / post_save → EventListener
//! api_key            → provide_api_key (re-prompts when invalid)
//! settings_changed   → reload_settings
//! unload or EOF      → unload (flushes pending heartbeats)
//! ```

use crate::host::LineHost;
use std::io::{self, BufRead, ErrorKind};
use std::sync::Arc;
use wakatime_core::{EditorInfo, EventListener, Paths, ViewSnapshot, WakaTimePlugin};
use wakatime_editor_protocol::{parse_event, EventKind, HostEvent, ViewPayload};

pub fn run(paths: Paths, editor_name: &str, editor_version: &str) -> Result<(), String> {
    let host = Arc::new(LineHost::new(io::stdout()));
    let plugin =
        WakaTimePlugin::builder(EditorInfo::new(editor_name, editor_version), paths, host).build();
    plugin.load()?;

    let stdin = io::stdin();
    serve(&plugin, stdin.lock())
}

/// Feeds events until `unload` or end of input, then unloads.
pub fn serve<R: BufRead>(plugin: &WakaTimePlugin, input: R) -> Result<(), String> {
    let result = read_events(plugin, input);
    plugin.unload();
    result
}

fn read_events<R: BufRead>(plugin: &WakaTimePlugin, input: R) -> Result<(), String> {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) if err.kind() == ErrorKind::InvalidData => {
                tracing::warn!(error = %err, "Skipping non UTF-8 event line");
                continue;
            }
            Err(err) => return Err(format!("Failed to read stdin: {}", err)),
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_event(&line) {
            Ok(event) => {
                if !handle_event(plugin, event) {
                    break;
                }
            }
            Err(err) => {
                tracing::warn!(code = %err.code, message = %err.message, "Skipping malformed event");
            }
        }
    }
    Ok(())
}

/// Returns false when the session should end.
fn handle_event(plugin: &WakaTimePlugin, event: HostEvent) -> bool {
    tracing::debug!(event = ?event.event, "Host event");

    match event.event {
        EventKind::Activated => with_view(event, |view| plugin.on_activated(view)),
        EventKind::Modified => with_view(event, |view| plugin.on_modified(view)),
        EventKind::SelectionModified => {
            with_view(event, |view| plugin.on_selection_modified(view))
        }
        EventKind::PostSave => with_view(event, |view| plugin.on_post_save(view)),
        EventKind::ApiKey => {
            let key = event.api_key.unwrap_or_default();
            if let Err(err) = plugin.provide_api_key(&key) {
                tracing::warn!(error = %err, "Rejected api key");
            }
        }
        EventKind::SettingsChanged => plugin.reload_settings(),
        EventKind::Unload => return false,
    }
    true
}

fn with_view(event: HostEvent, f: impl FnOnce(&ViewSnapshot)) {
    if let Some(view) = event.view {
        f(&snapshot(view));
    }
}

fn snapshot(view: ViewPayload) -> ViewSnapshot {
    ViewSnapshot {
        file_name: view.file_name,
        cursor_pos: view.cursor_pos,
        lineno: view.lineno,
        lines_in_file: view.lines_in_file,
        folders: view.folders,
        project_name: view.project_name,
    }
}
