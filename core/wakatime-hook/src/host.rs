//! `Host` implementation that writes protocol commands as JSON lines.

use parking_lot::Mutex;
use std::io::Write;
use wakatime_core::{Host, TrackingStatus};
use wakatime_editor_protocol::{HostCommand, StatusKind};

pub struct LineHost<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> LineHost<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn send(&self, command: &HostCommand) {
        let line = match serde_json::to_string(command) {
            Ok(line) => line,
            Err(err) => {
                tracing::error!(error = %err, "Failed to encode host command");
                return;
            }
        };

        let mut out = self.out.lock();
        if let Err(err) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            // The editor went away; stdin EOF will end the session.
            tracing::warn!(error = %err, "Failed to write host command");
        }
    }
}

impl<W: Write + Send> Host for LineHost<W> {
    fn set_status(&self, status: TrackingStatus, message: Option<&str>) {
        self.send(&HostCommand::SetStatus {
            status: status_kind(status),
            message: message.map(str::to_string),
        });
    }

    fn prompt_api_key(&self, message: &str) {
        self.send(&HostCommand::PromptApiKey {
            message: message.to_string(),
        });
    }

    fn show_error(&self, message: &str) {
        self.send(&HostCommand::ErrorMessage {
            message: message.to_string(),
        });
    }
}

fn status_kind(status: TrackingStatus) -> StatusKind {
    match status {
        TrackingStatus::Ok => StatusKind::Ok,
        TrackingStatus::Error => StatusKind::Error,
        TrackingStatus::Unconfigured => StatusKind::Unconfigured,
        TrackingStatus::Downloading => StatusKind::Downloading,
    }
}
