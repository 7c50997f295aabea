//! wakatime-cli invocation: argv construction, process spawning and exit
//! code classification.

use crate::error::{Result, WakaError};
use crate::types::{Heartbeat, TrackingStatus};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Exit codes wakatime-cli uses when it deliberately skipped sending:
/// 102 = api unreachable (heartbeat kept in its offline queue),
/// 112 = rate limited.
pub const ACCEPTED_EXIT_CODES: [i32; 2] = [102, 112];

/// How to start the tool: the binary itself, or an interpreter plus script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliCommand {
    pub program: PathBuf,
    pub prefix_args: Vec<String>,
}

impl CliCommand {
    pub fn binary(program: PathBuf) -> Self {
        Self {
            program,
            prefix_args: Vec::new(),
        }
    }

    pub fn script(interpreter: PathBuf, script: PathBuf) -> Self {
        Self {
            program: interpreter,
            prefix_args: vec![script.to_string_lossy().to_string()],
        }
    }
}

/// Flags shared by every invocation in a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationOptions {
    pub plugin: String,
    pub api_key: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub proxy: Option<String>,
    pub verbose: bool,
    pub hide_file_names: bool,
}

/// Shape wakatime-cli expects for each element of `--extra-heartbeats`.
#[derive(Debug, Serialize, PartialEq)]
struct ExtraHeartbeat<'a> {
    entity: &'a str,
    #[serde(rename = "type")]
    entity_type: &'static str,
    timestamp: f64,
    is_write: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    lineno: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursorpos: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lines: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    project: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alternate_project: Option<&'a str>,
}

impl<'a> From<&'a Heartbeat> for ExtraHeartbeat<'a> {
    fn from(heartbeat: &'a Heartbeat) -> Self {
        Self {
            entity: &heartbeat.entity,
            entity_type: "file",
            timestamp: heartbeat.timestamp,
            is_write: heartbeat.is_write,
            lineno: heartbeat.lineno,
            cursorpos: heartbeat.cursorpos,
            lines: heartbeat.lines_in_file,
            project: heartbeat.project.as_deref(),
            alternate_project: heartbeat.alternate_project.as_deref(),
        }
    }
}

/// A fully built command line, ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// JSON array of extra heartbeats, written to stdin.
    pub stdin: Option<String>,
}

impl CliInvocation {
    pub fn build(
        command: &CliCommand,
        primary: &Heartbeat,
        extras: &[Heartbeat],
        options: &InvocationOptions,
    ) -> Result<Self> {
        let mut args = command.prefix_args.clone();
        let mut push = |flag: &str, value: String| {
            args.push(flag.to_string());
            args.push(value);
        };

        push("--entity", primary.entity.clone());
        push("--time", format!("{:.6}", primary.timestamp));
        push("--plugin", options.plugin.clone());
        push("--key", options.api_key.clone());
        if let Some(project) = &primary.project {
            push("--project", project.clone());
        }
        if let Some(alternate) = &primary.alternate_project {
            push("--alternate-project", alternate.clone());
        }
        if let Some(cursorpos) = primary.cursorpos {
            push("--cursorpos", cursorpos.to_string());
        }
        if let Some(lineno) = primary.lineno {
            push("--lineno", lineno.to_string());
        }
        if let Some(lines) = primary.lines_in_file {
            push("--lines-in-file", lines.to_string());
        }
        for pattern in &options.include {
            push("--include", pattern.clone());
        }
        for pattern in &options.exclude {
            push("--exclude", pattern.clone());
        }
        if let Some(proxy) = &options.proxy {
            push("--proxy", proxy.clone());
        }

        if primary.is_write {
            args.push("--write".to_string());
        }
        if options.hide_file_names {
            args.push("--hide-file-names".to_string());
        }
        if options.verbose {
            args.push("--verbose".to_string());
        }

        let stdin = if extras.is_empty() {
            None
        } else {
            args.push("--extra-heartbeats".to_string());
            let payload: Vec<ExtraHeartbeat<'_>> = extras.iter().map(ExtraHeartbeat::from).collect();
            Some(
                serde_json::to_string(&payload)
                    .map_err(|err| WakaError::json("serializing extra heartbeats", err))?,
            )
        };

        Ok(Self {
            program: command.program.clone(),
            args,
            stdin,
        })
    }

    /// Command line for logs, with the api key masked.
    pub fn redacted(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        let mut mask_next = false;
        for arg in &self.args {
            if mask_next {
                parts.push(mask_key(arg));
                mask_next = false;
            } else {
                mask_next = arg == "--key";
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }
}

/// Keeps only the last four characters of an api key.
pub fn mask_key(key: &str) -> String {
    let tail: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXX{}", tail)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOutput {
    /// `None` when the process died from a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliOutcome {
    Success,
    /// Non-zero but recognized code; not an error.
    Skipped(i32),
    Failed { code: Option<i32>, output: String },
}

impl CliOutcome {
    pub fn classify(output: &CliOutput) -> Self {
        let combined = format!("{}{}", output.stdout.trim(), output.stderr.trim());
        match output.exit_code {
            Some(0) if combined.is_empty() => CliOutcome::Success,
            Some(code) if ACCEPTED_EXIT_CODES.contains(&code) && combined.is_empty() => {
                CliOutcome::Skipped(code)
            }
            code => CliOutcome::Failed {
                code,
                output: combined,
            },
        }
    }

    pub fn status(&self) -> TrackingStatus {
        match self {
            CliOutcome::Success | CliOutcome::Skipped(_) => TrackingStatus::Ok,
            CliOutcome::Failed { .. } => TrackingStatus::Error,
        }
    }
}

/// Seam between batching and process spawning.
pub trait CliRunner: Send + Sync {
    fn run(&self, invocation: &CliInvocation) -> Result<CliOutput>;
}

/// Runs wakatime-cli as a child process, blocking the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

impl CliRunner for ProcessRunner {
    fn run(&self, invocation: &CliInvocation) -> Result<CliOutput> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let spawn_failed = |source| WakaError::SpawnFailed {
            command: invocation.program.display().to_string(),
            source,
        };
        let mut child = command.spawn().map_err(spawn_failed)?;

        if let (Some(payload), Some(mut stdin)) = (&invocation.stdin, child.stdin.take()) {
            let written = stdin
                .write_all(payload.as_bytes())
                .and_then(|_| stdin.write_all(b"\n"));
            drop(stdin);
            if let Err(err) = written {
                // Reap the child even though its extra heartbeats were lost.
                match child.wait() {
                    Ok(status) => tracing::warn!(code = ?status.code(), "wakatime-cli exited before reading stdin"),
                    Err(wait_err) => tracing::warn!(error = %wait_err, "Failed to reap wakatime-cli"),
                }
                return Err(WakaError::io("writing extra heartbeats", err));
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|err| WakaError::io("waiting for wakatime-cli", err))?;

        Ok(CliOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
