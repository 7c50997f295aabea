use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use wakatime_editor_protocol::{HostCommand, StatusKind};

const KEY: &str = "waka_3f2c6a4e-1b2d-4c3e-8f9a-0b1c2d3e4f5a";

fn hook(home: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_wakatime-hook"));
    command
        .env("HOME", home)
        .env("WAKATIME_HOME", home)
        .env_remove("WAKATIME_DEBUG_LOG")
        .env_remove("RUST_LOG");
    command
}

fn settings_file(home: &Path) -> PathBuf {
    home.join("WakaTime.settings.json")
}

fn write_settings(home: &Path, settings: serde_json::Value) {
    fs_err::write(settings_file(home), settings.to_string()).expect("settings");
}

fn listen(home: &Path, input: &str) -> Output {
    let mut child = hook(home)
        .arg("--settings")
        .arg(settings_file(home))
        .args(["listen", "--editor-version", "4169"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn wakatime-hook");

    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(input.as_bytes())
        .expect("write events");
    child.wait_with_output().expect("wait")
}

fn commands(output: &Output) -> Vec<HostCommand> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("host command"))
        .collect()
}

fn placeholder_cli(home: &Path) -> PathBuf {
    let cli = home.join("placeholder-cli");
    fs_err::write(&cli, "").expect("cli");
    cli
}

#[test]
fn listen_without_key_prompts_for_one() {
    let home = tempfile::tempdir().expect("temp dir");
    let cli = placeholder_cli(home.path());
    write_settings(home.path(), serde_json::json!({ "cli_path": cli }));

    let output = listen(home.path(), "");
    assert!(output.status.success());

    let commands = commands(&output);
    assert!(commands
        .iter()
        .any(|c| matches!(c, HostCommand::PromptApiKey { .. })));
    assert!(commands.contains(&HostCommand::SetStatus {
        status: StatusKind::Unconfigured,
        message: Some("WakaTime: API key needed".to_string()),
    }));
}

#[test]
fn api_key_event_is_persisted() {
    let home = tempfile::tempdir().expect("temp dir");
    let cli = placeholder_cli(home.path());
    write_settings(
        home.path(),
        serde_json::json!({ "cli_path": cli, "status_bar_message": false }),
    );

    let input = format!("{{\"event\":\"api_key\",\"api_key\":\"{}\"}}\n", KEY);
    let output = listen(home.path(), &input);
    assert!(output.status.success());

    assert_eq!(
        commands(&output).last(),
        Some(&HostCommand::SetStatus {
            status: StatusKind::Ok,
            message: None,
        })
    );
    let saved: serde_json::Value =
        serde_json::from_str(&fs_err::read_to_string(settings_file(home.path())).expect("read"))
            .expect("json");
    assert_eq!(saved["api_key"], KEY);
}

#[test]
fn status_reports_resolved_locations() {
    let home = tempfile::tempdir().expect("temp dir");
    let cli = placeholder_cli(home.path());
    write_settings(home.path(), serde_json::json!({ "api_key": KEY, "cli_path": cli }));

    let output = hook(home.path())
        .arg("--settings")
        .arg(settings_file(home.path()))
        .arg("status")
        .output()
        .expect("run status");
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(report["settings_found"], true);
    assert_eq!(report["api_key_source"], "settings");
    assert_eq!(report["cli"], cli.to_string_lossy().as_ref());
}

#[test]
fn malformed_settings_fail_status() {
    let home = tempfile::tempdir().expect("temp dir");
    fs_err::write(settings_file(home.path()), "{ not json").expect("settings");

    let output = hook(home.path())
        .arg("--settings")
        .arg(settings_file(home.path()))
        .arg("status")
        .output()
        .expect("run status");
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[cfg(unix)]
mod with_fake_cli {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn recording_cli(home: &Path) -> PathBuf {
        let cli = home.join("wakatime-cli");
        let body = format!(
            "#!/bin/sh\nprintf '%s\\n' \"$@\" >> \"{args}\"\ncat >> \"{stdin}\"\nexit 0\n",
            args = home.join("args.txt").display(),
            stdin = home.join("stdin.txt").display(),
        );
        fs_err::write(&cli, body).expect("script");
        fs_err::set_permissions(&cli, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        cli
    }

    #[test]
    fn session_heartbeats_are_flushed_on_unload() {
        let home = tempfile::tempdir().expect("temp dir");
        let cli = recording_cli(home.path());
        write_settings(home.path(), serde_json::json!({ "api_key": KEY, "cli_path": cli }));

        let input = concat!(
            "{\"event\":\"activated\",\"view\":{\"file_name\":\"/work/a.rs\",\"lineno\":1}}\n",
            "{\"event\":\"modified\",\"view\":{\"file_name\":\"/work/a.rs\"}}\n",
            "garbage\n",
            "{\"event\":\"post_save\",\"view\":{\"file_name\":\"/work/a.rs\"}}\n",
            "{\"event\":\"activated\",\"view\":{\"file_name\":\"/work/b.rs\",\"folders\":[\"/work\"]}}\n",
            "{\"event\":\"unload\"}\n",
        );
        let output = listen(home.path(), input);
        assert!(output.status.success());

        let args = fs_err::read_to_string(home.path().join("args.txt")).expect("args");
        let args: Vec<&str> = args.lines().collect();
        assert_eq!(args.iter().filter(|a| **a == "--entity").count(), 1);
        assert_eq!(args[1], "/work/a.rs");
        assert!(args.contains(&"--extra-heartbeats"));
        assert!(!args.contains(&"--write"));

        let stdin = fs_err::read_to_string(home.path().join("stdin.txt")).expect("stdin");
        let extras: serde_json::Value = serde_json::from_str(stdin.trim()).expect("json");
        let extras = extras.as_array().expect("array");
        assert_eq!(extras.len(), 2);
        assert_eq!(extras[0]["entity"], "/work/a.rs");
        assert_eq!(extras[0]["is_write"], true);
        assert_eq!(extras[1]["entity"], "/work/b.rs");
        assert_eq!(extras[1]["alternate_project"], "work");
    }
}
