//! Finding wakatime-cli (and, for script installs, an interpreter to run it).
//!
//! Search order:
//! 1. `cli_path` setting
//! 2. `<resources>/wakatime-cli-<os>-<arch>`
//! 3. `<resources>/wakatime-cli`
//! 4. `wakatime-cli` on `PATH`

use crate::cli::CliCommand;
use crate::error::{Result, WakaError};
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const CLI_NAME: &str = "wakatime-cli";

/// Release naming for the current OS, e.g. `darwin`.
pub fn platform_os() -> Result<&'static str> {
    map_os(env::consts::OS)
}

/// Release naming for the current CPU, e.g. `arm64`.
pub fn platform_arch() -> Result<&'static str> {
    map_arch(env::consts::ARCH)
}

fn map_os(os: &str) -> Result<&'static str> {
    match os {
        "macos" => Ok("darwin"),
        "linux" => Ok("linux"),
        "windows" => Ok("windows"),
        "freebsd" => Ok("freebsd"),
        "openbsd" => Ok("openbsd"),
        "netbsd" => Ok("netbsd"),
        other => Err(WakaError::UnsupportedPlatform {
            os: other.to_string(),
            arch: env::consts::ARCH.to_string(),
        }),
    }
}

fn map_arch(arch: &str) -> Result<&'static str> {
    match arch {
        "x86_64" => Ok("amd64"),
        "x86" => Ok("386"),
        "aarch64" => Ok("arm64"),
        "arm" => Ok("arm"),
        other => Err(WakaError::UnsupportedPlatform {
            os: env::consts::OS.to_string(),
            arch: other.to_string(),
        }),
    }
}

/// `wakatime-cli-linux-amd64`, with `.exe` on Windows.
pub fn versioned_binary_name(os: &str, arch: &str) -> String {
    let suffix = if os == "windows" { ".exe" } else { "" };
    format!("{}-{}-{}{}", CLI_NAME, os, arch, suffix)
}

pub fn archive_name(os: &str, arch: &str) -> String {
    format!("{}-{}-{}.zip", CLI_NAME, os, arch)
}

/// Deterministic install location for this platform.
pub fn install_path(resources_dir: &Path) -> Result<PathBuf> {
    Ok(resources_dir.join(versioned_binary_name(platform_os()?, platform_arch()?)))
}

pub fn stable_link_path(resources_dir: &Path) -> PathBuf {
    let name = if cfg!(windows) {
        format!("{}.exe", CLI_NAME)
    } else {
        CLI_NAME.to_string()
    };
    resources_dir.join(name)
}

#[derive(Debug, Clone)]
pub struct CliLocator {
    resources_dir: PathBuf,
    cli_override: Option<PathBuf>,
    python_override: Option<PathBuf>,
    search_path: Option<OsString>,
    python_roots: Vec<PathBuf>,
}

impl CliLocator {
    pub fn new(resources_dir: &Path) -> Self {
        Self {
            resources_dir: resources_dir.to_path_buf(),
            cli_override: None,
            python_override: None,
            search_path: env::var_os("PATH"),
            python_roots: default_python_roots(),
        }
    }

    pub fn with_cli_override(mut self, path: Option<&str>) -> Self {
        self.cli_override = non_empty_path(path);
        self
    }

    pub fn with_python_override(mut self, path: Option<&str>) -> Self {
        self.python_override = non_empty_path(path);
        self
    }

    pub fn with_search_path(mut self, search_path: Option<OsString>) -> Self {
        self.search_path = search_path;
        self
    }

    pub fn with_python_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.python_roots = roots;
        self
    }

    /// Path of the tool binary or script, without resolving an interpreter.
    pub fn find_cli(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_override {
            if path.is_file() {
                return Some(path.clone());
            }
            tracing::warn!(path = %path.display(), "Configured cli_path does not exist");
        }

        if let Ok(path) = install_path(&self.resources_dir) {
            if path.is_file() {
                return Some(path);
            }
        }

        let link = stable_link_path(&self.resources_dir);
        if link.is_file() {
            return Some(link);
        }

        self.search_on_path(&[CLI_NAME])
    }

    /// The full command to run, pairing script installs with an interpreter.
    pub fn locate(&self) -> Result<CliCommand> {
        let cli = self.find_cli().ok_or(WakaError::CliNotFound)?;
        if !is_script(&cli) {
            return Ok(CliCommand::binary(cli));
        }

        let interpreter = self
            .find_python()
            .ok_or_else(|| WakaError::InterpreterNotFound(cli.clone()))?;
        Ok(CliCommand::script(interpreter, cli))
    }

    pub fn find_python(&self) -> Option<PathBuf> {
        if let Some(path) = &self.python_override {
            return Some(path.clone());
        }

        let names: &[&str] = if cfg!(windows) {
            &["pythonw", "python"]
        } else {
            &["python3", "python"]
        };
        self.search_on_path(names)
            .or_else(|| find_python_in_roots(&self.python_roots))
    }

    fn search_on_path(&self, names: &[&str]) -> Option<PathBuf> {
        let search_path = self.search_path.as_ref()?;
        for dir in env::split_paths(search_path) {
            for name in names {
                for candidate in executable_candidates(&dir, name) {
                    if candidate.is_file() {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }
}

fn non_empty_path(path: Option<&str>) -> Option<PathBuf> {
    path.map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

fn executable_candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    if cfg!(windows) {
        vec![dir.join(format!("{}.exe", name)), dir.join(name)]
    } else {
        vec![dir.join(name)]
    }
}

fn is_script(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("py")
}

fn default_python_roots() -> Vec<PathBuf> {
    if cfg!(windows) {
        let drive = env::var("SystemDrive").unwrap_or_else(|_| "C:".to_string());
        vec![PathBuf::from(format!("{}\\", drive))]
    } else {
        Vec::new()
    }
}

/// `Python312` → [3, 12], `Python3.9` → [3, 9]. Unversioned dirs sort last.
fn python_dir_version(dir: &Path) -> Vec<u32> {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let suffix: String = name
        .trim_start_matches("python")
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if suffix.contains('.') {
        return suffix
            .split('.')
            .filter_map(|part| part.parse().ok())
            .collect();
    }
    let mut digits = suffix.chars();
    match digits.next().and_then(|major| major.to_digit(10)) {
        Some(major) => {
            let mut version = vec![major];
            let minor: String = digits.collect();
            if let Ok(minor) = minor.parse() {
                version.push(minor);
            }
            version
        }
        None => Vec::new(),
    }
}

/// Looks for `python*/pythonw(.exe)` one level below each root, the layout
/// of the classic Windows python.org installers (`C:\Python27\pythonw.exe`).
pub fn find_python_in_roots(roots: &[PathBuf]) -> Option<PathBuf> {
    for root in roots {
        let mut install_dirs: Vec<PathBuf> = WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .to_ascii_lowercase()
                    .starts_with("python")
            })
            .map(|entry| entry.into_path())
            .collect();
        install_dirs.sort_by_key(|dir| std::cmp::Reverse(python_dir_version(dir)));

        for dir in install_dirs {
            for name in ["pythonw.exe", "pythonw"] {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use fs_err as fs;

    #[test]
    fn maps_release_names() {
        assert_eq!(map_os("macos").expect("os"), "darwin");
        assert_eq!(map_arch("x86_64").expect("arch"), "amd64");
        assert_eq!(map_arch("aarch64").expect("arch"), "arm64");
        assert!(map_os("haiku").is_err());
        assert_eq!(versioned_binary_name("windows", "386"), "wakatime-cli-windows-386.exe");
        assert_eq!(archive_name("linux", "arm64"), "wakatime-cli-linux-arm64.zip");
    }

    #[test]
    fn override_wins_when_present() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let custom = temp_dir.path().join("my-cli");
        fs::write(&custom, "").expect("write");

        let locator = CliLocator::new(temp_dir.path())
            .with_search_path(None)
            .with_cli_override(custom.to_str());
        assert_eq!(locator.find_cli(), Some(custom));
    }

    #[test]
    fn finds_installed_binary_in_resources() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let installed = install_path(temp_dir.path()).expect("platform");
        fs::write(&installed, "").expect("write");

        let locator = CliLocator::new(temp_dir.path())
            .with_search_path(None)
            .with_cli_override(Some("/does/not/exist"));
        assert_eq!(locator.find_cli(), Some(installed));
    }

    #[test]
    fn falls_back_to_path_search() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let bin_dir = temp_dir.path().join("bin");
        fs::create_dir_all(&bin_dir).expect("bin");
        let on_path = executable_candidates(&bin_dir, CLI_NAME).remove(0);
        fs::write(&on_path, "").expect("write");

        let locator = CliLocator::new(&temp_dir.path().join("resources"))
            .with_search_path(Some(bin_dir.clone().into_os_string()));
        assert_eq!(locator.find_cli(), Some(on_path));
    }

    #[test]
    fn missing_cli_is_an_error() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let locator = CliLocator::new(temp_dir.path()).with_search_path(None);
        assert!(matches!(locator.locate(), Err(WakaError::CliNotFound)));
    }

    #[test]
    fn script_install_needs_interpreter() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let script = temp_dir.path().join("wakatime-cli.py");
        fs::write(&script, "").expect("write");

        let without = CliLocator::new(temp_dir.path())
            .with_search_path(None)
            .with_python_roots(Vec::new())
            .with_cli_override(script.to_str());
        assert!(matches!(
            without.locate(),
            Err(WakaError::InterpreterNotFound(_))
        ));

        let with = without.with_python_override(Some("/usr/bin/python3"));
        let command = with.locate().expect("command");
        assert_eq!(command.program, PathBuf::from("/usr/bin/python3"));
        assert_eq!(command.prefix_args, vec![script.to_string_lossy().to_string()]);
    }

    #[test]
    fn finds_newest_python_install_dir() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        for dir in ["Python27", "Python312", "Program Files"] {
            fs::create_dir_all(temp_dir.path().join(dir)).expect("dir");
        }
        fs::write(temp_dir.path().join("Python27").join("pythonw.exe"), "").expect("write");
        fs::write(temp_dir.path().join("Python312").join("pythonw.exe"), "").expect("write");

        let found = find_python_in_roots(&[temp_dir.path().to_path_buf()]).expect("python");
        assert!(found.ends_with("Python312/pythonw.exe") || found.ends_with("Python312\\pythonw.exe"));
    }

    #[test]
    fn python_dirs_compare_by_version_not_text() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        for dir in ["Python39", "Python312", "Python310"] {
            fs::create_dir_all(temp_dir.path().join(dir)).expect("dir");
            fs::write(temp_dir.path().join(dir).join("pythonw.exe"), "").expect("write");
        }

        let found = find_python_in_roots(&[temp_dir.path().to_path_buf()]).expect("python");
        assert!(found.ends_with("Python312/pythonw.exe") || found.ends_with("Python312\\pythonw.exe"));

        assert_eq!(python_dir_version(Path::new("Python39")), vec![3, 9]);
        assert_eq!(python_dir_version(Path::new("python3.11")), vec![3, 11]);
        assert!(python_dir_version(Path::new("Python")).is_empty());
    }
}
