//! Error types for wakatime-core operations.

use std::path::PathBuf;

/// All errors that can occur while tracking editor activity.
///
/// None of these are fatal to the host editor: callers log them and degrade
/// to "tracking silently not happening" plus a status indicator.
#[derive(Debug, thiserror::Error)]
pub enum WakaError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Configuration write failed: {path}: {source}")]
    ConfigWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid api key")]
    InvalidApiKey,

    // ─────────────────────────────────────────────────────────────────────
    // Tool Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("wakatime-cli not found")]
    CliNotFound,

    #[error("No python interpreter found for {0}")]
    InterpreterNotFound(PathBuf),

    #[error("Platform not supported: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Failed to spawn {command}: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Dispatcher is shut down")]
    DispatcherClosed,

    // ─────────────────────────────────────────────────────────────────────
    // Download Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Network request failed: {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Release archive invalid: {0}")]
    ArchiveInvalid(String),

    #[error("Unrecognized version string: {0}")]
    VersionUnparsable(String),

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl WakaError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        WakaError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        WakaError::Json {
            context: context.into(),
            source,
        }
    }
}

/// Convenience type alias for Results using WakaError.
pub type Result<T> = std::result::Result<T, WakaError>;

impl From<WakaError> for String {
    fn from(err: WakaError) -> String {
        err.to_string()
    }
}
