//! Plugin readiness state machine.
//!
//! ```text
//! Loaded{key, cli}   → Ready | Unconfigured | Downloading
//! ApiKeyProvided     → Ready (cli present) | Downloading | Unconfigured→…
//! ApiKeyRemoved      → Unconfigured (prompts again)
//! DownloadSucceeded  → Ready | Unconfigured
//! DownloadFailed     → Error (retried on next load)
//! ToolUnavailable    → Error (fatal message to the user)
//! ```
//!
//! Transitions return effects for the plugin to carry out instead of
//! polling on a timer.

use crate::types::TrackingStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unconfigured,
    Downloading,
    Ready,
    Error,
}

impl LifecycleState {
    pub fn status(self) -> TrackingStatus {
        match self {
            LifecycleState::Unconfigured => TrackingStatus::Unconfigured,
            LifecycleState::Downloading => TrackingStatus::Downloading,
            LifecycleState::Ready => TrackingStatus::Ok,
            LifecycleState::Error => TrackingStatus::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Loaded { has_api_key: bool, cli_present: bool },
    ApiKeyProvided,
    ApiKeyRemoved,
    DownloadSucceeded,
    DownloadFailed { reason: String },
    ToolUnavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    PromptApiKey,
    StartDownload,
    ShowFatal(String),
}

#[derive(Debug, Clone)]
pub struct Lifecycle {
    has_api_key: bool,
    cli_present: bool,
    downloading: bool,
    failed: bool,
    prompted: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            has_api_key: false,
            cli_present: false,
            downloading: false,
            failed: false,
            prompted: false,
        }
    }

    pub fn state(&self) -> LifecycleState {
        if self.downloading {
            LifecycleState::Downloading
        } else if self.failed {
            LifecycleState::Error
        } else if !self.has_api_key {
            LifecycleState::Unconfigured
        } else if self.cli_present {
            LifecycleState::Ready
        } else {
            LifecycleState::Error
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == LifecycleState::Ready
    }

    pub fn apply(&mut self, event: LifecycleEvent) -> Vec<Effect> {
        let mut effects = Vec::new();

        match event {
            LifecycleEvent::Loaded {
                has_api_key,
                cli_present,
            } => {
                self.has_api_key = has_api_key;
                self.cli_present = cli_present;
                self.failed = false;
                self.prompted = false;
                if !cli_present {
                    self.downloading = true;
                    effects.push(Effect::StartDownload);
                }
            }
            LifecycleEvent::ApiKeyProvided => {
                self.has_api_key = true;
                self.prompted = false;
            }
            LifecycleEvent::ApiKeyRemoved => {
                self.has_api_key = false;
                self.prompted = false;
            }
            LifecycleEvent::DownloadSucceeded => {
                self.downloading = false;
                self.cli_present = true;
                self.failed = false;
            }
            LifecycleEvent::DownloadFailed { reason } => {
                self.downloading = false;
                if !self.cli_present {
                    self.failed = true;
                }
                tracing::warn!(reason = %reason, "wakatime-cli download failed");
            }
            LifecycleEvent::ToolUnavailable { reason } => {
                self.downloading = false;
                self.cli_present = false;
                self.failed = true;
                effects.push(Effect::ShowFatal(reason));
            }
        }

        if !self.has_api_key && !self.prompted {
            self.prompted = true;
            effects.push(Effect::PromptApiKey);
        }

        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loaded_with_everything_is_ready() {
        let mut lifecycle = Lifecycle::new();
        let effects = lifecycle.apply(LifecycleEvent::Loaded {
            has_api_key: true,
            cli_present: true,
        });
        assert!(effects.is_empty());
        assert_eq!(lifecycle.state(), LifecycleState::Ready);
    }

    #[test]
    fn missing_key_prompts_exactly_once() {
        let mut lifecycle = Lifecycle::new();
        let effects = lifecycle.apply(LifecycleEvent::Loaded {
            has_api_key: false,
            cli_present: true,
        });
        assert_eq!(effects, vec![Effect::PromptApiKey]);
        assert_eq!(lifecycle.state(), LifecycleState::Unconfigured);

        let effects = lifecycle.apply(LifecycleEvent::DownloadSucceeded);
        assert!(effects.is_empty());

        lifecycle.apply(LifecycleEvent::ApiKeyProvided);
        assert_eq!(lifecycle.state(), LifecycleState::Ready);
    }

    #[test]
    fn removed_key_returns_to_unconfigured_and_prompts() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.apply(LifecycleEvent::Loaded {
            has_api_key: true,
            cli_present: true,
        });

        let effects = lifecycle.apply(LifecycleEvent::ApiKeyRemoved);
        assert_eq!(effects, vec![Effect::PromptApiKey]);
        assert_eq!(lifecycle.state(), LifecycleState::Unconfigured);

        lifecycle.apply(LifecycleEvent::ApiKeyProvided);
        assert!(lifecycle.is_ready());
    }

    #[test]
    fn missing_cli_downloads_then_ready() {
        let mut lifecycle = Lifecycle::new();
        let effects = lifecycle.apply(LifecycleEvent::Loaded {
            has_api_key: true,
            cli_present: false,
        });
        assert_eq!(effects, vec![Effect::StartDownload]);
        assert_eq!(lifecycle.state(), LifecycleState::Downloading);
        assert_eq!(lifecycle.state().status(), TrackingStatus::Downloading);

        lifecycle.apply(LifecycleEvent::DownloadSucceeded);
        assert!(lifecycle.is_ready());
    }

    #[test]
    fn failed_download_is_error_until_reload() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.apply(LifecycleEvent::Loaded {
            has_api_key: true,
            cli_present: false,
        });
        lifecycle.apply(LifecycleEvent::DownloadFailed {
            reason: "offline".to_string(),
        });
        assert_eq!(lifecycle.state(), LifecycleState::Error);

        let effects = lifecycle.apply(LifecycleEvent::Loaded {
            has_api_key: true,
            cli_present: false,
        });
        assert_eq!(effects, vec![Effect::StartDownload]);
    }

    #[test]
    fn failed_update_keeps_existing_cli_ready() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.apply(LifecycleEvent::Loaded {
            has_api_key: true,
            cli_present: true,
        });
        lifecycle.apply(LifecycleEvent::DownloadFailed {
            reason: "offline".to_string(),
        });
        assert!(lifecycle.is_ready());
    }

    #[test]
    fn unavailable_tool_is_fatal() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.apply(LifecycleEvent::Loaded {
            has_api_key: true,
            cli_present: true,
        });
        let effects = lifecycle.apply(LifecycleEvent::ToolUnavailable {
            reason: "no python".to_string(),
        });
        assert_eq!(effects, vec![Effect::ShowFatal("no python".to_string())]);
        assert_eq!(lifecycle.state(), LifecycleState::Error);
    }
}
