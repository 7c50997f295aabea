//! Heartbeat emission policy.
//!
//! Decides, per editor activity callback, whether the event is worth a
//! wakatime-cli invocation or is redundant with the last recorded heartbeat.
//!
//! ```text
//! no previous heartbeat                   → send
//! different entity                        → send
//! elapsed > idle threshold                → send
//! write after a passive heartbeat         → send
//! write after a write, elapsed > grace    → send
//! otherwise                               → suppress
//! ```

use crate::types::LastHeartbeat;

pub const IDLE_THRESHOLD_SECS: f64 = 120.0;
pub const WRITE_GRACE_SECS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebounceConfig {
    pub idle_threshold_secs: f64,
    pub write_grace_secs: f64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            idle_threshold_secs: IDLE_THRESHOLD_SECS,
            write_grace_secs: WRITE_GRACE_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Send(SendReason),
    Suppress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendReason {
    FirstHeartbeat,
    EntityChanged,
    IdleElapsed,
    Write,
}

impl Decision {
    pub fn is_send(self) -> bool {
        matches!(self, Decision::Send(_))
    }
}

impl DebounceConfig {
    pub fn decide(
        &self,
        last: Option<&LastHeartbeat>,
        entity: &str,
        now: f64,
        is_write: bool,
    ) -> Decision {
        let last = match last {
            Some(last) => last,
            None => return Decision::Send(SendReason::FirstHeartbeat),
        };

        if last.entity != entity {
            return Decision::Send(SendReason::EntityChanged);
        }

        let elapsed = now - last.timestamp;
        if elapsed > self.idle_threshold_secs {
            return Decision::Send(SendReason::IdleElapsed);
        }

        if is_write && (!last.is_write || elapsed > self.write_grace_secs) {
            return Decision::Send(SendReason::Write);
        }

        Decision::Suppress
    }
}

/// Shorthand for [`DebounceConfig::decide`] with the default thresholds.
pub fn should_send(last: Option<&LastHeartbeat>, entity: &str, now: f64, is_write: bool) -> bool {
    DebounceConfig::default()
        .decide(last, entity, now, is_write)
        .is_send()
}
