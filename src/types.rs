//! Core domain types shared across the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Application name, used in notifications, the tray and mDNS.
pub const APP_NAME: &str = "Bealink";

/// Irreversible system action that can be requested remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    PowerOff,
    Suspend,
}

impl ActionKind {
    /// Human-readable name used in notifications and HTTP messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            ActionKind::PowerOff => "power off",
            ActionKind::Suspend => "sleep",
        }
    }

    /// Program and arguments that perform the action on this platform.
    pub fn command(&self) -> (&'static str, &'static [&'static str]) {
        #[cfg(windows)]
        {
            const POWER_OFF: &[&str] = &["/s", "/f", "/t", "0"];
            const SUSPEND: &[&str] = &["powrprof.dll,SetSuspendState", "0,1,0"];
            match self {
                ActionKind::PowerOff => ("shutdown", POWER_OFF),
                ActionKind::Suspend => ("rundll32.exe", SUSPEND),
            }
        }

        #[cfg(not(windows))]
        {
            const POWER_OFF: &[&str] = &["poweroff"];
            const SUSPEND: &[&str] = &["suspend"];
            match self {
                ActionKind::PowerOff => ("systemctl", POWER_OFF),
                ActionKind::Suspend => ("systemctl", SUSPEND),
            }
        }
    }

    /// Full command line, for logging.
    pub fn command_line(&self) -> String {
        let (program, args) = self.command();
        std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Snapshot of the coordinator's slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CoordinatorStatus {
    Idle,
    Pending {
        kind: ActionKind,
        generation: u64,
        requested_at: DateTime<Utc>,
        #[serde(rename = "remaining_ms", serialize_with = "serialize_millis")]
        remaining: Duration,
    },
    Executing {
        kind: ActionKind,
        generation: u64,
    },
}

impl CoordinatorStatus {
    pub fn is_idle(&self) -> bool {
        matches!(self, CoordinatorStatus::Idle)
    }

    /// Short line for the tray menu.
    pub fn summary(&self) -> String {
        match self {
            CoordinatorStatus::Idle => "No pending action".to_string(),
            CoordinatorStatus::Pending { kind, remaining, .. } => {
                format!("Pending {} in {}s", kind, remaining.as_secs())
            }
            CoordinatorStatus::Executing { kind, .. } => format!("Executing {}", kind),
        }
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Shorten text for display, appending "..." when it exceeds `max_chars`.
pub fn truncate_for_display(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}
