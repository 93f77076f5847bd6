//! Lifecycle status enums for turns and delegated worker tasks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one assistant turn.
///
/// Forward-monotonic: `Queued → Typing → Streaming → Final`, with `Error`
/// and `Canceled` as absorbing states reachable from any non-terminal
/// status and never left once entered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// Send accepted locally, stream not yet acknowledged.
    Queued,
    /// Server acknowledged the send; no content yet.
    Typing,
    /// Assistant content is arriving.
    Streaming,
    /// Completed normally.
    Final,
    /// Terminated by a server error or watchdog timeout.
    Error,
    /// Terminated by user cancellation or supersede.
    Canceled,
}

impl TurnStatus {
    /// Whether this status is absorbing (no further transitions).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Final | Self::Error | Self::Canceled)
    }

    /// Whether the watchdog should be armed in this status.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Queued | Self::Typing | Self::Streaming)
    }
}

impl fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Typing => "typing",
            Self::Streaming => "streaming",
            Self::Final => "final",
            Self::Error => "error",
            Self::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Lifecycle of one delegated worker task in the overlay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Spawned and not yet resolved.
    Running,
    /// Resolved successfully.
    Success,
    /// Resolved with a failure.
    Failed,
}

impl TaskStatus {
    /// Whether the task has resolved.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Map a wire status string onto a terminal status.
    ///
    /// Anything other than an explicit success reading resolves to
    /// [`TaskStatus::Failed`].
    #[must_use]
    pub fn from_wire(status: &str) -> Self {
        match status {
            "success" | "completed" | "ok" => Self::Success,
            _ => Self::Failed,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
