//! UI-facing session events.
//!
//! [`SessionEvent`] is the subscription surface of the streaming core: the
//! rendering layer observes these over a broadcast channel and never drives
//! protocol transitions itself. Events are transient (never persisted) and
//! carry everything a view needs to repaint without consulting the machine.

use serde::{Deserialize, Serialize};

use crate::lock::SessionLock;
use crate::status::{TaskStatus, TurnStatus};

/// Common fields on every session event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseEvent {
    /// Session this event belongs to.
    pub session_id: String,
    /// ISO 8601 timestamp, stamped locally at emission.
    pub timestamp: String,
}

impl BaseEvent {
    /// Create a base event stamped with the current UTC time.
    #[must_use]
    pub fn now(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Events broadcast to session observers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// A send was accepted locally and a turn placeholder exists.
    #[serde(rename = "turn_queued")]
    TurnQueued {
        /// Common fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Correlation id of the new turn.
        #[serde(rename = "correlationId")]
        correlation_id: String,
    },

    /// The turn's status moved.
    #[serde(rename = "turn_status")]
    TurnStatus {
        /// Common fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Correlation id of the turn.
        #[serde(rename = "correlationId")]
        correlation_id: String,
        /// New status.
        status: TurnStatus,
    },

    /// Derived assistant content changed.
    #[serde(rename = "message_update")]
    MessageUpdate {
        /// Common fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Correlation id of the turn.
        #[serde(rename = "correlationId")]
        correlation_id: String,
        /// Full derived content (not a delta).
        content: String,
    },

    /// A tool-use notice was appended to the turn.
    #[serde(rename = "tool_notice")]
    ToolNotice {
        /// Common fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Correlation id of the turn.
        #[serde(rename = "correlationId")]
        correlation_id: String,
        /// Tool name.
        name: String,
    },

    /// The turn reached a terminal status.
    #[serde(rename = "turn_finished")]
    TurnFinished {
        /// Common fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Correlation id of the turn.
        #[serde(rename = "correlationId")]
        correlation_id: String,
        /// Terminal status (`final`, `error`, or `canceled`).
        status: TurnStatus,
        /// Final derived content.
        content: String,
        /// Error description when `status == error`.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A delegated task appeared or changed in the overlay.
    #[serde(rename = "worker_update")]
    WorkerUpdate {
        /// Common fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Job/run id in the overlay namespace.
        #[serde(rename = "jobId")]
        job_id: String,
        /// Current task status.
        status: TaskStatus,
        /// Progress in `[0, 1]`.
        progress: f32,
    },

    /// A worker tool failure raised a time-boxed alert.
    #[serde(rename = "worker_alert")]
    WorkerAlert {
        /// Common fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Failing tool call id.
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        /// Tool name.
        #[serde(rename = "toolName")]
        tool_name: String,
    },

    /// A send bounced off the server-held session lock.
    #[serde(rename = "lock_conflict")]
    LockConflict {
        /// Common fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Parsed lock snapshot from the conflict response.
        lock: SessionLock,
    },

    /// Advisory lock snapshot from a pre-check.
    #[serde(rename = "lock_snapshot")]
    LockSnapshot {
        /// Common fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// The snapshot; stale immediately.
        lock: SessionLock,
    },
}

impl SessionEvent {
    /// Common fields of any event.
    #[must_use]
    pub fn base(&self) -> &BaseEvent {
        match self {
            Self::TurnQueued { base, .. }
            | Self::TurnStatus { base, .. }
            | Self::MessageUpdate { base, .. }
            | Self::ToolNotice { base, .. }
            | Self::TurnFinished { base, .. }
            | Self::WorkerUpdate { base, .. }
            | Self::WorkerAlert { base, .. }
            | Self::LockConflict { base, .. }
            | Self::LockSnapshot { base, .. } => base,
        }
    }

    /// Event type string (the serde tag).
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TurnQueued { .. } => "turn_queued",
            Self::TurnStatus { .. } => "turn_status",
            Self::MessageUpdate { .. } => "message_update",
            Self::ToolNotice { .. } => "tool_notice",
            Self::TurnFinished { .. } => "turn_finished",
            Self::WorkerUpdate { .. } => "worker_update",
            Self::WorkerAlert { .. } => "worker_alert",
            Self::LockConflict { .. } => "lock_conflict",
            Self::LockSnapshot { .. } => "lock_snapshot",
        }
    }

    /// Session id this event belongs to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.base().session_id
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
