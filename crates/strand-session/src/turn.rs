//! Turn state machine.
//!
//! One [`Turn`] owns the lifecycle of a single assistant message:
//! `Queued → Typing → Streaming → Final`, with `Error` and `Canceled` as
//! absorbing states. Every mutator returns whether it applied, so duplicate
//! and late frames are absorbed as no-ops instead of corrupting state.
//!
//! `content` is always *recomputed* from the notice list plus the latest
//! authoritative accumulated text — never patched incrementally — so frame
//! retransmission or a notice landing mid-stream cannot duplicate or lose
//! streamed text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strand_core::{CorrelationId, TurnId, TurnStatus};

/// Marker appended to the content of a canceled turn.
pub const CANCEL_MARKER: &str = "[Cancelled]";

/// One assistant turn, owned by the session's drive loop for its lifetime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    /// Turn record id.
    pub id: TurnId,
    /// Correlation id tying this turn to its stream.
    pub correlation_id: CorrelationId,
    /// Message role; always `"assistant"`.
    pub role: String,
    /// Derived display content. See the module docs.
    pub content: String,
    /// Ordered tool-use notices, e.g. `"Using tool: web_search"`.
    pub tool_notices: Vec<String>,
    /// Latest authoritative accumulated text from the server.
    pub accumulated: String,
    /// Lifecycle status.
    pub status: TurnStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
    /// Error description when `status == Error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Turn {
    /// Create a queued turn for a fresh correlation id.
    #[must_use]
    pub fn begin(correlation_id: CorrelationId) -> Self {
        let now = Utc::now();
        Self {
            id: TurnId::new(),
            correlation_id,
            role: "assistant".to_owned(),
            content: String::new(),
            tool_notices: Vec::new(),
            accumulated: String::new(),
            status: TurnStatus::Queued,
            created_at: now,
            updated_at: now,
            error_message: None,
        }
    }

    /// Server acknowledged the send: `Queued → Typing`.
    pub fn ack(&mut self) -> bool {
        if self.status != TurnStatus::Queued {
            return false;
        }
        self.transition(TurnStatus::Typing);
        true
    }

    /// A liveness frame arrived. Promotes `Queued → Typing`, otherwise a
    /// no-op; the caller pets the watchdog regardless.
    pub fn liveness(&mut self) -> bool {
        self.ack()
    }

    /// Apply an assistant delta: any active status moves to `Streaming` and
    /// `accumulated` is replaced (not appended) with the server's text.
    pub fn apply_delta(&mut self, accumulated: &str) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.accumulated = accumulated.to_owned();
        self.transition(TurnStatus::Streaming);
        true
    }

    /// Append a tool-use notice. Only applies in `Typing`/`Streaming`; in
    /// `Queued` the frame counts as liveness only.
    pub fn apply_tool_use(&mut self, name: &str) -> bool {
        if !matches!(self.status, TurnStatus::Typing | TurnStatus::Streaming) {
            return false;
        }
        self.tool_notices.push(format!("Using tool: {name}"));
        self.transition(self.status);
        true
    }

    /// Terminal success: non-terminal → `Final`.
    pub fn finish(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.transition(TurnStatus::Final);
        true
    }

    /// Terminal failure: non-terminal → `Error`, recording the message.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.error_message = Some(message.into());
        self.transition(TurnStatus::Error);
        true
    }

    /// Terminal cancellation: non-terminal → `Canceled`, appending the
    /// cancellation marker to the derived content.
    pub fn cancel(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.transition(TurnStatus::Canceled);
        if self.content.is_empty() {
            self.content = CANCEL_MARKER.to_owned();
        } else {
            self.content.push_str("\n\n");
            self.content.push_str(CANCEL_MARKER);
        }
        true
    }

    /// Set status, recompute content, bump `updated_at`.
    fn transition(&mut self, status: TurnStatus) {
        self.status = status;
        self.content = derive_content(&self.tool_notices, &self.accumulated);
        self.updated_at = Utc::now();
    }
}

/// Derive display content from the notice list and accumulated text.
fn derive_content(tool_notices: &[String], accumulated: &str) -> String {
    if tool_notices.is_empty() {
        return accumulated.to_owned();
    }
    let notices = tool_notices.join("\n");
    if accumulated.is_empty() {
        notices
    } else {
        format!("{notices}\n\n{accumulated}")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
