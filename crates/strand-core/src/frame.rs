//! Wire frames for the per-turn event stream.
//!
//! Two layers:
//!
//! - **[`RawFrame`]**: what the SSE reader hands up — an event-type string
//!   and the raw data line. Transient; exists only between the reader and
//!   the dispatch pipeline.
//! - **[`ChatFrame`]**: typed decoding of the known event vocabulary, with
//!   an [`Unknown`](ChatFrame::Unknown) fallback so future event types are
//!   ignored rather than fatal.
//!
//! Malformed payloads for *known* event types are dropped (with a warning)
//! instead of aborting the stream: one corrupt frame must not kill an
//! otherwise healthy turn.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::ids::JobId;
use crate::text::truncate_str;

/// Event-type/data pair as read off the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    /// SSE event type (`"message"` when the server sent no `event:` line).
    pub event: String,
    /// Raw data line, JSON in practice but not assumed to be.
    pub data: String,
}

impl RawFrame {
    /// Convenience constructor.
    #[must_use]
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

// Per-event payload shapes. Wire timestamps are accepted but not carried
// further: every record this client keeps is stamped locally at apply time.

#[derive(Deserialize)]
struct ConnectedPayload {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    provider_session_id: Option<String>,
}

#[derive(Deserialize)]
struct DeltaPayload {
    text: String,
    accumulated: String,
}

#[derive(Deserialize)]
struct ToolUsePayload {
    name: String,
    id: String,
}

#[derive(Deserialize)]
struct ErrorPayload {
    error: String,
    #[serde(default)]
    details: Option<Value>,
}

#[derive(Deserialize)]
struct DonePayload {
    exit_code: i32,
    #[serde(default)]
    total_text_length: Option<u64>,
}

#[derive(Deserialize)]
struct RunPayload {
    run_id: String,
    #[serde(default)]
    task: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
struct JobPayload {
    job_id: String,
    #[serde(default)]
    task: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
struct ToolFailedPayload {
    tool_call_id: String,
    tool_name: String,
}

/// One decoded event from the turn stream.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatFrame {
    /// Server acknowledged the send; the stream is live.
    Connected {
        /// Session id echoed by the server.
        session_id: Option<String>,
        /// Upstream provider session, when disclosed.
        provider_session_id: Option<String>,
    },
    /// Periodic liveness signal.
    Heartbeat,
    /// Incremental assistant text. `accumulated` is authoritative.
    AssistantDelta {
        /// The fragment added by this frame.
        text: String,
        /// Full assistant text so far, as the server sees it.
        accumulated: String,
    },
    /// The assistant invoked a tool.
    ToolUse {
        /// Tool name.
        name: String,
        /// Tool invocation id.
        id: String,
    },
    /// Explicit mid-stream failure; terminates the turn.
    ServerError {
        /// Human-readable error.
        error: String,
        /// Structured details, when provided.
        details: Option<Value>,
    },
    /// Stream completed; terminates the turn.
    Done {
        /// Process-style exit code from the run.
        exit_code: i32,
        /// Total assistant text length, when reported.
        total_text_length: Option<u64>,
    },
    /// A supervisor run began (delegation overlay).
    SupervisorStarted {
        /// Run id (overlay namespace).
        run_id: JobId,
        /// Task description.
        task: String,
    },
    /// Supervisor liveness signal (delegation overlay).
    SupervisorThinking,
    /// A worker job was spawned (delegation overlay).
    WorkerSpawned {
        /// Job id (overlay namespace).
        job_id: JobId,
        /// Task description.
        task: String,
    },
    /// A worker job resolved (delegation overlay).
    WorkerComplete {
        /// Job id (overlay namespace).
        job_id: JobId,
        /// Wire status string, e.g. `"success"` or `"failed"`.
        status: String,
    },
    /// A supervisor run resolved (delegation overlay).
    SupervisorComplete {
        /// Run id (overlay namespace).
        run_id: JobId,
        /// Wire status string.
        status: String,
    },
    /// A worker's tool call failed; raises a time-boxed alert, never a
    /// turn error.
    WorkerToolFailed {
        /// Failing tool call id.
        tool_call_id: String,
        /// Tool name.
        tool_name: String,
    },
    /// Unrecognized event type; ignored downstream.
    Unknown {
        /// The event-type string as received.
        event: String,
    },
}

impl ChatFrame {
    /// Decode a raw frame into a typed one.
    ///
    /// Returns `None` when a *known* event type carries a payload that does
    /// not parse — the caller drops it and keeps reading. Unrecognized
    /// event types always decode to [`ChatFrame::Unknown`].
    #[must_use]
    pub fn decode(raw: &RawFrame) -> Option<Self> {
        match raw.event.as_str() {
            "connected" => parse::<ConnectedPayload>(raw).map(|p| Self::Connected {
                session_id: p.session_id,
                provider_session_id: p.provider_session_id,
            }),
            "heartbeat" => Some(Self::Heartbeat),
            "assistant_delta" => parse::<DeltaPayload>(raw).map(|p| Self::AssistantDelta {
                text: p.text,
                accumulated: p.accumulated,
            }),
            "tool_use" => parse::<ToolUsePayload>(raw).map(|p| Self::ToolUse {
                name: p.name,
                id: p.id,
            }),
            "error" => parse::<ErrorPayload>(raw).map(|p| Self::ServerError {
                error: p.error,
                details: p.details,
            }),
            "done" => parse::<DonePayload>(raw).map(|p| Self::Done {
                exit_code: p.exit_code,
                total_text_length: p.total_text_length,
            }),
            "supervisor_started" => parse::<RunPayload>(raw).map(|p| Self::SupervisorStarted {
                run_id: JobId::from(p.run_id),
                task: p.task.unwrap_or_default(),
            }),
            "supervisor_thinking" => Some(Self::SupervisorThinking),
            "supervisor_worker_spawned" => parse::<JobPayload>(raw).map(|p| Self::WorkerSpawned {
                job_id: JobId::from(p.job_id),
                task: p.task.unwrap_or_default(),
            }),
            "supervisor_worker_complete" => {
                parse::<JobPayload>(raw).map(|p| Self::WorkerComplete {
                    job_id: JobId::from(p.job_id),
                    status: p.status.unwrap_or_default(),
                })
            }
            "supervisor_complete" => parse::<RunPayload>(raw).map(|p| Self::SupervisorComplete {
                run_id: JobId::from(p.run_id),
                status: p.status.unwrap_or_default(),
            }),
            "worker_tool_failed" => parse::<ToolFailedPayload>(raw).map(|p| Self::WorkerToolFailed {
                tool_call_id: p.tool_call_id,
                tool_name: p.tool_name,
            }),
            other => Some(Self::Unknown {
                event: other.to_owned(),
            }),
        }
    }

    /// Whether this frame belongs to the delegation overlay's namespace.
    #[must_use]
    pub fn is_delegation(&self) -> bool {
        matches!(
            self,
            Self::SupervisorStarted { .. }
                | Self::SupervisorThinking
                | Self::WorkerSpawned { .. }
                | Self::WorkerComplete { .. }
                | Self::SupervisorComplete { .. }
                | Self::WorkerToolFailed { .. }
        )
    }

    /// Whether this frame counts as evidence of progress for the watchdog.
    ///
    /// Everything the server actively emits resets the liveness timer;
    /// unrecognized events do not.
    #[must_use]
    pub fn pets_watchdog(&self) -> bool {
        !matches!(self, Self::Unknown { .. })
    }
}

/// Parse a known event's payload, dropping it with a warning on failure.
fn parse<T: serde::de::DeserializeOwned>(raw: &RawFrame) -> Option<T> {
    match serde_json::from_str(&raw.data) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(
                event = %raw.event,
                error = %e,
                data_preview = %truncate_str(&raw.data, 100),
                "dropping malformed frame payload"
            );
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
