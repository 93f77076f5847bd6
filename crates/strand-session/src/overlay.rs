//! Delegation overlay tracker.
//!
//! A best-effort, non-authoritative view of worker/supervisor lifecycle
//! events keyed by job/run id — a namespace independent of turn correlation
//! ids. The overlay never blocks, delays, or is consulted by the turn state
//! machine: a failing background worker must not corrupt the foreground
//! chat bubble, and vice versa. Replayed frames are idempotent.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};
use tracing::debug;

use strand_core::{ChatFrame, JobId, TaskStatus};

/// One delegated worker or supervisor run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerTask {
    /// Job/run id.
    pub id: JobId,
    /// Task description from the spawn frame.
    pub title: String,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Progress in `[0, 1]`, monotonically non-decreasing until terminal.
    pub progress: f32,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// A time-boxed alert raised by a worker tool failure.
#[derive(Clone, Debug)]
pub struct ToolAlert {
    /// Failing tool call id.
    pub tool_call_id: String,
    /// Tool name.
    pub tool_name: String,
    expires_at: Instant,
}

/// What applying a delegation frame changed, for event emission.
#[derive(Clone, Debug, PartialEq)]
pub enum OverlayChange {
    /// A task appeared or its status/progress moved.
    Task(WorkerTask),
    /// An alert was raised.
    Alert {
        /// Failing tool call id.
        tool_call_id: String,
        /// Tool name.
        tool_name: String,
    },
}

/// Overlay state for one session.
pub struct DelegationOverlay {
    tasks: HashMap<JobId, WorkerTask>,
    alerts: Vec<ToolAlert>,
    alert_ttl: Duration,
}

impl DelegationOverlay {
    /// Create an overlay whose alerts last `alert_ttl`.
    #[must_use]
    pub fn new(alert_ttl: Duration) -> Self {
        Self {
            tasks: HashMap::new(),
            alerts: Vec::new(),
            alert_ttl,
        }
    }

    /// Apply a delegation frame. Non-delegation frames and replays of
    /// already-resolved work return `None`.
    pub fn apply(&mut self, frame: &ChatFrame, now: Instant) -> Option<OverlayChange> {
        self.prune_alerts(now);
        match frame {
            ChatFrame::SupervisorStarted { run_id, task } => self.spawn(run_id, task),
            ChatFrame::WorkerSpawned { job_id, task } => self.spawn(job_id, task),
            ChatFrame::WorkerComplete { job_id, status } => self.resolve(job_id, status),
            ChatFrame::SupervisorComplete { run_id, status } => self.resolve(run_id, status),
            ChatFrame::WorkerToolFailed {
                tool_call_id,
                tool_name,
            } => {
                self.alerts.push(ToolAlert {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    expires_at: now + self.alert_ttl,
                });
                debug!(tool_call_id = %tool_call_id, tool_name = %tool_name, "worker tool failure alert raised");
                Some(OverlayChange::Alert {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                })
            }
            _ => None,
        }
    }

    fn spawn(&mut self, id: &JobId, task: &str) -> Option<OverlayChange> {
        // Re-observing a known id (replay) updates nothing.
        if self.tasks.contains_key(id) {
            return None;
        }
        let record = WorkerTask {
            id: id.clone(),
            title: task.to_owned(),
            status: TaskStatus::Running,
            progress: 0.0,
            updated_at: Utc::now(),
        };
        let _ = self.tasks.insert(id.clone(), record.clone());
        Some(OverlayChange::Task(record))
    }

    fn resolve(&mut self, id: &JobId, status: &str) -> Option<OverlayChange> {
        let task = self.tasks.entry(id.clone()).or_insert_with(|| WorkerTask {
            // A completion for a never-seen id still records the outcome;
            // the spawn frame may have been lost or raced past us.
            id: id.clone(),
            title: String::new(),
            status: TaskStatus::Running,
            progress: 0.0,
            updated_at: Utc::now(),
        });
        if task.status.is_terminal() {
            return None;
        }
        task.status = TaskStatus::from_wire(status);
        task.progress = 1.0;
        task.updated_at = Utc::now();
        Some(OverlayChange::Task(task.clone()))
    }

    /// Advance a task's progress. Clamped to `[0, 1]` and monotonic; moves
    /// neither backwards nor at all once the task is terminal.
    pub fn set_progress(&mut self, id: &JobId, progress: f32) -> Option<OverlayChange> {
        let task = self.tasks.get_mut(id)?;
        if task.status.is_terminal() {
            return None;
        }
        let clamped = progress.clamp(0.0, 1.0);
        if clamped <= task.progress {
            return None;
        }
        task.progress = clamped;
        task.updated_at = Utc::now();
        Some(OverlayChange::Task(task.clone()))
    }

    /// All tracked tasks, unordered.
    #[must_use]
    pub fn tasks(&self) -> Vec<WorkerTask> {
        self.tasks.values().cloned().collect()
    }

    /// Look up a task by id.
    #[must_use]
    pub fn task(&self, id: &JobId) -> Option<&WorkerTask> {
        self.tasks.get(id)
    }

    /// Alerts that have not yet expired.
    pub fn active_alerts(&mut self, now: Instant) -> &[ToolAlert] {
        self.prune_alerts(now);
        &self.alerts
    }

    fn prune_alerts(&mut self, now: Instant) {
        self.alerts.retain(|a| a.expires_at > now);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
