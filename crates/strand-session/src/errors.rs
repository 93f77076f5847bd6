//! Session error types.

use strand_stream::StreamError;

/// Errors terminating a single turn.
///
/// None of these escape the affected turn: the orchestrator survives, other
/// sessions are untouched, and retry is always "send again as a new turn"
/// with a fresh correlation id.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport failure (request error, lock conflict, connection loss).
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// The server emitted an explicit `error` frame, or closed the stream
    /// without a terminal frame.
    #[error("Server error: {message}")]
    Server {
        /// Server-provided error text.
        message: String,
    },

    /// The watchdog saw no evidence of progress for the full window.
    #[error("Turn timed out after {seconds}s of silence")]
    Timeout {
        /// Configured window in seconds.
        seconds: u64,
    },

    /// The turn was cancelled by the user (or a superseding send).
    ///
    /// Not a failure: the UI shows the canceled marker, never an error
    /// banner.
    #[error("Turn cancelled")]
    Cancelled,
}

impl SessionError {
    /// Error category string for event emission and logging.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Stream(e) => e.category(),
            Self::Server { .. } => "server",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the user can simply resend.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Cancelled | Self::Timeout { .. } => true,
            Self::Stream(e) => e.is_lock_conflict(),
            Self::Server { .. } => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use strand_core::SessionLock;

    #[test]
    fn timeout_message_names_the_window() {
        let err = SessionError::Timeout { seconds: 60 };
        assert_eq!(err.to_string(), "Turn timed out after 60s of silence");
        assert_eq!(err.category(), "timeout");
        assert!(err.is_recoverable());
    }

    #[test]
    fn timeout_and_server_error_messages_differ() {
        let timeout = SessionError::Timeout { seconds: 60 };
        let server = SessionError::Server {
            message: "run failed".into(),
        };
        assert_ne!(timeout.to_string(), server.to_string());
        assert_ne!(timeout.category(), server.category());
    }

    #[test]
    fn cancelled_is_recoverable_not_a_failure() {
        let err = SessionError::Cancelled;
        assert!(err.is_recoverable());
        assert_eq!(err.category(), "cancelled");
    }

    #[test]
    fn lock_conflict_category_passes_through() {
        let err = SessionError::Stream(StreamError::LockConflict(SessionLock {
            locked: true,
            holder: Some("runner-7".into()),
            time_remaining_seconds: None,
        }));
        assert_eq!(err.category(), "lock_conflict");
        assert!(err.is_recoverable());
    }

    #[test]
    fn request_error_not_recoverable() {
        let err = SessionError::Stream(StreamError::Request {
            status: 500,
            message: "boom".into(),
        });
        assert_eq!(err.category(), "request");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn server_error_display() {
        let err = SessionError::Server {
            message: "provider exploded".into(),
        };
        assert_eq!(err.to_string(), "Server error: provider exploded");
        assert!(!err.is_recoverable());
    }
}
