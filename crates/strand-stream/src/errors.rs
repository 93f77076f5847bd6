//! Transport error types.

use strand_core::SessionLock;

/// Errors that can occur while opening or reading a turn stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Connection-level HTTP failure (connect, read, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Pre-stream request failure: non-2xx, non-409 response.
    #[error("Request failed ({status}): {message}")]
    Request {
        /// HTTP status code.
        status: u16,
        /// Response body text, truncated.
        message: String,
    },

    /// The session is locked by another holder (the 409 case).
    ///
    /// Carries the parsed lock snapshot; never auto-retried.
    #[error("Session locked{}", lock_suffix(.0))]
    LockConflict(SessionLock),
}

fn lock_suffix(lock: &SessionLock) -> String {
    match (&lock.holder, lock.time_remaining_seconds) {
        (Some(holder), Some(secs)) => format!(" by {holder} ({secs}s remaining)"),
        (Some(holder), None) => format!(" by {holder}"),
        (None, Some(secs)) => format!(" ({secs}s remaining)"),
        (None, None) => String::new(),
    }
}

impl StreamError {
    /// Error category string for event emission and logging.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Http(_) => "network",
            Self::Request { .. } => "request",
            Self::LockConflict(_) => "lock_conflict",
        }
    }

    /// Whether this is the structured lock-conflict case.
    #[must_use]
    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, Self::LockConflict(_))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_error_display() {
        let err = StreamError::Request {
            status: 503,
            message: "upstream unavailable".into(),
        };
        assert_eq!(
            err.to_string(),
            "Request failed (503): upstream unavailable"
        );
        assert_eq!(err.category(), "request");
        assert!(!err.is_lock_conflict());
    }

    #[test]
    fn lock_conflict_display_with_holder_and_time() {
        let err = StreamError::LockConflict(SessionLock {
            locked: true,
            holder: Some("runner-7".into()),
            time_remaining_seconds: Some(42),
        });
        assert_eq!(err.to_string(), "Session locked by runner-7 (42s remaining)");
        assert_eq!(err.category(), "lock_conflict");
        assert!(err.is_lock_conflict());
    }

    #[test]
    fn lock_conflict_display_bare() {
        let err = StreamError::LockConflict(SessionLock {
            locked: true,
            holder: None,
            time_remaining_seconds: None,
        });
        assert_eq!(err.to_string(), "Session locked");
    }

    #[test]
    fn lock_conflict_display_holder_only() {
        let err = StreamError::LockConflict(SessionLock {
            locked: true,
            holder: Some("web-ui".into()),
            time_remaining_seconds: None,
        });
        assert_eq!(err.to_string(), "Session locked by web-ui");
    }
}
