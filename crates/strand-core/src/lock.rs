//! Session lock snapshot.
//!
//! The backend holds a mutual-exclusion lock per session while another
//! client (or a background run) is driving it. The client only ever reads a
//! snapshot: via the advisory `GET /sessions/{id}/lock` pre-check, or parsed
//! out of a `409` response body at send time. A snapshot is stale the
//! instant after it is read; nothing here enforces anything.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Read-only view of the server-held session lock.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLock {
    /// Whether the session is currently locked.
    pub locked: bool,
    /// Identity of the lock holder, when the server discloses it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,
    /// Seconds until the lock lapses, when known.
    #[serde(
        rename = "time_remaining_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub time_remaining_seconds: Option<u64>,
}

impl SessionLock {
    /// Parse the lock info nested inside a `409` response body:
    /// `{"detail": {"lock_info": {"holder": …, "time_remaining_seconds": …}}}`.
    ///
    /// A conflict response implies `locked = true` even when the nested
    /// object is missing or partial.
    #[must_use]
    pub fn from_conflict_body(body: &Value) -> Self {
        let info = body.get("detail").and_then(|d| d.get("lock_info"));
        Self {
            locked: true,
            holder: info
                .and_then(|i| i.get("holder"))
                .and_then(Value::as_str)
                .map(str::to_owned),
            time_remaining_seconds: info
                .and_then(|i| i.get("time_remaining_seconds"))
                .and_then(Value::as_u64),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conflict_body_full() {
        let body = json!({
            "detail": {
                "lock_info": {"holder": "runner-7", "time_remaining_seconds": 42}
            }
        });
        let lock = SessionLock::from_conflict_body(&body);
        assert!(lock.locked);
        assert_eq!(lock.holder.as_deref(), Some("runner-7"));
        assert_eq!(lock.time_remaining_seconds, Some(42));
    }

    #[test]
    fn conflict_body_partial() {
        let body = json!({"detail": {"lock_info": {"holder": "runner-7"}}});
        let lock = SessionLock::from_conflict_body(&body);
        assert!(lock.locked);
        assert_eq!(lock.holder.as_deref(), Some("runner-7"));
        assert_eq!(lock.time_remaining_seconds, None);
    }

    #[test]
    fn conflict_body_missing_lock_info_still_locked() {
        let body = json!({"detail": {}});
        let lock = SessionLock::from_conflict_body(&body);
        assert!(lock.locked);
        assert_eq!(lock.holder, None);
        assert_eq!(lock.time_remaining_seconds, None);
    }

    #[test]
    fn conflict_body_empty() {
        let lock = SessionLock::from_conflict_body(&json!({}));
        assert!(lock.locked);
    }

    #[test]
    fn lock_status_deserialize() {
        let lock: SessionLock = serde_json::from_value(json!({
            "locked": true,
            "holder": "web-ui",
            "time_remaining_seconds": 120
        }))
        .unwrap();
        assert!(lock.locked);
        assert_eq!(lock.holder.as_deref(), Some("web-ui"));
        assert_eq!(lock.time_remaining_seconds, Some(120));
    }

    #[test]
    fn lock_status_unlocked_minimal() {
        let lock: SessionLock = serde_json::from_value(json!({"locked": false})).unwrap();
        assert!(!lock.locked);
        assert_eq!(lock.holder, None);
    }

    #[test]
    fn serialize_skips_absent_fields() {
        let lock = SessionLock {
            locked: false,
            holder: None,
            time_remaining_seconds: None,
        };
        let json = serde_json::to_value(&lock).unwrap();
        assert!(json.get("holder").is_none());
        assert!(json.get("time_remaining_seconds").is_none());
    }
}
