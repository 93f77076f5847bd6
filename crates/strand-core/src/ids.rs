//! Branded ID newtypes.
//!
//! Correlation ids, job ids, and turn ids all travel as strings on the wire
//! but must never be interchangeable in code: routing a frame by a job id
//! where a correlation id belongs is exactly the class of bug the
//! correlation registry exists to prevent. Each id is a newtype over a
//! UUID v7 (time-ordered) string.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh time-ordered id.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            /// Borrow the inner string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Identifies one chat session. Assigned by the backend; opaque here.
    SessionId
}

branded_id! {
    /// Client-generated id tying a send to its stream of frames.
    ///
    /// A fresh one is minted on every send; frames carrying a correlation id
    /// other than the active one are stale and dropped.
    CorrelationId
}

branded_id! {
    /// Identifies one assistant turn record.
    TurnId
}

branded_id! {
    /// Identifies a delegated worker or supervisor run in the overlay.
    ///
    /// Run ids and job ids share this namespace; it is independent of
    /// [`CorrelationId`].
    JobId
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
