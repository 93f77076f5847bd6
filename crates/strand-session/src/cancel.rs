//! Cooperative cancellation state.
//!
//! One [`CancelState`] exists per send. User cancellation and supersede
//! both go through [`CancelState::request`]; there is no separate internal
//! cancel path. The latch makes the operation idempotent and lets callers
//! distinguish the first request (apply the transition, emit the event)
//! from replays (do nothing).

use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

/// Idempotent cancellation latch around a [`CancellationToken`].
#[derive(Debug, Default)]
pub struct CancelState {
    token: CancellationToken,
    requested: AtomicBool,
}

impl CancelState {
    /// Fresh, un-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `true` only on the first call.
    pub fn request(&self) -> bool {
        let first = !self.requested.swap(true, Ordering::SeqCst);
        self.token.cancel();
        first
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// The token the transport and drive loop select against.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
