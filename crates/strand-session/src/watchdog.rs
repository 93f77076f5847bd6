//! Liveness watchdog.
//!
//! One rolling deadline per turn: armed at send time, re-armed ("petted")
//! by any evidence of progress, expired when the server goes silent for the
//! full window. Expiry is observed by the drive loop through
//! [`Watchdog::sleep`] inside its select; the loop then forces the error
//! transition and aborts the transport.

use tokio::time::{Duration, Instant, sleep_until};

/// Rolling liveness deadline for one turn.
#[derive(Debug)]
pub struct Watchdog {
    timeout: Duration,
    deadline: Instant,
}

impl Watchdog {
    /// Arm a fresh watchdog expiring `timeout` from now.
    #[must_use]
    pub fn arm(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    /// Reset the deadline to `timeout` from now.
    pub fn pet(&mut self) {
        self.deadline = Instant::now() + self.timeout;
    }

    /// The current deadline.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// The configured window, for error messages.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sleep until the current deadline.
    ///
    /// Select against this; a pet between polls moves the deadline, and the
    /// caller re-enters the select with the new one.
    pub async fn sleep(&self) {
        sleep_until(self.deadline).await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
