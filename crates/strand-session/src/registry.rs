//! Correlation registry.
//!
//! Tracks the single active turn per session and routes inbound frames by
//! correlation id. Frames that do not match the active turn are either
//! absorbed (the turn just reached a terminal state and sits in the grace
//! window) or stale-dropped (a superseded or long-gone turn). Stale
//! dropping is what makes superseding an in-flight turn safe: the old
//! stream can keep delivering frames and none of them can touch live state.

use tokio::time::{Duration, Instant};
use tracing::debug;

use strand_core::CorrelationId;

use crate::turn::Turn;

/// Where a frame's correlation id landed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Matches the active turn; apply it.
    Active,
    /// Matches a just-terminal turn inside the grace window; no-op.
    Absorbed,
    /// Unknown or detached correlation id; drop it.
    Stale,
}

/// A terminal turn retained briefly to absorb late duplicate frames.
struct Retired {
    turn: Turn,
    detach_at: Instant,
}

/// Single-slot registry enforcing the one-active-turn invariant.
pub struct CorrelationRegistry {
    active: Option<Turn>,
    retired: Option<Retired>,
    grace: Duration,
}

impl CorrelationRegistry {
    /// Create a registry with the given terminal-detach grace window.
    #[must_use]
    pub fn new(grace: Duration) -> Self {
        Self {
            active: None,
            retired: None,
            grace,
        }
    }

    /// Install a new active turn.
    ///
    /// The caller must have terminated and retired any prior active turn;
    /// installing over a live one is a logic error and panics in debug
    /// builds.
    pub fn begin(&mut self, turn: Turn) {
        debug_assert!(
            self.active.as_ref().is_none_or(|t| t.status.is_terminal()),
            "installing a turn over a non-terminal one"
        );
        self.active = Some(turn);
    }

    /// Route a frame's correlation id.
    pub fn route(&mut self, correlation_id: &CorrelationId, now: Instant) -> Route {
        self.sweep(now);
        if self
            .active
            .as_ref()
            .is_some_and(|t| &t.correlation_id == correlation_id)
        {
            return Route::Active;
        }
        if self
            .retired
            .as_ref()
            .is_some_and(|r| &r.turn.correlation_id == correlation_id)
        {
            return Route::Absorbed;
        }
        debug!(%correlation_id, "dropping stale frame");
        Route::Stale
    }

    /// The active turn, if any.
    #[must_use]
    pub fn active(&self) -> Option<&Turn> {
        self.active.as_ref()
    }

    /// Mutable access to the active turn.
    pub fn active_mut(&mut self) -> Option<&mut Turn> {
        self.active.as_mut()
    }

    /// Move a terminal active turn into the grace slot, where it keeps
    /// absorbing late duplicates until detached. Returns a snapshot.
    /// No-op when the active turn is still live.
    pub fn retire(&mut self, now: Instant) -> Option<Turn> {
        if !self.active.as_ref().is_some_and(|t| t.status.is_terminal()) {
            return None;
        }
        let turn = self.active.take()?;
        self.retired = Some(Retired {
            turn: turn.clone(),
            detach_at: now + self.grace,
        });
        Some(turn)
    }

    /// The most recent turn still tracked: the active one, or a terminal
    /// one sitting in the grace window.
    #[must_use]
    pub fn latest(&self) -> Option<&Turn> {
        self.active.as_ref().or(self.retired.as_ref().map(|r| &r.turn))
    }

    /// Discard the active turn without a terminal transition.
    ///
    /// Used when a send bounces (lock conflict, request failure) before the
    /// stream ever started: the placeholder must vanish, not error out.
    pub fn discard_active(&mut self) -> Option<Turn> {
        self.active.take()
    }

    /// Drop a retired entry whose grace window has lapsed.
    pub fn sweep(&mut self, now: Instant) {
        if self.retired.as_ref().is_some_and(|r| now >= r.detach_at) {
            self.retired = None;
        }
    }

    /// Number of non-terminal turns tracked (0 or 1).
    #[must_use]
    pub fn non_terminal_count(&self) -> usize {
        usize::from(
            self.active
                .as_ref()
                .is_some_and(|t| !t.status.is_terminal()),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_secs(2);

    fn registry() -> CorrelationRegistry {
        CorrelationRegistry::new(GRACE)
    }

    #[test]
    fn empty_registry_routes_stale() {
        let mut reg = registry();
        assert_eq!(
            reg.route(&CorrelationId::from("c1"), Instant::now()),
            Route::Stale
        );
        assert_eq!(reg.non_terminal_count(), 0);
    }

    #[test]
    fn active_turn_routes_active() {
        let mut reg = registry();
        let turn = Turn::begin(CorrelationId::from("c1"));
        reg.begin(turn);
        assert_eq!(
            reg.route(&CorrelationId::from("c1"), Instant::now()),
            Route::Active
        );
        assert_eq!(reg.non_terminal_count(), 1);
    }

    #[test]
    fn mismatched_id_routes_stale() {
        let mut reg = registry();
        reg.begin(Turn::begin(CorrelationId::from("c1")));
        assert_eq!(
            reg.route(&CorrelationId::from("c0"), Instant::now()),
            Route::Stale
        );
        // The live turn is untouched.
        assert_eq!(reg.non_terminal_count(), 1);
    }

    #[test]
    fn retire_requires_terminal() {
        let mut reg = registry();
        reg.begin(Turn::begin(CorrelationId::from("c1")));
        assert!(reg.retire(Instant::now()).is_none());
        assert_eq!(reg.non_terminal_count(), 1);
    }

    #[test]
    fn retired_turn_absorbs_within_grace() {
        let mut reg = registry();
        let mut turn = Turn::begin(CorrelationId::from("c1"));
        let _ = turn.finish();
        reg.begin(turn);

        let now = Instant::now();
        let retired = reg.retire(now).unwrap();
        assert_eq!(retired.correlation_id, CorrelationId::from("c1"));

        assert_eq!(reg.route(&CorrelationId::from("c1"), now), Route::Absorbed);
        assert_eq!(
            reg.route(&CorrelationId::from("c1"), now + Duration::from_millis(1900)),
            Route::Absorbed
        );
    }

    #[test]
    fn retired_turn_goes_stale_after_grace() {
        let mut reg = registry();
        let mut turn = Turn::begin(CorrelationId::from("c1"));
        let _ = turn.finish();
        reg.begin(turn);

        let now = Instant::now();
        let _ = reg.retire(now).unwrap();
        assert_eq!(
            reg.route(&CorrelationId::from("c1"), now + GRACE),
            Route::Stale
        );
    }

    #[test]
    fn superseded_turn_frames_route_stale() {
        let mut reg = registry();
        let mut old = Turn::begin(CorrelationId::from("old"));
        let _ = old.cancel();
        reg.begin(old);
        let now = Instant::now();
        let _ = reg.retire(now);

        reg.begin(Turn::begin(CorrelationId::from("new")));

        // Old frames are absorbed during grace, then stale; either way the
        // new turn never sees them.
        assert_eq!(reg.route(&CorrelationId::from("old"), now), Route::Absorbed);
        assert_eq!(
            reg.route(&CorrelationId::from("old"), now + GRACE),
            Route::Stale
        );
        assert_eq!(reg.route(&CorrelationId::from("new"), now), Route::Active);
    }

    #[test]
    fn discard_active_removes_placeholder() {
        let mut reg = registry();
        reg.begin(Turn::begin(CorrelationId::from("c1")));
        let discarded = reg.discard_active().unwrap();
        assert_eq!(discarded.correlation_id, CorrelationId::from("c1"));
        assert_eq!(reg.non_terminal_count(), 0);
        assert_eq!(
            reg.route(&CorrelationId::from("c1"), Instant::now()),
            Route::Stale
        );
    }

    #[test]
    fn single_active_turn_invariant() {
        let mut reg = registry();
        let mut first = Turn::begin(CorrelationId::from("c1"));
        let _ = first.cancel();
        reg.begin(first);
        let _ = reg.retire(Instant::now());
        reg.begin(Turn::begin(CorrelationId::from("c2")));
        assert_eq!(reg.non_terminal_count(), 1);
    }

    #[test]
    fn latest_spans_the_grace_window() {
        let mut reg = registry();
        let mut turn = Turn::begin(CorrelationId::from("c1"));
        let _ = turn.finish();
        reg.begin(turn);

        let now = Instant::now();
        let _ = reg.retire(now);
        // Still visible during grace.
        assert_eq!(
            reg.latest().unwrap().correlation_id,
            CorrelationId::from("c1")
        );

        reg.sweep(now + GRACE);
        assert!(reg.latest().is_none());
    }

    #[test]
    fn active_mut_mutates_in_place() {
        let mut reg = registry();
        reg.begin(Turn::begin(CorrelationId::from("c1")));
        assert!(reg.active_mut().unwrap().ack());
        assert_eq!(
            reg.active().unwrap().status,
            strand_core::TurnStatus::Typing
        );
    }
}
