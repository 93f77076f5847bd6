//! Session orchestrator.
//!
//! [`ChatSession`] is the composition root for one chat session: it wires
//! the client, the correlation registry, the delegation overlay, the
//! watchdog, and the cancellation state, and serializes every state
//! mutation through one lock. The drive loop is the single writer; the
//! only other mutation path is the synchronous cancel, and a biased select
//! makes cancellation win any race against an in-flight frame.
//!
//! Observers subscribe to [`SessionEvent`]s; nothing outside this module
//! drives a transition.

use std::sync::Arc;

use futures::Stream;
use parking_lot::Mutex;
use tokio::time::{Duration, Instant};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use strand_core::{
    BaseEvent, ChatFrame, CorrelationId, RawFrame, SessionEvent, SessionId, SessionLock,
};
use strand_stream::{SessionClient, StreamError};

use crate::cancel::CancelState;
use crate::emitter::EventEmitter;
use crate::errors::SessionError;
use crate::overlay::{DelegationOverlay, OverlayChange};
use crate::registry::{CorrelationRegistry, Route};
use crate::turn::Turn;
use crate::watchdog::Watchdog;

/// Per-session configuration with compiled defaults.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Backend session id.
    pub session_id: SessionId,
    /// Watchdog silence window.
    pub watchdog_timeout: Duration,
    /// How long a terminal turn keeps absorbing late duplicates.
    pub detach_grace: Duration,
    /// Lifetime of worker tool-failure alerts.
    pub alert_ttl: Duration,
    /// Run the advisory lock pre-check before each send.
    pub precheck_lock: bool,
}

impl SessionConfig {
    /// Defaults for a session id.
    #[must_use]
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            watchdog_timeout: Duration::from_secs(60),
            detach_grace: Duration::from_secs(2),
            alert_ttl: Duration::from_secs(10),
            precheck_lock: false,
        }
    }
}

/// Mutable session state, guarded by one lock.
pub(crate) struct SessionState {
    pub(crate) registry: CorrelationRegistry,
    pub(crate) overlay: DelegationOverlay,
}

/// Bookkeeping for the in-flight send.
struct ActiveSend {
    correlation_id: CorrelationId,
    cancel: Arc<CancelState>,
}

/// One chat session's streaming core.
pub struct ChatSession {
    config: SessionConfig,
    client: Arc<SessionClient>,
    emitter: Arc<EventEmitter>,
    state: Arc<Mutex<SessionState>>,
    active: Mutex<Option<ActiveSend>>,
    /// Serializes sends: a new send supersedes the prior turn, it never
    /// races another send's setup.
    send_gate: tokio::sync::Mutex<()>,
}

impl ChatSession {
    /// Wire a session from its config and transport handle.
    #[must_use]
    pub fn new(config: SessionConfig, client: SessionClient) -> Self {
        let state = SessionState {
            registry: CorrelationRegistry::new(config.detach_grace),
            overlay: DelegationOverlay::new(config.alert_ttl),
        };
        Self {
            config,
            client: Arc::new(client),
            emitter: Arc::new(EventEmitter::new()),
            state: Arc::new(Mutex::new(state)),
            active: Mutex::new(None),
            send_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Subscribe to session events.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.emitter.subscribe()
    }

    /// Snapshot of the most recent turn (active, or terminal within the
    /// detach grace window).
    #[must_use]
    pub fn current_turn(&self) -> Option<Turn> {
        let mut state = self.state.lock();
        state.registry.sweep(Instant::now());
        state.registry.latest().cloned()
    }

    /// Number of non-terminal turns (0 or 1, by invariant).
    #[must_use]
    pub fn non_terminal_turns(&self) -> usize {
        self.state.lock().registry.non_terminal_count()
    }

    /// Snapshot of the delegation overlay's tasks.
    #[must_use]
    pub fn overlay_tasks(&self) -> Vec<crate::overlay::WorkerTask> {
        self.state.lock().overlay.tasks()
    }

    /// Advisory lock snapshot; stale the instant it returns.
    pub async fn lock_status(&self) -> Result<SessionLock, SessionError> {
        Ok(self.client.lock_status(&self.config.session_id).await?)
    }

    /// Submit a user message, superseding any still-active turn.
    ///
    /// Returns the new turn's correlation id once the stream is open. A
    /// lock conflict or request failure discards the queued placeholder —
    /// zero non-terminal turns remain — and returns the error.
    #[instrument(skip_all, fields(session_id = %self.config.session_id))]
    pub async fn send(&self, message: &str) -> Result<CorrelationId, SessionError> {
        let _gate = self.send_gate.lock().await;

        // A new send implicitly cancels the prior in-flight turn.
        if self.cancel_active() {
            debug!("superseded in-flight turn");
        }

        if self.config.precheck_lock {
            self.advisory_lock_check().await;
        }

        let correlation_id = CorrelationId::new();
        let cancel = Arc::new(CancelState::new());

        // Register the send before opening the stream so a cancel landing
        // during the open window still reaches this turn.
        {
            let mut state = self.state.lock();
            state.registry.begin(Turn::begin(correlation_id.clone()));
            let _ = self.emitter.emit(SessionEvent::TurnQueued {
                base: self.base(),
                correlation_id: correlation_id.to_string(),
            });
        }
        *self.active.lock() = Some(ActiveSend {
            correlation_id: correlation_id.clone(),
            cancel: Arc::clone(&cancel),
        });

        let frames = match self
            .client
            .open_turn_stream(&self.config.session_id, message, cancel.token())
            .await
        {
            Ok(frames) => frames,
            Err(e) => {
                // The send never entered the session; the placeholder must
                // vanish rather than error out.
                let _ = self.state.lock().registry.discard_active();
                *self.active.lock() = None;
                if let StreamError::LockConflict(lock) = &e {
                    let _ = self.emitter.emit(SessionEvent::LockConflict {
                        base: self.base(),
                        lock: lock.clone(),
                    });
                }
                return Err(e.into());
            }
        };

        info!(%correlation_id, "turn stream open");

        let ctx = DriveContext {
            correlation_id: correlation_id.clone(),
            state: Arc::clone(&self.state),
            emitter: Arc::clone(&self.emitter),
            session_id: self.config.session_id.to_string(),
            watchdog_timeout: self.config.watchdog_timeout,
        };
        let token = cancel.token();
        let _handle = tokio::spawn(async move {
            if let Err(e) = drive_turn(ctx, frames, token).await {
                debug!(category = e.category(), error = %e, "turn ended with error");
            }
        });

        Ok(correlation_id)
    }

    /// Cancel the active turn. Idempotent; a no-op once the turn is
    /// terminal.
    pub fn cancel(&self) {
        let _ = self.cancel_active();
    }

    /// Apply the cancel transition synchronously, then fire the token so
    /// the transport unwinds. Returns whether a live turn was cancelled.
    fn cancel_active(&self) -> bool {
        let guard = self.active.lock();
        let Some(active) = guard.as_ref() else {
            return false;
        };

        let cancelled = {
            let mut state = self.state.lock();
            let applied = state
                .registry
                .active_mut()
                .filter(|t| t.correlation_id == active.correlation_id)
                .is_some_and(Turn::cancel);
            if applied {
                if let Some(turn) = state.registry.retire(Instant::now()) {
                    let _ = self.emitter.emit(SessionEvent::TurnFinished {
                        base: self.base(),
                        correlation_id: turn.correlation_id.to_string(),
                        status: turn.status,
                        content: turn.content,
                        error: None,
                    });
                }
            }
            applied
        };

        // Fire the token regardless; the drive loop and transport both
        // select against it.
        let _ = active.cancel.request();
        cancelled
    }

    async fn advisory_lock_check(&self) {
        match self.client.lock_status(&self.config.session_id).await {
            Ok(lock) => {
                let _ = self.emitter.emit(SessionEvent::LockSnapshot {
                    base: self.base(),
                    lock,
                });
            }
            // Advisory only: a failed pre-check never blocks the send.
            Err(e) => debug!(error = %e, "lock pre-check failed"),
        }
    }

    fn base(&self) -> BaseEvent {
        BaseEvent::now(self.config.session_id.to_string())
    }
}

/// Everything the drive loop needs, bundled to keep the signature sane.
pub(crate) struct DriveContext {
    pub(crate) correlation_id: CorrelationId,
    pub(crate) state: Arc<Mutex<SessionState>>,
    pub(crate) emitter: Arc<EventEmitter>,
    pub(crate) session_id: String,
    pub(crate) watchdog_timeout: Duration,
}

/// Outcome of applying one frame.
enum Applied {
    /// Keep reading.
    Continue,
    /// The turn reached a terminal state.
    Terminal(Result<(), SessionError>),
}

/// Consume one turn's frame stream, applying every mutation under the
/// session lock. The single writer for turn and overlay state.
pub(crate) async fn drive_turn<S>(
    ctx: DriveContext,
    mut frames: S,
    cancel: CancellationToken,
) -> Result<(), SessionError>
where
    S: Stream<Item = RawFrame> + Unpin,
{
    let mut watchdog = Watchdog::arm(ctx.watchdog_timeout);

    loop {
        // biased: cancellation wins over a ready frame, the deadline over
        // nothing — a pet in this iteration moves the next one's sleep.
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                finish_cancelled(&ctx);
                return Err(SessionError::Cancelled);
            }
            () = watchdog.sleep() => {
                let seconds = ctx.watchdog_timeout.as_secs();
                warn!(correlation_id = %ctx.correlation_id, seconds, "watchdog expired");
                fail_turn(&ctx, &format!("No response from server for {seconds}s; turn timed out"));
                cancel.cancel();
                return Err(SessionError::Timeout { seconds });
            }
            frame = frames.next() => match frame {
                None => return finish_stream_end(&ctx),
                Some(raw) => {
                    let Some(frame) = ChatFrame::decode(&raw) else {
                        // Malformed payload: dropped, stream stays healthy.
                        continue;
                    };
                    if frame.pets_watchdog() {
                        watchdog.pet();
                    }
                    match apply_frame(&ctx, &frame) {
                        Applied::Continue => {}
                        Applied::Terminal(result) => return result,
                    }
                }
            }
        }
    }
}

/// Apply one decoded frame under the session lock.
fn apply_frame(ctx: &DriveContext, frame: &ChatFrame) -> Applied {
    let mut state = ctx.state.lock();

    // Delegation frames live in their own id namespace and never touch
    // turn state; they also count as liveness for a still-queued turn.
    if frame.is_delegation() {
        if let Some(change) = state.overlay.apply(frame, Instant::now()) {
            emit_overlay(ctx, &change);
        }
        if let Route::Active = state.registry.route(&ctx.correlation_id, Instant::now()) {
            apply_liveness(ctx, &mut state);
        }
        return Applied::Continue;
    }

    match state.registry.route(&ctx.correlation_id, Instant::now()) {
        Route::Active => {}
        // Late duplicate for a just-terminal turn, or a superseded stream
        // still draining: accepted, no state change.
        Route::Absorbed | Route::Stale => return Applied::Continue,
    }

    match frame {
        ChatFrame::Connected { .. } | ChatFrame::Heartbeat => {
            apply_liveness(ctx, &mut state);
            Applied::Continue
        }

        ChatFrame::AssistantDelta { accumulated, .. } => {
            let update = state.registry.active_mut().and_then(|turn| {
                let before = turn.status;
                turn.apply_delta(accumulated).then(|| {
                    (
                        turn.status,
                        before,
                        turn.content.clone(),
                        turn.correlation_id.to_string(),
                    )
                })
            });
            if let Some((status, before, content, correlation_id)) = update {
                if status != before {
                    emit_status(ctx, &correlation_id, status);
                }
                let _ = ctx.emitter.emit(SessionEvent::MessageUpdate {
                    base: BaseEvent::now(ctx.session_id.clone()),
                    correlation_id,
                    content,
                });
            }
            Applied::Continue
        }

        ChatFrame::ToolUse { name, .. } => {
            let update = state.registry.active_mut().and_then(|turn| {
                turn.apply_tool_use(name)
                    .then(|| (turn.content.clone(), turn.correlation_id.to_string()))
            });
            if let Some((content, correlation_id)) = update {
                let _ = ctx.emitter.emit(SessionEvent::ToolNotice {
                    base: BaseEvent::now(ctx.session_id.clone()),
                    correlation_id: correlation_id.clone(),
                    name: name.clone(),
                });
                let _ = ctx.emitter.emit(SessionEvent::MessageUpdate {
                    base: BaseEvent::now(ctx.session_id.clone()),
                    correlation_id,
                    content,
                });
            }
            Applied::Continue
        }

        ChatFrame::Done { exit_code, .. } => {
            debug!(correlation_id = %ctx.correlation_id, exit_code = *exit_code, "turn done");
            let finished = state.registry.active_mut().is_some_and(Turn::finish);
            if finished {
                finish_and_emit(ctx, &mut state);
            }
            Applied::Terminal(Ok(()))
        }

        ChatFrame::ServerError { error, .. } => {
            warn!(correlation_id = %ctx.correlation_id, error = %error, "server signaled error");
            let failed = state
                .registry
                .active_mut()
                .is_some_and(|turn| turn.fail(error.clone()));
            if failed {
                finish_and_emit(ctx, &mut state);
            }
            Applied::Terminal(Err(SessionError::Server {
                message: error.clone(),
            }))
        }

        // Forward compatibility: never fatal, never state-bearing.
        ChatFrame::Unknown { event } => {
            debug!(event = %event, "ignoring unknown frame type");
            Applied::Continue
        }

        // Delegation variants are handled above.
        _ => Applied::Continue,
    }
}

/// Promote a still-queued turn to typing on any liveness evidence.
fn apply_liveness(ctx: &DriveContext, state: &mut SessionState) {
    let promoted = state.registry.active_mut().and_then(|turn| {
        turn.liveness()
            .then(|| (turn.status, turn.correlation_id.to_string()))
    });
    if let Some((status, correlation_id)) = promoted {
        emit_status(ctx, &correlation_id, status);
    }
}

/// Retire the now-terminal active turn and emit `TurnFinished`.
fn finish_and_emit(ctx: &DriveContext, state: &mut SessionState) {
    if let Some(turn) = state.registry.retire(Instant::now()) {
        let _ = ctx.emitter.emit(SessionEvent::TurnFinished {
            base: BaseEvent::now(ctx.session_id.clone()),
            correlation_id: turn.correlation_id.to_string(),
            status: turn.status,
            content: turn.content,
            error: turn.error_message,
        });
    }
}

/// Force the error transition (watchdog expiry, stream loss).
fn fail_turn(ctx: &DriveContext, message: &str) {
    let mut state = ctx.state.lock();
    if let Route::Active = state.registry.route(&ctx.correlation_id, Instant::now()) {
        let failed = state
            .registry
            .active_mut()
            .is_some_and(|turn| turn.fail(message));
        if failed {
            finish_and_emit(ctx, &mut state);
        }
    }
}

/// Apply the cancel transition from inside the drive loop, unless the
/// synchronous cancel path already did.
fn finish_cancelled(ctx: &DriveContext) {
    let mut state = ctx.state.lock();
    if let Route::Active = state.registry.route(&ctx.correlation_id, Instant::now()) {
        let cancelled = state.registry.active_mut().is_some_and(Turn::cancel);
        if cancelled {
            finish_and_emit(ctx, &mut state);
        }
    }
}

/// The server closed the stream. Fine after a terminal frame; an error
/// before one.
fn finish_stream_end(ctx: &DriveContext) -> Result<(), SessionError> {
    const MESSAGE: &str = "stream ended before done";
    let still_active = {
        let mut state = ctx.state.lock();
        matches!(
            state.registry.route(&ctx.correlation_id, Instant::now()),
            Route::Active
        )
    };
    if still_active {
        fail_turn(ctx, MESSAGE);
        return Err(SessionError::Server {
            message: MESSAGE.to_owned(),
        });
    }
    Ok(())
}

fn emit_status(ctx: &DriveContext, correlation_id: &str, status: strand_core::TurnStatus) {
    let _ = ctx.emitter.emit(SessionEvent::TurnStatus {
        base: BaseEvent::now(ctx.session_id.clone()),
        correlation_id: correlation_id.to_owned(),
        status,
    });
}

fn emit_overlay(ctx: &DriveContext, change: &OverlayChange) {
    let event = match change {
        OverlayChange::Task(task) => SessionEvent::WorkerUpdate {
            base: BaseEvent::now(ctx.session_id.clone()),
            job_id: task.id.to_string(),
            status: task.status,
            progress: task.progress,
        },
        OverlayChange::Alert {
            tool_call_id,
            tool_name,
        } => SessionEvent::WorkerAlert {
            base: BaseEvent::now(ctx.session_id.clone()),
            tool_call_id: tool_call_id.clone(),
            tool_name: tool_name.clone(),
        },
    };
    let _ = ctx.emitter.emit(event);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_stream::stream;
    use std::pin::Pin;
    use strand_core::TurnStatus;

    struct Harness {
        ctx_state: Arc<Mutex<SessionState>>,
        emitter: Arc<EventEmitter>,
        correlation_id: CorrelationId,
    }

    fn harness() -> Harness {
        let correlation_id = CorrelationId::new();
        let mut registry = CorrelationRegistry::new(Duration::from_secs(2));
        registry.begin(Turn::begin(correlation_id.clone()));
        Harness {
            ctx_state: Arc::new(Mutex::new(SessionState {
                registry,
                overlay: DelegationOverlay::new(Duration::from_secs(10)),
            })),
            emitter: Arc::new(EventEmitter::new()),
            correlation_id,
        }
    }

    impl Harness {
        fn ctx(&self, timeout: Duration) -> DriveContext {
            DriveContext {
                correlation_id: self.correlation_id.clone(),
                state: Arc::clone(&self.ctx_state),
                emitter: Arc::clone(&self.emitter),
                session_id: "s1".into(),
                watchdog_timeout: timeout,
            }
        }

        fn latest_turn(&self) -> Turn {
            let state = self.ctx_state.lock();
            state.registry.latest().cloned().expect("turn tracked")
        }
    }

    type FrameSeq = Pin<Box<dyn Stream<Item = RawFrame> + Send>>;

    fn frames(seq: Vec<RawFrame>) -> FrameSeq {
        Box::pin(futures::stream::iter(seq))
    }

    fn raw(event: &str, data: &str) -> RawFrame {
        RawFrame::new(event, data)
    }

    const WINDOW: Duration = Duration::from_secs(60);

    // ── happy path ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn happy_path_yields_final_turn() {
        let h = harness();
        let seq = frames(vec![
            raw("connected", "{}"),
            raw("assistant_delta", r#"{"text":"H","accumulated":"H"}"#),
            raw("assistant_delta", r#"{"text":"i","accumulated":"Hi"}"#),
            raw("done", r#"{"exit_code":0,"total_text_length":2}"#),
        ]);

        drive_turn(h.ctx(WINDOW), seq, CancellationToken::new())
            .await
            .unwrap();

        let turn = h.latest_turn();
        assert_eq!(turn.status, TurnStatus::Final);
        assert_eq!(turn.content, "Hi");
    }

    #[tokio::test]
    async fn happy_path_emits_lifecycle_events() {
        let h = harness();
        let mut rx = h.emitter.subscribe();
        let seq = frames(vec![
            raw("connected", "{}"),
            raw("assistant_delta", r#"{"text":"H","accumulated":"H"}"#),
            raw("done", r#"{"exit_code":0}"#),
        ]);

        drive_turn(h.ctx(WINDOW), seq, CancellationToken::new())
            .await
            .unwrap();

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            types.push(event.event_type());
        }
        assert_eq!(
            types,
            vec![
                "turn_status",    // typing
                "turn_status",    // streaming
                "message_update", // "H"
                "turn_finished",
            ]
        );
    }

    #[tokio::test]
    async fn tool_notice_ordering_scenario() {
        // connected → tool_use web_search → delta "done" → done
        let h = harness();
        let seq = frames(vec![
            raw("connected", "{}"),
            raw("tool_use", r#"{"name":"web_search","id":"tc-1"}"#),
            raw("assistant_delta", r#"{"text":"done","accumulated":"done"}"#),
            raw("done", r#"{"exit_code":0}"#),
        ]);

        drive_turn(h.ctx(WINDOW), seq, CancellationToken::new())
            .await
            .unwrap();

        let turn = h.latest_turn();
        assert_eq!(turn.content, "Using tool: web_search\n\ndone");
        assert_eq!(turn.status, TurnStatus::Final);
    }

    // ── cancellation ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn mid_stream_cancel_scenario() {
        let h = harness();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let seq: FrameSeq = Box::pin(stream! {
            yield raw("connected", "{}");
            yield raw("assistant_delta", r#"{"text":"partial","accumulated":"partial"}"#);
            trigger.cancel();
            // Yield to the scheduler so the biased select observes the
            // cancellation; the frames below must never be applied.
            tokio::task::yield_now().await;
            yield raw("assistant_delta", r#"{"text":" more","accumulated":"partial more"}"#);
            yield raw("done", r#"{"exit_code":0}"#);
        });

        let err = drive_turn(h.ctx(WINDOW), seq, cancel).await.unwrap_err();
        assert_matches!(err, SessionError::Cancelled);

        let turn = h.latest_turn();
        assert_eq!(turn.status, TurnStatus::Canceled);
        assert_eq!(turn.content, "partial\n\n[Cancelled]");
    }

    #[tokio::test]
    async fn cancel_before_any_frame() {
        let h = harness();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = drive_turn(h.ctx(WINDOW), frames(vec![]), cancel)
            .await
            .unwrap_err();
        assert_matches!(err, SessionError::Cancelled);
        assert_eq!(h.latest_turn().content, "[Cancelled]");
    }

    // ── watchdog ─────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn silence_forces_timeout_error() {
        let h = harness();
        let seq: FrameSeq = Box::pin(futures::stream::pending());

        let err = drive_turn(h.ctx(WINDOW), seq, CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, SessionError::Timeout { seconds: 60 });

        let turn = h.latest_turn();
        assert_eq!(turn.status, TurnStatus::Error);
        assert!(turn.error_message.unwrap().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_at_55s_prevents_timeout() {
        let h = harness();
        let seq: FrameSeq = Box::pin(stream! {
            yield raw("connected", "{}");
            tokio::time::sleep(Duration::from_secs(55)).await;
            yield raw("heartbeat", r#"{"timestamp":"t"}"#);
            tokio::time::sleep(Duration::from_secs(55)).await;
            yield raw("done", r#"{"exit_code":0}"#);
        });

        // 110s total, but never 60s of silence.
        drive_turn(h.ctx(WINDOW), seq, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(h.latest_turn().status, TurnStatus::Final);
    }

    #[tokio::test(start_paused = true)]
    async fn silence_after_heartbeat_still_times_out() {
        let h = harness();
        let seq: FrameSeq = Box::pin(stream! {
            yield raw("heartbeat", r#"{"timestamp":"t"}"#);
            tokio::time::sleep(Duration::from_secs(61)).await;
            yield raw("done", r#"{"exit_code":0}"#);
        });

        let err = drive_turn(h.ctx(WINDOW), seq, CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, SessionError::Timeout { .. });
        assert_eq!(h.latest_turn().status, TurnStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn delegation_frames_pet_the_watchdog() {
        let h = harness();
        let seq: FrameSeq = Box::pin(stream! {
            yield raw("connected", "{}");
            tokio::time::sleep(Duration::from_secs(55)).await;
            yield raw("supervisor_started", r#"{"run_id":"r1","task":"bg"}"#);
            tokio::time::sleep(Duration::from_secs(55)).await;
            yield raw("done", r#"{"exit_code":0}"#);
        });

        drive_turn(h.ctx(WINDOW), seq, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(h.latest_turn().status, TurnStatus::Final);
    }

    // ── server errors and resilience ─────────────────────────────────────

    #[tokio::test]
    async fn error_frame_terminates_with_message() {
        let h = harness();
        let seq = frames(vec![
            raw("connected", "{}"),
            raw("error", r#"{"error":"provider exploded"}"#),
        ]);

        let err = drive_turn(h.ctx(WINDOW), seq, CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, SessionError::Server { message } => {
            assert_eq!(message, "provider exploded");
        });

        let turn = h.latest_turn();
        assert_eq!(turn.status, TurnStatus::Error);
        assert_eq!(turn.error_message.as_deref(), Some("provider exploded"));
    }

    #[tokio::test]
    async fn stream_end_without_done_is_server_error() {
        let h = harness();
        let seq = frames(vec![
            raw("connected", "{}"),
            raw("assistant_delta", r#"{"text":"par","accumulated":"par"}"#),
        ]);

        let err = drive_turn(h.ctx(WINDOW), seq, CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, SessionError::Server { .. });
        assert_eq!(h.latest_turn().status, TurnStatus::Error);
    }

    #[tokio::test]
    async fn malformed_frame_dropped_stream_survives() {
        let h = harness();
        let seq = frames(vec![
            raw("connected", "{}"),
            raw("assistant_delta", "corrupt {{{"),
            raw("assistant_delta", r#"{"text":"ok","accumulated":"ok"}"#),
            raw("done", r#"{"exit_code":0}"#),
        ]);

        drive_turn(h.ctx(WINDOW), seq, CancellationToken::new())
            .await
            .unwrap();
        let turn = h.latest_turn();
        assert_eq!(turn.status, TurnStatus::Final);
        assert_eq!(turn.content, "ok");
    }

    #[tokio::test]
    async fn unknown_event_types_ignored() {
        let h = harness();
        let seq = frames(vec![
            raw("connected", "{}"),
            raw("telemetry_v2", r#"{"whatever":1}"#),
            raw("assistant_delta", r#"{"text":"ok","accumulated":"ok"}"#),
            raw("done", r#"{"exit_code":0}"#),
        ]);

        drive_turn(h.ctx(WINDOW), seq, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(h.latest_turn().status, TurnStatus::Final);
    }

    // ── overlay decoupling ───────────────────────────────────────────────

    #[tokio::test]
    async fn worker_failure_never_corrupts_the_turn() {
        let h = harness();
        let seq = frames(vec![
            raw("connected", "{}"),
            raw("supervisor_worker_spawned", r#"{"job_id":"j1","task":"bg"}"#),
            raw(
                "worker_tool_failed",
                r#"{"tool_call_id":"tc-1","tool_name":"bash"}"#,
            ),
            raw("assistant_delta", r#"{"text":"fine","accumulated":"fine"}"#),
            raw(
                "supervisor_worker_complete",
                r#"{"job_id":"j1","status":"failed"}"#,
            ),
            raw("done", r#"{"exit_code":0}"#),
        ]);

        drive_turn(h.ctx(WINDOW), seq, CancellationToken::new())
            .await
            .unwrap();

        let turn = h.latest_turn();
        assert_eq!(turn.status, TurnStatus::Final);
        assert_eq!(turn.content, "fine");

        let tasks = h.ctx_state.lock().overlay.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, strand_core::TaskStatus::Failed);
    }

    #[tokio::test]
    async fn overlay_events_emitted() {
        let h = harness();
        let mut rx = h.emitter.subscribe();
        let seq = frames(vec![
            raw("supervisor_worker_spawned", r#"{"job_id":"j1","task":"bg"}"#),
            raw(
                "worker_tool_failed",
                r#"{"tool_call_id":"tc-1","tool_name":"bash"}"#,
            ),
            raw("done", r#"{"exit_code":0}"#),
        ]);

        drive_turn(h.ctx(WINDOW), seq, CancellationToken::new())
            .await
            .unwrap();

        let mut saw_update = false;
        let mut saw_alert = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                SessionEvent::WorkerUpdate { .. } => saw_update = true,
                SessionEvent::WorkerAlert { .. } => saw_alert = true,
                _ => {}
            }
        }
        assert!(saw_update);
        assert!(saw_alert);
    }
}
