//! # strand-session
//!
//! Per-session streaming machinery: everything between the transport and
//! the UI.
//!
//! - **Turn state machine**: one assistant message's lifecycle with
//!   derived-content reconciliation and idempotent terminal absorption
//! - **Correlation registry**: single-active-turn routing; stale frames
//!   from superseded sends are dropped
//! - **Delegation overlay**: best-effort worker/supervisor tracking,
//!   decoupled from turn state
//! - **Watchdog**: rolling liveness deadline per turn
//! - **Cancellation**: one idempotent cancel path for user aborts and
//!   superseding sends
//! - **[`ChatSession`]**: the composition root wiring all of the above,
//!   observed via [`strand_core::SessionEvent`] subscriptions

#![deny(unsafe_code)]

pub mod cancel;
pub mod emitter;
pub mod errors;
pub mod overlay;
pub mod registry;
pub mod session;
pub mod turn;
pub mod watchdog;

pub use cancel::CancelState;
pub use emitter::EventEmitter;
pub use errors::SessionError;
pub use overlay::{DelegationOverlay, OverlayChange, ToolAlert, WorkerTask};
pub use registry::{CorrelationRegistry, Route};
pub use session::{ChatSession, SessionConfig};
pub use turn::{CANCEL_MARKER, Turn};
pub use watchdog::Watchdog;
