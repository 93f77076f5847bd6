//! # strand-core
//!
//! Shared vocabulary for the session streaming core.
//!
//! Everything the transport and session layers both need to speak about:
//!
//! - **Branded IDs**: `SessionId`, `CorrelationId`, `TurnId`, `JobId` newtypes
//! - **Frames**: `RawFrame` off the wire, `ChatFrame` typed decoding with an
//!   `Unknown` fallback for forward compatibility
//! - **Statuses**: `TurnStatus` and `TaskStatus` lifecycle enums
//! - **Lock snapshots**: `SessionLock`, the server-held mutual-exclusion view
//! - **Session events**: `SessionEvent`, the UI-facing subscription surface

#![deny(unsafe_code)]

pub mod events;
pub mod frame;
pub mod ids;
pub mod lock;
pub mod status;
pub mod text;

pub use events::{BaseEvent, SessionEvent};
pub use frame::{ChatFrame, RawFrame};
pub use ids::{CorrelationId, JobId, SessionId, TurnId};
pub use lock::SessionLock;
pub use status::{TaskStatus, TurnStatus};
