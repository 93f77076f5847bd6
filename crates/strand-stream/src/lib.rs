//! # strand-stream
//!
//! Transport layer for the session streaming core.
//!
//! - **SSE frame reader**: buffers the response byte stream and yields
//!   `(event, data)` frames, emitting on every data line for minimum
//!   perceived latency
//! - **Session client**: `POST /sessions/{id}/chat` (the turn stream) and
//!   `GET /sessions/{id}/lock` (the advisory lock pre-check)
//! - **Lock negotiation**: `409` responses are parsed into structured lock
//!   info and surfaced as [`StreamError::LockConflict`], never auto-retried

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod sse;

pub use client::{FrameStream, SessionClient, StreamConfig};
pub use errors::StreamError;
