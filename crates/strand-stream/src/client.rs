//! HTTP session client.
//!
//! An explicit per-session handle around [`reqwest::Client`] — construction
//! is the only place the connection is configured, and the orchestrator
//! passes the handle down. There is no process-wide connection state.

use std::pin::Pin;

use futures::Stream;
use serde_json::json;
use strand_core::text::truncate_str;
use strand_core::{RawFrame, SessionId, SessionLock};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::errors::StreamError;
use crate::sse::frame_stream;

/// Response-body preview length kept in request-failure messages.
const ERROR_BODY_PREVIEW: usize = 200;

/// Transport configuration.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Backend base URL, e.g. `https://api.example.com`.
    pub base_url: String,
}

impl StreamConfig {
    /// Configuration pointing at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

/// Boxed stream of raw frames from one turn's SSE response.
pub type FrameStream = Pin<Box<dyn Stream<Item = RawFrame> + Send>>;

/// HTTP client for one backend.
pub struct SessionClient {
    config: StreamConfig,
    client: reqwest::Client,
}

impl SessionClient {
    /// Create a client with a fresh connection pool.
    #[must_use]
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Create a client sharing an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(config: StreamConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Open the turn stream: `POST /sessions/{id}/chat`.
    ///
    /// - `2xx` — returns the frame stream; it ends when the server closes
    ///   the response or `cancel` fires, whichever comes first.
    /// - `409` — the body's nested lock info is parsed and returned as
    ///   [`StreamError::LockConflict`]. Never retried here.
    /// - other non-2xx — [`StreamError::Request`] with a body preview.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn open_turn_stream(
        &self,
        session_id: &SessionId,
        message: &str,
        cancel: CancellationToken,
    ) -> Result<FrameStream, StreamError> {
        let url = format!("{}/sessions/{session_id}/chat", self.config.base_url);
        debug!(message_len = message.len(), "opening turn stream");

        let response = self
            .client
            .post(&url)
            .json(&json!({ "message": message }))
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 409 {
            let body = response.text().await.unwrap_or_default();
            let parsed: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
            let lock = SessionLock::from_conflict_body(&parsed);
            warn!(holder = ?lock.holder, "send rejected: session locked");
            return Err(StreamError::LockConflict(lock));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "turn stream request failed");
            return Err(StreamError::Request {
                status: status.as_u16(),
                message: truncate_str(&body, ERROR_BODY_PREVIEW),
            });
        }

        let frames = frame_stream(response.bytes_stream());
        Ok(Box::pin(frames.take_until(cancel.cancelled_owned())))
    }

    /// Advisory lock pre-check: `GET /sessions/{id}/lock`.
    ///
    /// The snapshot is stale the instant it is returned; callers surface
    /// it, they never gate on it.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn lock_status(&self, session_id: &SessionId) -> Result<SessionLock, StreamError> {
        let url = format!("{}/sessions/{session_id}/lock", self.config.base_url);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Request {
                status: status.as_u16(),
                message: truncate_str(&body, ERROR_BODY_PREVIEW),
            });
        }

        Ok(response.json::<SessionLock>().await?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
