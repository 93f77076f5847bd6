//! SSE frame reader.
//!
//! Decodes a chunked response byte stream into discrete [`RawFrame`]s:
//!
//! - an `event:` line sets the pending event type
//! - a `data:` line is emitted **immediately**, paired with the pending
//!   event type — no waiting for the blank-line frame terminator, so the
//!   first token of a delta reaches the UI as soon as it is read
//! - a blank line resets the pending event type (end of the SSE frame)
//! - a partial trailing line is retained and prefixed onto the next read
//! - comments, `id:`/`retry:` fields, and invalid UTF-8 lines are skipped
//!
//! JSON parsing happens downstream in `ChatFrame::decode`; this layer never
//! inspects payloads.

use bytes::{Bytes, BytesMut};
use futures::Stream;
use strand_core::RawFrame;
use tokio_stream::StreamExt;
use tracing::warn;

/// Event type assigned to data lines the server sent without an
/// `event:` line.
const DEFAULT_EVENT: &str = "message";

/// Parse an SSE byte stream into a stream of [`RawFrame`]s.
pub fn frame_stream<S>(byte_stream: S) -> impl Stream<Item = RawFrame> + Send
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    futures::stream::unfold(
        (
            byte_stream,
            BytesMut::with_capacity(8192),
            None::<String>,
            false,
        ),
        |(mut stream, mut buffer, mut pending, done)| async move {
            if done {
                return None;
            }

            loop {
                // Drain complete lines already in the buffer.
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line_bytes = buffer.split_to(newline_pos + 1);
                    line_bytes.truncate(line_bytes.len() - 1);
                    if line_bytes.last() == Some(&b'\r') {
                        line_bytes.truncate(line_bytes.len() - 1);
                    }

                    let line = match std::str::from_utf8(&line_bytes) {
                        Ok(s) => s,
                        Err(_) => continue, // skip invalid UTF-8 lines
                    };

                    match classify(line) {
                        Line::Event(event) => pending = Some(event),
                        Line::Data(data) => {
                            let event = pending
                                .clone()
                                .unwrap_or_else(|| DEFAULT_EVENT.to_owned());
                            return Some((
                                RawFrame { event, data },
                                (stream, buffer, pending, false),
                            ));
                        }
                        Line::Blank => pending = None,
                        Line::Ignored => {}
                    }
                    continue;
                }

                // Need more bytes.
                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        warn!("SSE stream read error: {e}");
                        return None;
                    }
                    None => {
                        // Stream ended; a complete data line may still be
                        // sitting in the buffer without its newline.
                        if !buffer.is_empty() {
                            if let Ok(line) = std::str::from_utf8(&buffer) {
                                if let Line::Data(data) = classify(line.trim_end()) {
                                    let event = pending
                                        .take()
                                        .unwrap_or_else(|| DEFAULT_EVENT.to_owned());
                                    buffer.clear();
                                    return Some((
                                        RawFrame { event, data },
                                        (stream, buffer, pending, true),
                                    ));
                                }
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// One parsed line of the SSE wire format.
enum Line {
    /// `event: <type>` — sets the pending event type.
    Event(String),
    /// `data: <payload>` — emitted immediately.
    Data(String),
    /// Frame terminator — resets the pending event type.
    Blank,
    /// Comment, `id:`, `retry:`, or anything else.
    Ignored,
}

fn classify(line: &str) -> Line {
    if line.trim().is_empty() {
        return Line::Blank;
    }
    if line.starts_with(':') {
        return Line::Ignored;
    }
    if let Some(value) = field_value(line, "event") {
        return Line::Event(value);
    }
    if let Some(value) = field_value(line, "data") {
        if value.is_empty() {
            return Line::Ignored;
        }
        return Line::Data(value);
    }
    Line::Ignored
}

/// Extract the value of `<field>: <value>` (colon-space optional).
fn field_value(line: &str, field: &str) -> Option<String> {
    let rest = line.strip_prefix(field)?;
    let rest = rest.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest).trim_end().to_owned())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
