//! Streamed response bodies and server-sent events.
//!
//! A streamed response is produced by a background task that owns a
//! [`BodyWriter`]. The handler returns right away; chunks reach the client
//! as the task writes them, so the body may be endless:
//!
//! ```rust
//! use std::time::Duration;
//! use waypost::{BoxFuture, Context};
//!
//! fn clock(ctx: &mut Context) -> BoxFuture<'_> {
//!     Box::pin(async move {
//!         ctx.sse(|events| async move {
//!             let mut tick = 0_u64;
//!             while events.send(&tick.to_string(), Some("tick"), None).await.is_ok() {
//!                 tick += 1;
//!                 tokio::time::sleep(Duration::from_secs(1)).await;
//!             }
//!         });
//!     })
//! }
//! ```
//!
//! A write fails with [`StreamError::Disconnected`] once the client has
//! gone away, which is the producer's cue to stop.

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

/// Chunks buffered between the producer task and the connection.
pub(crate) const STREAM_BUFFER: usize = 16;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("client disconnected")]
    Disconnected,

    #[error("event serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Write half of a streamed response body.
#[derive(Clone, Debug)]
pub struct BodyWriter {
    tx: mpsc::Sender<Bytes>,
}

impl BodyWriter {
    pub(crate) fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    /// Queues `chunk`, waiting while the connection is backed up.
    pub async fn write(&self, chunk: impl Into<Bytes>) -> Result<(), StreamError> {
        self.tx.send(chunk.into()).await.map_err(|_| StreamError::Disconnected)
    }

    /// `true` once the response has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Server-sent events on top of a [`BodyWriter`].
#[derive(Clone, Debug)]
pub struct SseWriter {
    body: BodyWriter,
}

impl SseWriter {
    pub(crate) fn new(body: BodyWriter) -> Self {
        Self { body }
    }

    /// Sends one event. Multi-line `data` becomes several `data:` lines.
    pub async fn send(&self, data: &str, event: Option<&str>, id: Option<&str>) -> Result<(), StreamError> {
        self.body.write(format_event(data, event, id)).await
    }

    /// Sends `payload` serialized as JSON.
    pub async fn send_json<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        event: Option<&str>,
        id: Option<&str>,
    ) -> Result<(), StreamError> {
        let data = serde_json::to_string(payload)?;
        self.send(&data, event, id).await
    }

    /// Sends a comment line. Clients ignore it; proxies see traffic.
    pub async fn comment(&self, text: &str) -> Result<(), StreamError> {
        self.body.write(format!(": {}\n\n", single_line(text))).await
    }

    pub fn is_closed(&self) -> bool {
        self.body.is_closed()
    }
}

fn format_event(data: &str, event: Option<&str>, id: Option<&str>) -> String {
    let mut frame = String::with_capacity(data.len() + 32);
    if let Some(id) = id {
        frame.push_str("id: ");
        frame.push_str(&single_line(id));
        frame.push('\n');
    }
    if let Some(event) = event {
        frame.push_str("event: ");
        frame.push_str(&single_line(event));
        frame.push('\n');
    }
    for line in data.lines() {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    if data.is_empty() {
        frame.push_str("data: \n");
    }
    frame.push('\n');
    frame
}

/// Field values cannot contain line breaks; they would end the field.
fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}
