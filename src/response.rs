//! Outgoing HTTP response type.
//!
//! Handlers never build a [`Response`] directly. They write through the
//! [`Context`](crate::Context) helpers (`json`, `text`, `data`, …) and the
//! engine hands the finished value to the transport.

use std::convert::Infallible;
use std::path::Path;

use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::status::Status;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for [`Context::data`](crate::Context::data).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    FormData,     // application/x-www-form-urlencoded
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream  (binary / file download)
    Pdf,          // application/pdf
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::FormData    => "application/x-www-form-urlencoded",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Pdf         => "application/pdf",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

/// Content type for a file, guessed from its extension.
pub(crate) fn content_type_for(path: &Path) -> &'static str {
    let ext = path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css")          => "text/css",
        Some("js" | "mjs")   => "application/javascript",
        Some("json")         => "application/json",
        Some("xml")          => "application/xml",
        Some("pdf")          => "application/pdf",
        Some("zip")          => "application/zip",
        Some("tar")          => "application/x-tar",
        Some("gz")           => "application/gzip",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png")          => "image/png",
        Some("gif")          => "image/gif",
        Some("svg")          => "image/svg+xml",
        Some("ico")          => "image/x-icon",
        Some("webp")         => "image/webp",
        Some("mp3")          => "audio/mpeg",
        Some("mp4")          => "video/mp4",
        Some("webm")         => "video/webm",
        Some("txt")          => "text/plain; charset=utf-8",
        Some("csv")          => "text/csv",
        _                    => "application/octet-stream",
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// Body type handed to hyper: a buffered body or a channel-fed stream.
pub type HttpBody = BoxBody<Bytes, Infallible>;

/// An outgoing HTTP response.
///
/// Starts as `200 OK` with no headers and an empty body. A streamed
/// response keeps its chunks in a channel filled by a background task; see
/// [`Context::stream_with`](crate::Context::stream_with).
#[derive(Debug)]
pub struct Response {
    pub(crate) status: u16,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Bytes,
    pub(crate) stream: Option<mpsc::Receiver<Bytes>>,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: Status::Ok.code(),
            headers: Vec::new(),
            body: Bytes::new(),
            stream: None,
        }
    }
}

impl Response {
    pub fn status(&self) -> u16 { self.status }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn is_streaming(&self) -> bool { self.stream.is_some() }

    /// The buffered body. Empty for streamed responses.
    pub fn body(&self) -> &Bytes { &self.body }

    /// Case-insensitive header lookup. Returns the first value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replaces every value of `name` with `value`.
    pub(crate) fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_owned(), value.to_owned()));
    }

    /// Adds a value without touching earlier ones (`set-cookie`).
    pub(crate) fn append_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_owned(), value.to_owned()));
    }

    pub(crate) fn write(&mut self, status: u16, content_type: &str, body: Bytes) {
        self.status = status;
        self.set_header("content-type", content_type);
        self.body = body;
        self.stream = None;
    }

    pub(crate) fn write_stream(&mut self, status: u16, content_type: &str, chunks: mpsc::Receiver<Bytes>) {
        self.status = status;
        self.set_header("content-type", content_type);
        self.body = Bytes::new();
        self.stream = Some(chunks);
    }

    pub(crate) fn clear_body(&mut self) {
        self.body = Bytes::new();
        self.stream = None;
    }

    /// Converts into the hyper representation.
    ///
    /// Headers that are not valid HTTP tokens/values are dropped with a
    /// warning rather than failing the whole response.
    pub fn into_http(self) -> http::Response<HttpBody> {
        let body = match self.stream {
            Some(chunks) => BodyExt::boxed(StreamBody::new(
                ReceiverStream::new(chunks).map(|chunk| Ok::<_, Infallible>(Frame::data(chunk))),
            )),
            None => Full::new(self.body).boxed(),
        };

        let mut res = http::Response::new(body);
        *res.status_mut() = http::StatusCode::from_u16(self.status)
            .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);

        let headers = res.headers_mut();
        for (name, value) in self.headers {
            match (
                http::HeaderName::from_bytes(name.as_bytes()),
                http::HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => warn!(header = %name, "dropping invalid response header"),
            }
        }
        res
    }
}
