//! Per-request state and chain execution.
//!
//! # The cursor
//!
//! A context runs one [`Chain`]. `cursor` is the index of the next handler
//! to run; it starts at 0 and only ever moves forward. [`Context::next`]
//! keeps running handlers until the chain is exhausted or the context is
//! aborted:
//!
//! ```text
//! chain:   [ logger, auth, handler ]
//!
//! engine ─ next() ─▶ logger ─ next() ─▶ auth ─ abort() ┐
//!                       ▲                              │ handler skipped
//!                       └──── post-next() code runs ◀──┘
//! ```
//!
//! A handler that awaits `ctx.next()` gets control back once everything
//! after it has finished, so it can observe or adjust the response. A
//! handler that never calls `next()` does not stop the chain; only an
//! abort does.
//!
//! # Pooling
//!
//! Contexts are recycled by the engine's pool. A released context drops
//! its request, store and response right away, and [`Context::reset`]
//! wipes every per-request field again before reuse, so nothing a handler
//! stored can leak into the next request or outlive its own.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use cookie::Cookie;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::HttpError;
use crate::handler::{BoxFuture, Chain};
use crate::method::Method;
use crate::params::Params;
use crate::request::Request;
use crate::response::{ContentType, Response, content_type_for};
use crate::status::Status;
use crate::stream::{BodyWriter, STREAM_BUFFER, SseWriter};

const READ_CHUNK: usize = 8 * 1024;

/// Mutable state for one request as it moves through its handler chain.
pub struct Context {
    pub(crate) request: Request,
    pub(crate) params: Params,
    store: HashMap<String, Box<dyn Any + Send + Sync>>,
    handlers: Option<Chain>,
    cursor: usize,
    aborted: bool,
    full_path: Option<Arc<str>>,
    pub(crate) response: Response,
}

impl Context {
    pub(crate) fn new(request: Request) -> Self {
        Self {
            request,
            params: Params::new(),
            store: HashMap::new(),
            handlers: None,
            cursor: 0,
            aborted: false,
            full_path: None,
            response: Response::default(),
        }
    }

    /// Clears every per-request field and installs `request`.
    pub(crate) fn reset(&mut self, request: Request) {
        self.request = request;
        self.params.clear();
        self.store.clear();
        self.handlers = None;
        self.cursor = 0;
        self.aborted = false;
        self.full_path = None;
        self.response = Response::default();
    }

    /// Drops everything the finished request owned. Run when the context
    /// goes back to the pool.
    pub(crate) fn recycle(&mut self) {
        self.reset(Request::default());
    }

    /// Throws away the response built so far, headers included.
    pub(crate) fn clear_response(&mut self) {
        self.response = Response::default();
    }

    /// Sets the chain to run and the pattern it was registered under.
    pub(crate) fn install(&mut self, chain: Chain, full_path: Option<Arc<str>>) {
        self.handlers = Some(chain);
        self.cursor = 0;
        self.full_path = full_path;
    }

    pub(crate) fn take_response(&mut self) -> Response {
        std::mem::take(&mut self.response)
    }

    // ── Chain control ─────────────────────────────────────────────────────────

    /// Runs the remaining handlers of the chain.
    ///
    /// Called by the engine to start the chain and by middleware to run
    /// everything after itself. Handlers that already ran are never run
    /// again; calling `next()` once the chain is exhausted does nothing.
    pub fn next(&mut self) -> BoxFuture<'_> {
        Box::pin(async move {
            while !self.aborted {
                let Some(handler) = self.handlers
                    .as_ref()
                    .and_then(|chain| chain.get(self.cursor))
                    .cloned()
                else {
                    break;
                };
                self.cursor += 1;
                handler.call(self).await;
            }
        })
    }

    /// Stops the chain. Handlers after the current one do not run; code
    /// after `next()` in handlers already on the stack still does.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn abort_with_status(&mut self, status: Status) {
        self.status(status);
        self.abort();
    }

    pub fn abort_with_json<T: Serialize + ?Sized>(&mut self, status: Status, payload: &T) {
        self.abort();
        self.json(status, payload);
    }

    /// Aborts with an [`HttpError`] body. An empty `message` uses the
    /// status reason phrase.
    pub fn error(&mut self, status: Status, message: &str) {
        let message = if message.is_empty() { status.reason() } else { message };
        self.abort_with_json(status, &HttpError::new(status.code(), message));
    }

    // ── Route data ────────────────────────────────────────────────────────────

    /// Value of a path parameter, e.g. `id` for `/users/:id`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// The pattern the request matched, e.g. `/users/:id`. `None` while the
    /// not-found chain runs.
    pub fn full_path(&self) -> Option<&str> {
        self.full_path.as_deref()
    }

    // ── Key/value store ───────────────────────────────────────────────────────

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.store.insert(key.into(), Box::new(value));
    }

    /// The value under `key`, if present and of type `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.store.get(key).and_then(|value| (**value).downcast_ref::<T>())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.store.get_mut(key).and_then(|value| (**value).downcast_mut::<T>())
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.store.remove(key).is_some()
    }

    // ── Request metadata ──────────────────────────────────────────────────────

    pub fn request(&self) -> &Request { &self.request }
    pub fn method(&self) -> Method { self.request.method() }
    pub fn path(&self) -> &str { self.request.path() }
    pub fn body(&self) -> &Bytes { self.request.body() }

    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    pub fn query(&self, key: &str) -> Option<String> {
        self.request.query(key)
    }

    /// Query value, or `default` when the key is missing or empty.
    pub fn default_query(&self, key: &str, default: &str) -> String {
        self.request.query(key)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_owned())
    }

    /// Form field from a urlencoded body, falling back to the query string.
    pub fn post_form(&self, key: &str) -> Option<String> {
        self.request.form_value(key)
    }

    pub fn default_post_form(&self, key: &str, default: &str) -> String {
        self.post_form(key)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_owned())
    }

    /// Deserializes the request body as JSON.
    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(self.request.body())
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.request.cookie(name)
    }

    pub fn client_ip(&self) -> Option<String> {
        self.request.client_ip()
    }

    // ── Response helpers ──────────────────────────────────────────────────────

    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Sets the status code without touching headers or body.
    pub fn status(&mut self, status: Status) {
        self.response.status = status.code();
    }

    /// Sets a response header, replacing earlier values of the same name.
    pub fn header(&mut self, name: &str, value: &str) {
        self.response.set_header(name, value);
    }

    /// Adds a `Set-Cookie` header. Earlier cookies are kept.
    ///
    /// ```rust
    /// use waypost::{Context, Cookie, SameSite};
    ///
    /// fn login(ctx: &mut Context) {
    ///     let session = Cookie::build(("session", "abc123"))
    ///         .path("/")
    ///         .http_only(true)
    ///         .same_site(SameSite::Lax);
    ///     ctx.set_cookie(session.build());
    /// }
    /// ```
    pub fn set_cookie(&mut self, cookie: Cookie<'_>) {
        self.response.append_header("set-cookie", &cookie.to_string());
    }

    /// Serializes `payload` as the JSON body. A serialization failure is
    /// logged and answered with `500`.
    pub fn json<T: Serialize + ?Sized>(&mut self, status: Status, payload: &T) {
        match serde_json::to_vec(payload) {
            Ok(body) => self.response.write(status.code(), ContentType::Json.as_str(), body.into()),
            Err(e) => {
                error!(error = %e, path = %self.request.path(), "response serialization failed");
                self.text(Status::InternalServerError, Status::InternalServerError.reason());
            }
        }
    }

    pub fn text(&mut self, status: Status, body: impl Into<String>) {
        self.response.write(status.code(), ContentType::Text.as_str(), Bytes::from(body.into()));
    }

    pub fn html(&mut self, status: Status, body: impl Into<String>) {
        self.response.write(status.code(), ContentType::Html.as_str(), Bytes::from(body.into()));
    }

    pub fn data(&mut self, status: Status, content_type: ContentType, body: impl Into<Bytes>) {
        self.response.write(status.code(), content_type.as_str(), body.into());
    }

    /// Redirects to `location`. Non-3xx statuses are replaced by `302 Found`.
    pub fn redirect(&mut self, status: Status, location: &str) {
        let status = if status.is_redirect() { status } else { Status::Found };
        self.response.status = status.code();
        self.response.set_header("location", location);
        self.response.clear_body();
    }

    /// Sends the file at `path` with a content type guessed from its
    /// extension.
    pub async fn file(&mut self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        let contents = tokio::fs::read(path).await?;
        self.response.write(Status::Ok.code(), content_type_for(path), contents.into());
        Ok(())
    }

    /// Like [`file`](Self::file) but asks the client to save it. `filename`
    /// defaults to the last path component.
    pub async fn file_attachment(
        &mut self,
        path: impl AsRef<Path>,
        filename: Option<&str>,
    ) -> std::io::Result<()> {
        let path = path.as_ref();
        self.file(path).await?;
        let name = filename
            .map(str::to_owned)
            .or_else(|| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "download".to_owned());
        let disposition = format!("attachment; filename=\"{}\"", name.replace('"', "\\\""));
        self.response.set_header("content-disposition", &disposition);
        Ok(())
    }

    /// Streams `reader` as the response body.
    ///
    /// The reader is pumped by a background task, so the handler returns
    /// before the body is complete. A read error ends the body early.
    pub fn stream<R>(&mut self, status: Status, content_type: ContentType, mut reader: R)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.stream_with(status, content_type, |body| async move {
            let mut buf = BytesMut::with_capacity(READ_CHUNK);
            loop {
                buf.reserve(READ_CHUNK);
                match reader.read_buf(&mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        if body.write(buf.split().freeze()).await.is_err() {
                            debug!("client went away mid-stream");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "stream source failed");
                        break;
                    }
                }
            }
        });
    }

    /// Streams whatever `producer` writes. The producer runs on its own
    /// task and the body ends when it returns.
    pub fn stream_with<F, Fut>(&mut self, status: Status, content_type: ContentType, producer: F)
    where
        F: FnOnce(BodyWriter) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        self.response.write_stream(status.code(), content_type.as_str(), rx);
        tokio::spawn(producer(BodyWriter::new(tx)));
    }

    /// Answers with a server-sent event stream fed by `producer`.
    pub fn sse<F, Fut>(&mut self, producer: F)
    where
        F: FnOnce(SseWriter) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.response.set_header("cache-control", "no-cache");
        self.response.set_header("x-accel-buffering", "no");
        self.stream_with(Status::Ok, ContentType::EventStream, |body| producer(SseWriter::new(body)));
    }
}
