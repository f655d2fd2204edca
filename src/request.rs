//! Incoming HTTP request type.

use std::net::SocketAddr;

use bytes::Bytes;
use cookie::Cookie;

use crate::method::Method;

/// An incoming HTTP request, already read off the connection.
///
/// The server builds one per request; tests and embedders build them with
/// [`Request::new`] and the `with_*` methods:
///
/// ```rust
/// use waypost::{Method, Request};
///
/// let req = Request::new(Method::Post, "/users?notify=1")
///     .with_header("content-type", "application/json")
///     .with_body(r#"{"name":"alice"}"#);
///
/// assert_eq!(req.path(), "/users");
/// assert_eq!(req.query("notify").as_deref(), Some("1"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: Vec<(String, String)>,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    /// `target` is the request target: a path with an optional `?query`.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_owned())),
            None => (target, None),
        };
        Self {
            method,
            path: path.to_owned(),
            query,
            headers: Vec::new(),
            body: Bytes::new(),
            remote_addr: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn query_string(&self) -> Option<&str> { self.query.as_deref() }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Case-insensitive header lookup. Returns the first value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// First value of a query-string parameter, percent-decoded.
    pub fn query(&self, key: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Value of a form field: the `application/x-www-form-urlencoded`
    /// body first, then the query string.
    pub fn form_value(&self, key: &str) -> Option<String> {
        let is_form = self.header("content-type")
            .and_then(|v| v.split(';').next())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"));
        if is_form {
            let found = url::form_urlencoded::parse(&self.body)
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned());
            if found.is_some() {
                return found;
            }
        }
        self.query(key)
    }

    /// Value of the cookie `name` from the `Cookie` header(s).
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers.iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("cookie"))
            .flat_map(|(_, v)| Cookie::split_parse(v.as_str()))
            .filter_map(Result::ok)
            .find(|c| c.name() == name)
            .map(|c| c.value().to_owned())
    }

    /// Best guess at the originating client address.
    ///
    /// Checks the first hop of `X-Forwarded-For`, then `X-Real-IP`, then
    /// falls back to the peer address. The forwarded headers are only
    /// trustworthy behind a proxy that overwrites them.
    pub fn client_ip(&self) -> Option<String> {
        let forwarded = self.header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return Some(ip.to_owned());
        }
        if let Some(ip) = self.header("x-real-ip").map(str::trim).filter(|v| !v.is_empty()) {
            return Some(ip.to_owned());
        }
        self.remote_addr.map(|addr| addr.ip().to_string())
    }
}

/// `GET` with an empty path. Stands in for a finished request in pooled
/// contexts.
impl Default for Request {
    fn default() -> Self {
        Self {
            method: Method::Get,
            path: String::new(),
            query: None,
            headers: Vec::new(),
            body: Bytes::new(),
            remote_addr: None,
        }
    }
}
