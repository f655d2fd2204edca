//! Unified error types.

use serde::Serialize;
use thiserror::Error;

/// The error type returned by waypost's fallible infrastructure operations.
///
/// Application-level failures (404, 422, etc.) are expressed as HTTP
/// responses written through the [`Context`](crate::Context), not as
/// `Error`s. This type surfaces binding, accepting and route-table failures.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address: {0}")]
    Addr(#[from] std::net::AddrParseError),

    #[error(transparent)]
    Route(#[from] RouteError),
}

/// A route that cannot be added to the table.
///
/// Every variant is a configuration mistake. Once registration returns one
/// of these the route table is not servable; fix the pattern and restart.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("route `{path}` must begin with '/'")]
    MissingLeadingSlash { path: String },

    #[error("handlers are already registered for route `{path}`")]
    Duplicate { path: String },

    #[error("`{segment}` in route `{path}` conflicts with existing wildcard `{existing}`")]
    WildcardConflict {
        path: String,
        segment: String,
        existing: String,
    },

    #[error("wildcard `{segment}` in route `{path}` conflicts with existing children")]
    ConflictsWithChildren { path: String, segment: String },

    #[error("only one wildcard per path segment is allowed in route `{path}`")]
    MultipleWildcards { path: String },

    #[error("wildcards must be named with a non-empty name in route `{path}`")]
    UnnamedWildcard { path: String },

    #[error("catch-all is only allowed as the final segment in route `{path}`")]
    CatchAllNotLast { path: String },

    #[error("catch-all must directly follow a '/' in route `{path}`")]
    CatchAllWithoutSlash { path: String },

    #[error("catch-all in route `{path}` conflicts with the handlers registered at its root")]
    CatchAllConflict { path: String },

    #[error("route `{path}` has no handlers")]
    NoHandlers { path: String },
}

/// JSON body used by the built-in error responses.
///
/// ```json
/// {"code":404,"message":"Not Found"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpError {
    pub code: u16,
    pub message: String,
}

impl HttpError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}
