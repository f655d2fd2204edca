//! Route groups: a path prefix plus inherited middleware.
//!
//! A group does nothing at request time. At registration it turns a
//! relative path and a handler list into the absolute pattern and the full
//! chain, then hands both to the engine:
//!
//! ```text
//! engine.use_middleware([logger])
//!   └─ group("/api", [auth])
//!        └─ group("/v1", [audit])
//!             └─ get("/users/:id", [show])
//!
//! pattern: /api/v1/users/:id
//! chain:   [logger, auth, audit, show]
//! ```
//!
//! Ancestor middleware always comes before descendant middleware, which
//! always comes before the route's own handlers.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::context::Context;
use crate::engine::Engine;
use crate::error::RouteError;
use crate::handler::{BoxFuture, Handler, HandlerFn, combine};
use crate::method::Method;
use crate::status::Status;

/// Per-method registration shortcuts, shared by [`Engine`] and [`Group`].
/// The implementing type provides `route(method, path, handlers)`.
macro_rules! route_shortcuts {
    ($( $name:ident => $method:ident, $wire:literal; )*) => {
        $(
            #[doc = concat!("Registers a `", $wire, "` route.")]
            pub fn $name(
                &mut self,
                path: &str,
                handlers: impl IntoIterator<Item = $crate::handler::HandlerFn>,
            ) -> Result<&mut Self, $crate::error::RouteError> {
                self.route($crate::method::Method::$method, path, handlers)
            }
        )*

        /// Registers the same handlers for every method in
        /// [`Method::ANY`](crate::Method::ANY).
        pub fn any(
            &mut self,
            path: &str,
            handlers: impl IntoIterator<Item = $crate::handler::HandlerFn>,
        ) -> Result<&mut Self, $crate::error::RouteError> {
            let handlers: Vec<_> = handlers.into_iter().collect();
            for method in $crate::method::Method::ANY {
                self.route(method, path, handlers.iter().cloned())?;
            }
            Ok(self)
        }
    };
}

pub(crate) use route_shortcuts;

/// A registration scope below the engine root.
///
/// Created by [`Engine::group`] or [`Group::group`]; borrows the engine
/// mutably for as long as it is alive.
pub struct Group<'e> {
    engine: &'e mut Engine,
    base_path: String,
    handlers: Vec<HandlerFn>,
}

impl<'e> Group<'e> {
    pub(crate) fn new(engine: &'e mut Engine, base_path: String, handlers: Vec<HandlerFn>) -> Self {
        Self { engine, base_path, handlers }
    }

    /// Absolute prefix of every route registered through this group.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Appends middleware for routes registered from now on.
    pub fn use_middleware(&mut self, middleware: impl IntoIterator<Item = HandlerFn>) -> &mut Self {
        self.handlers.extend(middleware);
        self
    }

    /// A child group under `prefix`, inheriting this group's middleware.
    pub fn group(
        &mut self,
        prefix: &str,
        middleware: impl IntoIterator<Item = HandlerFn>,
    ) -> Group<'_> {
        let base_path = join_paths(&self.base_path, prefix);
        let handlers = combine(&self.handlers, middleware);
        Group::new(&mut *self.engine, base_path, handlers)
    }

    /// Registers `handlers` for `method` at `path`, relative to the group.
    pub fn route(
        &mut self,
        method: Method,
        path: &str,
        handlers: impl IntoIterator<Item = HandlerFn>,
    ) -> Result<&mut Self, RouteError> {
        let absolute = join_paths(&self.base_path, path);
        let chain = combine(&self.handlers, handlers);
        self.engine.add_route(method, &absolute, chain.into())?;
        Ok(self)
    }

    route_shortcuts! {
        get     => Get,     "GET";
        post    => Post,    "POST";
        put     => Put,     "PUT";
        patch   => Patch,   "PATCH";
        delete  => Delete,  "DELETE";
        options => Options, "OPTIONS";
        head    => Head,    "HEAD";
    }

    /// Serves files below `root` at `prefix/*filepath` for `GET` and `HEAD`.
    ///
    /// Request paths containing anything other than plain file or directory
    /// names (`..`, `.`, absolute segments) are answered with 404.
    pub fn static_dir(&mut self, prefix: &str, root: impl Into<PathBuf>) -> Result<&mut Self, RouteError> {
        let pattern = join_paths(prefix, "*filepath");
        let handler: HandlerFn = Arc::new(StaticDir { root: root.into() });
        self.route(Method::Get, &pattern, [Arc::clone(&handler)])?;
        self.route(Method::Head, &pattern, [handler])
    }
}

// ── Static files ──────────────────────────────────────────────────────────────

struct StaticDir {
    root: PathBuf,
}

impl Handler for StaticDir {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a> {
        Box::pin(async move {
            let requested = ctx.param("filepath").unwrap_or_default();
            let Some(path) = resolve(&self.root, requested) else {
                debug!(path = %ctx.path(), "static path rejected");
                ctx.error(Status::NotFound, "");
                return;
            };
            if let Err(e) = ctx.file(&path).await {
                debug!(file = %path.display(), error = %e, "static file unavailable");
                ctx.error(Status::NotFound, "");
            }
        })
    }
}

/// `root` joined with `relative`, or `None` if `relative` could step
/// outside `root`.
fn resolve(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => path.push(part),
            _ => return None,
        }
    }
    Some(path)
}

// ── Path joining ──────────────────────────────────────────────────────────────

/// Joins `base` and `relative` with exactly one `/` between them.
///
/// An empty `relative` returns `base` unchanged; a trailing `/` on
/// `relative` is kept.
pub(crate) fn join_paths(base: &str, relative: &str) -> String {
    if relative.is_empty() {
        return base.to_owned();
    }
    let base = base.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    let mut joined = String::with_capacity(base.len() + relative.len() + 1);
    joined.push_str(base);
    joined.push('/');
    joined.push_str(relative);
    joined
}
