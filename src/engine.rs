//! The engine: route table, root middleware and request dispatch.
//!
//! Build it once at startup, then share it behind an `Arc`:
//!
//! ```rust,no_run
//! use waypost::{Engine, Server, Status, handler_fn, middleware};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), waypost::Error> {
//!     let mut app = Engine::new();
//!     app.use_middleware([middleware::logger(Default::default())]);
//!     app.get("/users/:id", [handler_fn(|ctx| Box::pin(async move {
//!         let id = ctx.param("id").unwrap_or_default().to_owned();
//!         ctx.text(Status::Ok, id);
//!     }))])?;
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::context::Context;
use crate::error::RouteError;
use crate::group::{Group, join_paths, route_shortcuts};
use crate::handler::{BoxFuture, Chain, HandlerFn, combine, handler_fn};
use crate::method::Method;
use crate::pool::ContextPool;
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;
use crate::tree::RouteTree;

/// Environment variable read by [`Mode::from_env`].
pub const MODE_ENV: &str = "WAYPOST_MODE";

// ── Mode ──────────────────────────────────────────────────────────────────────

/// Controls how chatty the engine is.
///
/// `Debug` logs every registered route and a one-line summary per
/// request. `Release` logs neither.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Mode {
    #[default]
    Debug,
    Release,
}

impl Mode {
    /// Reads [`MODE_ENV`]. Missing or unrecognised values give `Debug`.
    pub fn from_env() -> Self {
        std::env::var(MODE_ENV)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug   => "debug",
            Self::Release => "release",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown mode `{0}`, expected `debug` or `release`")]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug"   => Ok(Self::Debug),
            "release" => Ok(Self::Release),
            _         => Err(UnknownMode(s.to_owned())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// The application: one route tree per method and a context pool.
///
/// The engine is also the root group. Middleware added with
/// [`use_middleware`](Engine::use_middleware) is prepended to every route
/// registered afterwards and to the not-found chain.
pub struct Engine {
    trees: HashMap<Method, RouteTree>,
    middleware: Vec<HandlerFn>,
    no_route: Vec<HandlerFn>,
    not_found: Chain,
    pool: ContextPool,
    mode: Mode,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("mode", &self.mode).finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new() -> Self {
        let mut engine = Self {
            trees: HashMap::new(),
            middleware: Vec::new(),
            no_route: Vec::new(),
            not_found: Arc::from(Vec::new()),
            pool: ContextPool::new(),
            mode: Mode::from_env(),
        };
        engine.rebuild_not_found();
        engine
    }

    pub fn mode(&self) -> Mode { self.mode }

    pub fn set_mode(&mut self, mode: Mode) -> &mut Self {
        self.mode = mode;
        self
    }

    /// Appends root middleware.
    pub fn use_middleware(&mut self, middleware: impl IntoIterator<Item = HandlerFn>) -> &mut Self {
        self.middleware.extend(middleware);
        self.rebuild_not_found();
        self
    }

    /// Replaces the handlers run when no route matches. Root middleware
    /// still runs first. With no handlers set, a `404` JSON error is sent.
    pub fn no_route(&mut self, handlers: impl IntoIterator<Item = HandlerFn>) -> &mut Self {
        self.no_route = handlers.into_iter().collect();
        self.rebuild_not_found();
        self
    }

    fn rebuild_not_found(&mut self) {
        let tail = if self.no_route.is_empty() {
            vec![handler_fn(not_found)]
        } else {
            self.no_route.clone()
        };
        self.not_found = combine(&self.middleware, tail).into();
    }

    /// A group under `prefix`, inheriting the root middleware.
    pub fn group(&mut self, prefix: &str, middleware: impl IntoIterator<Item = HandlerFn>) -> Group<'_> {
        let base_path = join_paths("/", prefix);
        let handlers = combine(&self.middleware, middleware);
        Group::new(self, base_path, handlers)
    }

    /// Registers `handlers`, preceded by the root middleware, for `method`
    /// at `path`.
    pub fn route(
        &mut self,
        method: Method,
        path: &str,
        handlers: impl IntoIterator<Item = HandlerFn>,
    ) -> Result<&mut Self, RouteError> {
        let absolute = join_paths("/", path);
        let chain = combine(&self.middleware, handlers);
        self.add_route(method, &absolute, chain.into())?;
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

    /// See [`Group::static_dir`].
    pub fn static_dir(&mut self, prefix: &str, root: impl Into<PathBuf>) -> Result<&mut Self, RouteError> {
        self.group("", Vec::new()).static_dir(prefix, root)?;
        Ok(self)
    }

    /// Inserts a finished chain into the tree for `method`. `path` is used
    /// as given; groups and shortcuts have already made it absolute.
    pub fn add_route(&mut self, method: Method, path: &str, chain: Chain) -> Result<(), RouteError> {
        if chain.is_empty() {
            return Err(RouteError::NoHandlers { path: path.to_owned() });
        }
        let handlers = chain.len();
        self.trees.entry(method).or_default().insert(path, chain)?;
        if self.mode == Mode::Debug {
            info!(%method, path, handlers, "route registered");
        }
        Ok(())
    }

    /// Every registered `(method, pattern)` pair, grouped by method.
    pub fn routes(&self) -> Vec<(Method, Arc<str>)> {
        let mut routes: Vec<_> = self.trees.iter()
            .flat_map(|(method, tree)| tree.patterns().into_iter().map(|p| (*method, p)))
            .collect();
        routes.sort_by_key(|(method, _)| method.as_str());
        routes
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    /// Runs exactly one chain for `request` and returns its response.
    ///
    /// The matched route's chain runs when the lookup succeeds, the
    /// not-found chain otherwise. A panicking handler unwinds through here;
    /// its context is dropped instead of going back to the pool.
    pub async fn handle(&self, request: Request) -> Response {
        let started = Instant::now();
        let mut ctx = self.pool.acquire(request);

        let method = ctx.method();
        let found = {
            let ctx: &mut Context = &mut ctx;
            self.trees
                .get(&method)
                .and_then(|tree| tree.find(ctx.request.path(), &mut ctx.params))
        };
        match found {
            Some((chain, pattern)) => ctx.install(Arc::clone(chain), Some(Arc::clone(pattern))),
            None => ctx.install(Arc::clone(&self.not_found), None),
        }

        ctx.next().await;
        let response = ctx.take_response();

        if self.mode == Mode::Debug {
            debug!(
                %method,
                path = %ctx.path(),
                status = response.status(),
                elapsed_us = started.elapsed().as_micros() as u64,
                "request handled"
            );
        }

        self.pool.release(ctx);
        response
    }
}

impl Default for Engine {
    fn default() -> Self { Self::new() }
}

fn not_found(ctx: &mut Context) -> BoxFuture<'_> {
    Box::pin(async move { ctx.error(Status::NotFound, "") })
}
