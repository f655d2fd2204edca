//! # waypost
//!
//! Radix-tree routing and middleware chains for HTTP services.
//!
//! ## The pieces
//!
//! - [`RouteTree`]: one per method. Literal segments, `:param` segments
//!   and a trailing `*catch_all`, matched in a single pass with no
//!   backtracking. Conflicting patterns are rejected at registration.
//! - [`Group`]: a path prefix plus inherited middleware. Exists only while
//!   routes are being registered.
//! - [`Engine`]: owns the trees and a pool of [`Context`]s. Runs exactly one
//!   chain per request.
//! - [`Context`]: parameters, a key/value store and the cursor that walks
//!   the chain. Middleware awaits [`Context::next`] to run what comes after
//!   it and can [`abort`](Context::abort) to stop the chain. Responses are
//!   buffered or streamed; [`Context::sse`] speaks server-sent events.
//! - [`Server`]: hyper on tokio, with graceful shutdown.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use waypost::{BoxFuture, Context, Engine, Server, Status, handler_fn, middleware};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), waypost::Error> {
//!     let mut app = Engine::new();
//!     app.use_middleware([
//!         middleware::logger(Default::default()),
//!         middleware::recovery(Default::default()),
//!     ]);
//!
//!     let mut api = app.group("/api", [handler_fn(require_token)]);
//!     api.get("/users/:id", [handler_fn(get_user)])?;
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//!
//! fn require_token(ctx: &mut Context) -> BoxFuture<'_> {
//!     Box::pin(async move {
//!         if ctx.request_header("authorization").is_none() {
//!             ctx.error(Status::Unauthorized, "missing token");
//!         }
//!     })
//! }
//!
//! fn get_user(ctx: &mut Context) -> BoxFuture<'_> {
//!     Box::pin(async move {
//!         let id = ctx.param("id").unwrap_or_default().to_owned();
//!         ctx.json(Status::Ok, &serde_json::json!({ "id": id }));
//!     })
//! }
//! ```
//!
//! ## Patterns
//!
//! | Pattern | Path | Params |
//! |---|---|---|
//! | `/users/:id` | `/users/42` | `id = "42"` |
//! | `/users/:id` | `/users/` | no match |
//! | `/v:version/info` | `/v2/info` | `version = "2"` |
//! | `/files/*rest` | `/files/a/b.txt` | `rest = "a/b.txt"` |
//! | `/files/*rest` | `/files/` | `rest = ""` |

mod context;
mod engine;
mod error;
mod group;
mod handler;
mod method;
mod params;
mod pool;
mod request;
mod response;
mod server;
mod status;
mod stream;
mod tree;

pub mod health;
pub mod middleware;

pub use context::Context;
pub use engine::{Engine, MODE_ENV, Mode, UnknownMode};
pub use error::{Error, HttpError, RouteError};
pub use group::Group;
pub use handler::{BoxFuture, Chain, Handler, HandlerFn, handler_fn};
pub use method::{Method, UnknownMethod};
pub use params::Params;
pub use request::Request;
pub use response::{ContentType, HttpBody, Response};
pub use server::Server;
pub use status::Status;
pub use stream::{BodyWriter, SseWriter, StreamError};
pub use tree::{Match, RouteTree};

pub use cookie::{Cookie, SameSite};
