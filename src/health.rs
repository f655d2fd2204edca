//! Built-in Kubernetes health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Register them on the engine:
//!
//! ```rust
//! use waypost::{Engine, handler_fn, health};
//!
//! let mut app = Engine::new();
//! app.get("/healthz", [handler_fn(health::liveness)]).unwrap()
//!    .get("/readyz", [handler_fn(health::readiness)]).unwrap();
//! ```
//!
//! Swap `readiness` for your own handler to gate on dependencies:
//!
//! ```rust
//! use waypost::{BoxFuture, Context, Status};
//!
//! fn readiness(ctx: &mut Context) -> BoxFuture<'_> {
//!     Box::pin(async move {
//!         if dependencies_are_healthy().await {
//!             ctx.text(Status::Ok, "ready");
//!         } else {
//!             ctx.error(Status::ServiceUnavailable, "");
//!         }
//!     })
//! }
//!
//! async fn dependencies_are_healthy() -> bool { true }
//! ```

use crate::context::Context;
use crate::handler::BoxFuture;
use crate::status::Status;

/// Liveness check. Always `200 OK` with body `"ok"`.
pub fn liveness(ctx: &mut Context) -> BoxFuture<'_> {
    Box::pin(async move { ctx.text(Status::Ok, "ok") })
}

/// Readiness check. Always `200 OK` with body `"ready"`.
pub fn readiness(ctx: &mut Context) -> BoxFuture<'_> {
    Box::pin(async move { ctx.text(Status::Ok, "ready") })
}
