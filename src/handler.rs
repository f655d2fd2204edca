//! Handler trait and type erasure.
//!
//! # One capability for everything
//!
//! Route handlers, group middleware and the built-in middleware collaborators
//! are all the same thing: a value with one `call(ctx)` operation. The route
//! tree stores them, groups concatenate them and the context runs them, all
//! through one trait object type, [`HandlerFn`].
//!
//! The chain from user code to vtable call is:
//!
//! ```text
//! |ctx| Box::pin(async move { … })                ← user writes this
//!        ↓ handler_fn(…)
//! Arc::new(closure)                               ← HandlerFn = Arc<dyn Handler>
//!        ↓ group.get("/", [h]) → Chain = Arc<[HandlerFn]>
//! ctx.next()                                      ← cursor picks the next entry
//!        ↓
//! handler.call(ctx).await                         ← one vtable dispatch
//! ```
//!
//! # Why the boxed future borrows the context
//!
//! A middleware does work, awaits `ctx.next()` to run the rest of the chain,
//! then does more work on the same context. The future therefore holds
//! `&mut Context` for its whole life, which is what `BoxFuture<'a>` with the
//! context's lifetime expresses.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;

/// A heap-allocated, type-erased future borrowing the request context.
///
/// `Pin<Box<…>>` is required because the async runtime must be able to poll
/// the future in-place. `Send` lets tokio move the request task across
/// worker threads.
pub type BoxFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// A unit of request-handling behavior.
///
/// A handler must do one of three things: produce a response through the
/// context, call [`Context::next`] to continue the chain, or call one of the
/// abort variants.
///
/// Closures and functions with the signature
/// `for<'a> Fn(&'a mut Context) -> BoxFuture<'a>` implement it automatically;
/// configurable middleware implements it on a struct holding its config.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a> {
        (self)(ctx)
    }
}

/// A shared, type-erased handler.
///
/// `Arc` gives cheap shared ownership: the same middleware instance appears
/// in every chain of a group without being copied.
pub type HandlerFn = Arc<dyn Handler>;

/// The ordered handlers bound to one route: inherited middleware first,
/// route handlers last. Cloning is one atomic increment.
pub type Chain = Arc<[HandlerFn]>;

/// Wraps a closure or function into a [`HandlerFn`].
///
/// Going through this function (rather than `Arc::new`) lets the compiler
/// infer the higher-ranked closure signature:
///
/// ```rust
/// use waypost::{Status, handler_fn};
///
/// let hello = handler_fn(|ctx| Box::pin(async move {
///     ctx.text(Status::Ok, "hello");
/// }));
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// `base` followed by `extra`, as a new vector.
pub(crate) fn combine(base: &[HandlerFn], extra: impl IntoIterator<Item = HandlerFn>) -> Vec<HandlerFn> {
    let extra = extra.into_iter();
    let mut merged = Vec::with_capacity(base.len() + extra.size_hint().0);
    merged.extend(base.iter().cloned());
    merged.extend(extra);
    merged
}
