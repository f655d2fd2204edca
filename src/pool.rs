//! Free list of request contexts.
//!
//! Each [`Engine`](crate::Engine) owns one pool; there is no process-wide
//! state, so engines built side by side in tests never share contexts.

use parking_lot::Mutex;

use crate::context::Context;
use crate::request::Request;

/// Idle contexts kept around once a burst of traffic subsides.
const MAX_IDLE: usize = 1024;

pub(crate) struct ContextPool {
    idle: Mutex<Vec<Box<Context>>>,
    max_idle: usize,
}

impl ContextPool {
    pub(crate) fn new() -> Self {
        Self::with_capacity(MAX_IDLE)
    }

    pub(crate) fn with_capacity(max_idle: usize) -> Self {
        Self { idle: Mutex::new(Vec::new()), max_idle }
    }

    /// Hands out a context reset for `request`. The caller owns it
    /// exclusively until [`release`](Self::release).
    pub(crate) fn acquire(&self, request: Request) -> Box<Context> {
        let recycled = self.idle.lock().pop();
        match recycled {
            Some(mut ctx) => {
                ctx.reset(request);
                ctx
            }
            None => Box::new(Context::new(request)),
        }
    }

    /// Takes a finished context back. Its request, store and response are
    /// dropped here, not when the context is next handed out.
    pub(crate) fn release(&self, mut ctx: Box<Context>) {
        ctx.recycle();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(ctx);
        }
    }

    #[cfg(test)]
    pub(crate) fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}

impl Default for ContextPool {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::method::Method;
    use crate::status::Status;

    #[test]
    fn reused_context_starts_clean() {
        let pool = ContextPool::new();

        let mut ctx = pool.acquire(Request::new(Method::Get, "/users/7"));
        ctx.params.insert("id", "7");
        ctx.set("user", "alice".to_owned());
        ctx.abort_with_status(Status::Unauthorized);
        let first: *const Context = &*ctx;
        pool.release(ctx);

        let ctx = pool.acquire(Request::new(Method::Post, "/other"));
        assert_eq!(&*ctx as *const Context, first);
        assert!(ctx.params().is_empty());
        assert!(ctx.get::<String>("user").is_none());
        assert!(!ctx.is_aborted());
        assert_eq!(ctx.response().status(), 200);
        assert_eq!(ctx.path(), "/other");
    }

    #[test]
    fn release_drops_request_state() {
        let pool = ContextPool::new();
        let shared = Arc::new("session".to_owned());

        let mut ctx = pool.acquire(Request::new(Method::Post, "/upload").with_body("large body"));
        ctx.set("shared", Arc::clone(&shared));
        ctx.text(Status::Ok, "done");
        pool.release(ctx);

        assert_eq!(Arc::strong_count(&shared), 1);
        let idle = pool.idle.lock();
        let parked = idle.last().unwrap();
        assert!(parked.body().is_empty());
        assert!(parked.response().body().is_empty());
        assert!(parked.get::<Arc<String>>("shared").is_none());
    }

    #[test]
    fn concurrent_acquires_get_distinct_contexts() {
        let pool = ContextPool::new();
        let a = pool.acquire(Request::new(Method::Get, "/a"));
        let b = pool.acquire(Request::new(Method::Get, "/b"));
        assert!(!std::ptr::eq(&*a, &*b));
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn idle_list_is_capped() {
        let pool = ContextPool::with_capacity(1);
        let a = pool.acquire(Request::new(Method::Get, "/"));
        let b = pool.acquire(Request::new(Method::Get, "/"));
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.idle(), 1);
    }
}
