//! Request deadline.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::context::Context;
use crate::handler::{BoxFuture, Handler, HandlerFn};
use crate::status::Status;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for [`timeout`].
#[derive(Clone)]
pub struct TimeoutConfig {
    /// Deadline for the rest of the chain. Zero means the 30 second default.
    pub duration: Duration,
    /// Runs when the deadline passes. `None` sends a `408` JSON error.
    pub on_timeout: Option<HandlerFn>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { duration: DEFAULT_TIMEOUT, on_timeout: None }
    }
}

/// Races the rest of the chain against `config.duration`.
///
/// When the deadline wins, the pending chain future is dropped, which
/// cancels it at its next `.await`. Whatever the cancelled handlers had
/// written, headers included, is discarded and the context is aborted before
/// the timeout response is built from scratch. Blocking synchronous work inside a handler
/// is not interrupted: it holds its worker thread until it returns. Move
/// such work to `tokio::task::spawn_blocking`.
pub fn timeout(mut config: TimeoutConfig) -> HandlerFn {
    if config.duration.is_zero() {
        config.duration = DEFAULT_TIMEOUT;
    }
    Arc::new(Timeout { config })
}

struct Timeout {
    config: TimeoutConfig,
}

impl Handler for Timeout {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a> {
        Box::pin(async move {
            if tokio::time::timeout(self.config.duration, ctx.next()).await.is_ok() {
                return;
            }
            warn!(
                method = %ctx.method(),
                path = %ctx.path(),
                timeout_ms = self.config.duration.as_millis() as u64,
                "request timed out"
            );
            ctx.clear_response();
            ctx.abort();
            match &self.config.on_timeout {
                Some(handler) => handler.call(ctx).await,
                None => ctx.error(Status::RequestTimeout, ""),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::method::Method;
    use crate::middleware::testing::{reply, run};
    use crate::request::Request;

    fn slow() -> HandlerFn {
        handler_fn(|ctx| Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            ctx.text(Status::Ok, "too late");
        }))
    }

    fn short() -> TimeoutConfig {
        TimeoutConfig { duration: Duration::from_millis(20), on_timeout: None }
    }

    #[tokio::test]
    async fn slow_chain_gets_408() {
        let ctx = run(vec![timeout(short()), slow()], Request::new(Method::Get, "/")).await;
        assert_eq!(ctx.response().status(), 408);
        assert_eq!(
            ctx.response().body().as_ref(),
            br#"{"code":408,"message":"Request Timeout"}"#
        );
        assert!(ctx.is_aborted());
    }

    #[tokio::test]
    async fn custom_timeout_handler() {
        let config = TimeoutConfig {
            on_timeout: Some(handler_fn(|ctx| Box::pin(async move {
                ctx.text(Status::ServiceUnavailable, "busy");
            }))),
            ..short()
        };
        let ctx = run(vec![timeout(config), slow()], Request::new(Method::Get, "/")).await;
        assert_eq!(ctx.response().status(), 503);
        assert_eq!(ctx.response().body().as_ref(), b"busy");
    }

    #[tokio::test]
    async fn timeout_response_drops_partial_headers() {
        let login = handler_fn(|ctx| Box::pin(async move {
            ctx.header("set-cookie", "session=abc");
            ctx.header("x-partial", "1");
            tokio::time::sleep(Duration::from_secs(5)).await;
        }));
        let ctx = run(vec![timeout(short()), login], Request::new(Method::Get, "/")).await;
        assert_eq!(ctx.response().status(), 408);
        assert_eq!(ctx.response().header("set-cookie"), None);
        assert_eq!(ctx.response().header("x-partial"), None);
        assert_eq!(ctx.response().header("content-type"), Some("application/json"));
    }

    #[tokio::test]
    async fn zero_duration_means_the_default() {
        let brief = handler_fn(|ctx| Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            ctx.text(Status::Ok, "made it");
        }));
        let config = TimeoutConfig { duration: Duration::ZERO, on_timeout: None };
        let ctx = run(vec![timeout(config), brief], Request::new(Method::Get, "/")).await;
        assert_eq!(ctx.response().status(), 200);
        assert_eq!(ctx.response().body().as_ref(), b"made it");
    }

    #[tokio::test]
    async fn fast_chain_is_untouched() {
        let ctx = run(vec![timeout(short()), reply("quick")], Request::new(Method::Get, "/")).await;
        assert_eq!(ctx.response().status(), 200);
        assert_eq!(ctx.response().body().as_ref(), b"quick");
        assert!(!ctx.is_aborted());
    }
}
