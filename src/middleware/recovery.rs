//! Panic recovery.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::error;

use crate::context::Context;
use crate::handler::{BoxFuture, Handler, HandlerFn};
use crate::status::Status;

/// Configuration for [`recovery`].
#[derive(Clone, Debug, Default)]
pub struct RecoveryConfig {
    /// Put the panic message in the response body. Leave off in
    /// production; the message is always logged.
    pub expose_message: bool,
}

/// Turns a panic in any later handler into a `500` JSON error.
///
/// Without this middleware a panic unwinds the request's task: hyper drops
/// the connection and the engine drops the context.
pub fn recovery(config: RecoveryConfig) -> HandlerFn {
    Arc::new(Recovery { config })
}

struct Recovery {
    config: RecoveryConfig,
}

impl Handler for Recovery {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a> {
        Box::pin(async move {
            let Err(panic) = AssertUnwindSafe(ctx.next()).catch_unwind().await else {
                return;
            };
            let message = panic_message(panic.as_ref());
            error!(
                method = %ctx.method(),
                path = %ctx.path(),
                panic = message,
                "handler panicked"
            );
            let body = if self.config.expose_message { message } else { "" };
            ctx.error(Status::InternalServerError, body);
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::method::Method;
    use crate::middleware::testing::{reply, run};
    use crate::request::Request;

    fn explode() {
        panic!("database on fire");
    }

    fn boom() -> HandlerFn {
        handler_fn(|_ctx| Box::pin(async move { explode() }))
    }

    #[tokio::test]
    async fn panic_becomes_500() {
        let chain = vec![recovery(RecoveryConfig::default()), boom()];
        let ctx = run(chain, Request::new(Method::Get, "/")).await;
        assert_eq!(ctx.response().status(), 500);
        assert!(ctx.is_aborted());
        assert_eq!(
            ctx.response().body().as_ref(),
            br#"{"code":500,"message":"Internal Server Error"}"#
        );
    }

    #[tokio::test]
    async fn message_is_exposed_on_request() {
        let chain = vec![recovery(RecoveryConfig { expose_message: true }), boom()];
        let ctx = run(chain, Request::new(Method::Get, "/")).await;
        assert_eq!(
            ctx.response().body().as_ref(),
            br#"{"code":500,"message":"database on fire"}"#
        );
    }

    #[tokio::test]
    async fn quiet_chain_is_untouched() {
        let chain = vec![recovery(RecoveryConfig::default()), reply("fine")];
        let ctx = run(chain, Request::new(Method::Get, "/")).await;
        assert_eq!(ctx.response().status(), 200);
        assert_eq!(ctx.response().body().as_ref(), b"fine");
    }
}
