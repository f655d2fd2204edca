//! Access log.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::context::Context;
use crate::handler::{BoxFuture, Handler, HandlerFn};

/// Configuration for [`logger`].
#[derive(Clone, Debug, Default)]
pub struct LoggerConfig {
    /// Request paths that are never logged, e.g. health checks.
    pub skip_paths: Vec<String>,
}

/// Emits one `tracing` event per request once the rest of the chain has
/// finished: method, path, matched route, status, latency and client IP.
///
/// 5xx responses are logged at `error`, 4xx at `warn`, the rest at `info`.
pub fn logger(config: LoggerConfig) -> HandlerFn {
    Arc::new(Logger { skip: config.skip_paths.into_iter().collect() })
}

struct Logger {
    skip: HashSet<String>,
}

impl Handler for Logger {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a> {
        Box::pin(async move {
            let started = Instant::now();
            ctx.next().await;

            if self.skip.contains(ctx.path()) {
                return;
            }
            let latency_us = started.elapsed().as_micros() as u64;
            let method = ctx.method();
            let path = ctx.path();
            let route = ctx.full_path().unwrap_or("-");
            let status = ctx.response().status();
            let client_ip = ctx.client_ip().unwrap_or_default();

            match status {
                500.. => error!(%method, path, route, status, latency_us, client_ip = %client_ip, "request"),
                400.. => warn!(%method, path, route, status, latency_us, client_ip = %client_ip, "request"),
                _     => info!(%method, path, route, status, latency_us, client_ip = %client_ip, "request"),
            }
        })
    }
}
