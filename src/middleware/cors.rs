//! Cross-origin resource sharing.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::context::Context;
use crate::handler::{BoxFuture, Handler, HandlerFn};
use crate::method::Method;
use crate::status::Status;

/// Configuration for [`cors`].
#[derive(Clone, Debug)]
pub struct CorsConfig {
    /// Allowed origins. `"*"` allows any origin.
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<Method>,
    pub allow_headers: Vec<String>,
    /// Response headers scripts may read.
    pub expose_headers: Vec<String>,
    pub allow_credentials: bool,
    /// How long browsers may cache a preflight result.
    pub max_age: Option<Duration>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".into()],
            allow_methods: vec![
                Method::Get,
                Method::Post,
                Method::Put,
                Method::Patch,
                Method::Delete,
                Method::Head,
                Method::Options,
            ],
            allow_headers: ["Origin", "Content-Type", "Accept", "Authorization"]
                .map(String::from)
                .to_vec(),
            expose_headers: Vec::new(),
            allow_credentials: false,
            max_age: Some(Duration::from_secs(3600)),
        }
    }
}

/// Applies `config` to cross-origin requests.
///
/// - Requests without an `Origin` header pass through untouched.
/// - A disallowed origin is aborted with `403`.
/// - A preflight (`OPTIONS` carrying `Access-Control-Request-Method`) is
///   answered with `204` and the rest of the chain is skipped.
/// - Any other request gets the allow/expose headers and continues.
///
/// With credentials enabled, a wildcard origin echoes the caller's
/// `Origin` instead of `*`, which browsers would reject.
pub fn cors(config: CorsConfig) -> HandlerFn {
    let join = |items: &[String]| items.join(", ");
    let methods: Vec<&str> = config.allow_methods.iter().map(|m| m.as_str()).collect();
    Arc::new(Cors {
        any_origin: config.allow_origins.iter().any(|o| o == "*"),
        allow_methods: methods.join(", "),
        allow_headers: join(&config.allow_headers),
        expose_headers: join(&config.expose_headers),
        max_age: config.max_age.map(|age| age.as_secs().to_string()),
        allow_origins: config.allow_origins,
        allow_credentials: config.allow_credentials,
    })
}

struct Cors {
    allow_origins: Vec<String>,
    any_origin: bool,
    allow_methods: String,
    allow_headers: String,
    expose_headers: String,
    allow_credentials: bool,
    max_age: Option<String>,
}

impl Cors {
    fn allows(&self, origin: &str) -> bool {
        self.any_origin || self.allow_origins.iter().any(|o| o == origin)
    }

    /// Value for `Access-Control-Allow-Origin`.
    fn allow_origin_value<'o>(&self, origin: &'o str) -> &'o str {
        if self.any_origin && !self.allow_credentials { "*" } else { origin }
    }
}

impl Handler for Cors {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a> {
        Box::pin(async move {
            let Some(origin) = ctx.request_header("origin").map(str::to_owned) else {
                return;
            };

            if !self.allows(&origin) {
                debug!(%origin, path = %ctx.path(), "cors origin rejected");
                ctx.error(Status::Forbidden, "origin not allowed");
                return;
            }

            let allow_origin = self.allow_origin_value(&origin);
            ctx.header("access-control-allow-origin", allow_origin);
            if allow_origin != "*" {
                ctx.header("vary", "Origin");
            }
            if self.allow_credentials {
                ctx.header("access-control-allow-credentials", "true");
            }

            let preflight = ctx.method() == Method::Options
                && ctx.request_header("access-control-request-method").is_some();
            if preflight {
                ctx.header("access-control-allow-methods", &self.allow_methods);
                ctx.header("access-control-allow-headers", &self.allow_headers);
                if let Some(max_age) = &self.max_age {
                    ctx.header("access-control-max-age", max_age);
                }
                ctx.abort_with_status(Status::NoContent);
                return;
            }

            if !self.expose_headers.is_empty() {
                ctx.header("access-control-expose-headers", &self.expose_headers);
            }
        })
    }
}
