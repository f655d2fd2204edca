//! Security response headers.

use std::sync::Arc;
use std::time::Duration;

use crate::context::Context;
use crate::handler::{BoxFuture, Handler, HandlerFn};

/// Configuration for [`secure`]. `None` omits the header.
#[derive(Clone, Debug)]
pub struct SecureConfig {
    pub xss_protection: Option<String>,
    pub content_type_nosniff: bool,
    pub frame_options: Option<String>,
    pub hsts_max_age: Option<Duration>,
    pub hsts_include_subdomains: bool,
    pub hsts_preload: bool,
    pub content_security_policy: Option<String>,
    pub referrer_policy: Option<String>,
    pub permissions_policy: Option<String>,
}

impl Default for SecureConfig {
    fn default() -> Self {
        Self {
            xss_protection: Some("1; mode=block".into()),
            content_type_nosniff: true,
            frame_options: Some("SAMEORIGIN".into()),
            hsts_max_age: Some(Duration::from_secs(31_536_000)),
            hsts_include_subdomains: false,
            hsts_preload: false,
            content_security_policy: None,
            referrer_policy: Some("strict-origin-when-cross-origin".into()),
            permissions_policy: None,
        }
    }
}

impl SecureConfig {
    /// Locked-down settings: no framing, two-year preloaded HSTS, a
    /// same-origin CSP and no referrer.
    pub fn strict() -> Self {
        Self {
            xss_protection: Some("1; mode=block".into()),
            content_type_nosniff: true,
            frame_options: Some("DENY".into()),
            hsts_max_age: Some(Duration::from_secs(63_072_000)),
            hsts_include_subdomains: true,
            hsts_preload: true,
            content_security_policy: Some("default-src 'self'".into()),
            referrer_policy: Some("no-referrer".into()),
            permissions_policy: Some("geolocation=(), microphone=(), camera=()".into()),
        }
    }

    fn headers(self) -> Vec<(&'static str, String)> {
        let hsts = self.hsts_max_age.map(|age| {
            let mut value = format!("max-age={}", age.as_secs());
            if self.hsts_include_subdomains {
                value.push_str("; includeSubDomains");
            }
            if self.hsts_preload {
                value.push_str("; preload");
            }
            value
        });
        let nosniff = self.content_type_nosniff.then(|| "nosniff".to_owned());

        [
            ("x-xss-protection", self.xss_protection),
            ("x-content-type-options", nosniff),
            ("x-frame-options", self.frame_options),
            ("strict-transport-security", hsts),
            ("content-security-policy", self.content_security_policy),
            ("referrer-policy", self.referrer_policy),
            ("permissions-policy", self.permissions_policy),
        ]
        .into_iter()
        .filter_map(|(name, value)| Some((name, value?)))
        .collect()
    }
}

/// Adds the configured security headers to every response.
pub fn secure(config: SecureConfig) -> HandlerFn {
    Arc::new(Secure { headers: config.headers() })
}

struct Secure {
    headers: Vec<(&'static str, String)>,
}

impl Handler for Secure {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a> {
        Box::pin(async move {
            for (name, value) in &self.headers {
                ctx.header(name, value);
            }
        })
    }
}
