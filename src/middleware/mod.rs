//! Built-in middleware.
//!
//! Every middleware here is an ordinary [`Handler`](crate::Handler): it
//! does some work, awaits [`Context::next`](crate::Context::next) to run
//! the rest of the chain, then optionally touches the response on the way
//! out. Each one is built from a config struct with a sensible `Default`:
//!
//! ```rust
//! use std::time::Duration;
//! use waypost::Engine;
//! use waypost::middleware::{self, TimeoutConfig};
//!
//! let mut app = Engine::new();
//! app.use_middleware([
//!     middleware::logger(Default::default()),
//!     middleware::recovery(Default::default()),
//!     middleware::timeout(TimeoutConfig { duration: Duration::from_secs(5), ..Default::default() }),
//! ]);
//! ```
//!
//! Order matters: `recovery` only catches panics from handlers that run
//! after it, and `logger` only sees the final status of what runs after it.
//!
//! Root middleware also wraps the not-found chain, so `cors` registered on
//! the engine answers preflight requests even for paths with no `OPTIONS`
//! route.

mod cors;
mod logger;
mod recovery;
mod secure;
mod timeout;

pub use cors::{CorsConfig, cors};
pub use logger::{LoggerConfig, logger};
pub use recovery::{RecoveryConfig, recovery};
pub use secure::{SecureConfig, secure};
pub use timeout::{TimeoutConfig, timeout};
