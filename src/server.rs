//! HTTP transport and graceful shutdown.
//!
//! The server owns the socket; the [`Engine`] owns everything else. Each
//! hyper request is read fully, converted into a [`Request`], handed to
//! [`Engine::handle`] and the resulting [`Response`](crate::Response)
//! written back. Streamed responses keep flowing after the handler chain
//! has returned.
//!
//! # Graceful shutdown
//!
//! On SIGTERM (or Ctrl-C) the server:
//! 1. stops accepting new connections;
//! 2. lets every in-flight connection task finish;
//! 3. returns from [`Server::serve`].
//!
//! Under Kubernetes, set `terminationGracePeriodSeconds` above your slowest
//! request.

use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::engine::Engine;
use crate::error::{Error, HttpError};
use crate::method::Method;
use crate::request::Request;
use crate::response::{ContentType, HttpBody, Response};
use crate::status::Status;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Parses `addr` (`host:port`). Nothing is bound until
    /// [`serve`](Server::serve).
    ///
    /// ```rust
    /// use waypost::Server;
    ///
    /// assert!(Server::bind("0.0.0.0:3000").is_ok());
    /// assert!(Server::bind("not an address").is_err());
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        Ok(Self { addr: addr.parse()? })
    }

    pub fn addr(&self) -> SocketAddr { self.addr }

    /// Serves `engine` until SIGTERM or Ctrl-C, then drains in-flight
    /// connections.
    pub async fn serve(self, engine: Engine) -> Result<(), Error> {
        self.serve_with_shutdown(engine, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve) but stops when `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, engine: Engine, signal: F) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind(self.addr).await?;
        let engine = Arc::new(engine);

        info!(addr = %self.addr, mode = %engine.mode(), "waypost listening");

        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Checked first so a pending signal wins over queued accepts.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let engine = Arc::clone(&engine);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let engine = Arc::clone(&engine);
                            async move { dispatch(engine, req, remote_addr).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished tasks so the set stays small.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("waypost stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Converts one hyper request, runs it through the engine and converts the
/// response back. Never fails: transport problems become 4xx responses.
async fn dispatch<B>(
    engine: Arc<Engine>,
    req: hyper::Request<B>,
    remote_addr: SocketAddr,
) -> Result<http::Response<HttpBody>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    let (parts, body) = req.into_parts();

    let Ok(method) = Method::try_from(&parts.method) else {
        return Ok(reject(Status::MethodNotAllowed));
    };

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(peer = %remote_addr, "failed to read request body: {e}");
            return Ok(reject(Status::BadRequest));
        }
    };

    let target = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    let mut request = Request::new(method, target)
        .with_body(body)
        .with_remote_addr(remote_addr);
    for (name, value) in &parts.headers {
        match value.to_str() {
            Ok(value) => request = request.with_header(name.as_str(), value),
            Err(_) => warn!(header = %name, "skipping non-ASCII request header"),
        }
    }

    Ok(engine.handle(request).await.into_http())
}

/// A JSON error response for requests the engine never sees.
fn reject(status: Status) -> http::Response<HttpBody> {
    let body = serde_json::to_vec(&HttpError::new(status.code(), status.reason()))
        .unwrap_or_default();
    let mut res = Response::default();
    res.write(status.code(), ContentType::Json.as_str(), body.into());
    res.into_http()
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on SIGTERM or SIGINT (Ctrl-C). Windows only has Ctrl-C.
///
/// A listener that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
