//! HTTP server.
//!
//! Accepts HTTP/1.1 connections with hyper and feeds every request through a
//! compiled [`Pipeline`]:
//!
//! - the body is collected up to `max_body_bytes` (413 beyond that)
//! - the peer address is attached as a [`PeerAddr`] extension
//! - a fresh [`CallContext`] is created under the server's root
//!   [`CancelSignal`]
//! - the pipeline runs under `request_timeout_ms` (504 when exceeded)
//! - the exchange's response is written back
//!
//! On shutdown the accept loop stops, open connections finish their current
//! request, and the root signal is cancelled once they have drained or the
//! drain timeout expires.
//!
//! # Example
//!
//! ```rust,ignore
//! use pylon_config::ConfigLoader;
//! use pylon_server::{Router, RouterOptions, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().with_env_prefix("PYLON").load()?;
//!     let mut router = Router::new(RouterOptions::from_config(&config));
//!     // router.get(..)
//!     Server::new(config.server.clone(), router.build()?).run().await?;
//!     Ok(())
//! }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use pylon_config::ServerConfig;
use pylon_core::{CallContext, CancelSignal, Exchange, HttpError};
use pylon_middleware::stages::PeerAddr;
use pylon_middleware::Pipeline;
use tokio::net::{TcpListener, TcpStream};

use crate::error::{ServerError, ServerResult};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Response body type written to hyper.
pub type ResponseBody = Full<Bytes>;

/// Response type written to hyper.
pub type HttpResponse = Response<ResponseBody>;

/// Serves a [`Pipeline`] over HTTP/1.1.
pub struct Server {
    config: ServerConfig,
    pipeline: Arc<Pipeline>,
    root: CancelSignal,
}

impl Server {
    /// Creates a server for `pipeline`.
    #[must_use]
    pub fn new(config: ServerConfig, pipeline: Pipeline) -> Self {
        Self {
            config,
            pipeline: Arc::new(pipeline),
            root: CancelSignal::new(),
        }
    }

    /// The server settings.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Root of every request's cancellation scope.
    #[must_use]
    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.root
    }

    /// Binds the configured address and serves until SIGTERM or SIGINT.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run(self) -> ServerResult<()> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Binds the configured address and serves until `shutdown` triggers.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let addr: SocketAddr =
            self.config
                .http_addr
                .parse()
                .map_err(|e: std::net::AddrParseError| ServerError::InvalidAddress {
                    addr: self.config.http_addr.clone(),
                    reason: e.to_string(),
                })?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, shutdown).await
    }

    /// Serves connections from an already bound listener until `shutdown`
    /// triggers.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> ServerResult<()> {
        let local = listener.local_addr()?;
        tracing::info!(addr = %local, "server listening");

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        if tracker.active_connections() >= server.config.max_connections {
                            tracing::warn!(%remote, "connection limit reached, dropping connection");
                            continue;
                        }
                        let token = tracker.acquire();
                        let server = Arc::clone(&server);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server.handle_connection(stream, remote, shutdown).await {
                                tracing::debug!(%remote, error = %e, "connection error");
                            }
                            drop(token);
                        });
                    }
                    Err(e) => tracing::error!(error = %e, "failed to accept connection"),
                },
                () = shutdown.recv() => {
                    tracing::info!("shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }

        let timeout = Duration::from_secs(server.config.shutdown_timeout_secs);
        tracing::info!(
            active = tracker.active_connections(),
            timeout_secs = timeout.as_secs(),
            "draining connections"
        );
        if tokio::time::timeout(timeout, tracker.wait_idle()).await.is_err() {
            tracing::warn!(
                active = tracker.active_connections(),
                "drain timeout reached, cancelling in-flight requests"
            );
        }
        server.root.cancel();

        tracing::info!("server stopped");
        Ok(())
    }

    async fn handle_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        remote: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let server = Arc::clone(self);
        let service = service_fn(move |mut req: Request<Incoming>| {
            let server = Arc::clone(&server);
            req.extensions_mut().insert(PeerAddr(remote));
            async move { Ok::<_, Infallible>(server.handle_request(req).await) }
        });

        let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
        tokio::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.recv() => {
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        }
    }

    async fn handle_request(&self, req: Request<Incoming>) -> HttpResponse {
        let started = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_owned();

        let (parts, body) = req.into_parts();
        let limited = Limited::new(body, self.config.max_body_bytes);
        let response = match self.with_timeout(limited.collect()).await {
            Err(elapsed) => error_response(&elapsed),
            Ok(Err(e)) if e.downcast_ref::<LengthLimitError>().is_some() => error_response(
                &HttpError::bad_request(format!(
                    "request body exceeds {} bytes",
                    self.config.max_body_bytes
                ))
                .with_status(StatusCode::PAYLOAD_TOO_LARGE),
            ),
            Ok(Err(e)) => error_response(&HttpError::bad_request(format!(
                "failed to read request body: {e}"
            ))),
            Ok(Ok(collected)) => {
                let request = Request::from_parts(parts, collected.to_bytes());
                match self.with_timeout(self.dispatch(request)).await {
                    Ok(response) => response.map(Full::new),
                    Err(elapsed) => error_response(&elapsed),
                }
            }
        };

        pylon_telemetry::log_request_complete!(
            method,
            path,
            response.status().as_u16(),
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
        );
        response
    }

    async fn with_timeout<F: std::future::Future>(&self, fut: F) -> Result<F::Output, HttpError> {
        if self.config.request_timeout_ms == 0 {
            return Ok(fut.await);
        }
        tokio::time::timeout(Duration::from_millis(self.config.request_timeout_ms), fut)
            .await
            .map_err(|_| HttpError::timeout("request timed out"))
    }

    /// Runs one request through the pipeline without any network I/O.
    pub async fn dispatch(&self, request: pylon_core::Request) -> pylon_core::Response {
        let ctx = CallContext::with_cancel(self.root.child());
        let mut ex = Exchange::with_context(request, ctx);
        self.pipeline.run(&mut ex).await;
        ex.into_response()
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("stages", &self.pipeline.stage_names())
            .finish_non_exhaustive()
    }
}

fn error_response(error: &HttpError) -> HttpResponse {
    let body = serde_json::to_vec(&error.to_body("", None)).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = error.status_code();
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}
