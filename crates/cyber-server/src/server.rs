//! HTTP/1.1 transport over hyper.
//!
//! One task per connection. Each request body is collected, wrapped in a
//! [`RequestContext`] and handed to the [`Dispatcher`]. On shutdown the
//! accept loop stops, open connections finish their current request, and
//! whatever is still running when the drain period ends is cancelled.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cyber_config::ServerConfig;
use cyber_core::{codes, CancellationToken, RequestContext};
use futures_util::FutureExt;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::dispatcher::{error_response, Dispatcher};
use crate::error::ServerResult;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Transport timeouts. A zero duration disables the corresponding limit.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ServeOptions {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl From<&ServerConfig> for ServeOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

/// Accepts connections on `listener` until `shutdown` fires, then drains.
pub(crate) async fn serve(
    dispatcher: Arc<Dispatcher>,
    listener: TcpListener,
    shutdown: ShutdownSignal,
    options: ServeOptions,
) -> ServerResult<()> {
    let local_addr = listener.local_addr()?;
    info!(
        addr = %local_addr,
        routes = dispatcher.route_count(),
        "server listening"
    );

    let tracker = ConnectionTracker::new();
    let requests = CancellationToken::new();
    let stop = shutdown.recv();
    tokio::pin!(stop);

    loop {
        tokio::select! {
            () = &mut stop => {
                info!("shutdown triggered, no longer accepting connections");
                break;
            }
            accepted = listener.accept() => {
                let (stream, remote_addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };
                let connection = Connection {
                    dispatcher: Arc::clone(&dispatcher),
                    remote_addr,
                    requests: requests.clone(),
                    options,
                };
                let token = tracker.acquire();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    connection.serve(stream, shutdown).await;
                    drop(token);
                });
            }
        }
    }
    drop(listener);

    let active = tracker.active_connections();
    if active > 0 {
        info!(
            active,
            timeout_secs = options.shutdown_timeout.as_secs(),
            "draining connections"
        );
        if tokio::time::timeout(options.shutdown_timeout, tracker.drained())
            .await
            .is_err()
        {
            warn!(
                active = tracker.active_connections(),
                "drain period expired, cancelling in-flight requests"
            );
        }
    }
    requests.cancel();

    info!("server stopped");
    Ok(())
}

struct Connection {
    dispatcher: Arc<Dispatcher>,
    remote_addr: SocketAddr,
    requests: CancellationToken,
    options: ServeOptions,
}

impl Connection {
    async fn serve(self, stream: TcpStream, shutdown: ShutdownSignal) {
        let remote_addr = self.remote_addr;
        let read_timeout = self.options.read_timeout;
        let this = Arc::new(self);
        let service = service_fn(move |req| {
            let this = Arc::clone(&this);
            async move { Ok::<_, Infallible>(this.handle(req).await) }
        });

        let mut builder = http1::Builder::new();
        builder.timer(TokioTimer::new());
        if !read_timeout.is_zero() {
            builder.header_read_timeout(read_timeout);
        }

        let conn = builder.serve_connection(TokioIo::new(stream), service);
        tokio::pin!(conn);

        let result = tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.recv() => {
                conn.as_mut().graceful_shutdown();
                conn.as_mut().await
            }
        };
        if let Err(e) = result {
            debug!(remote_addr = %remote_addr, error = %e, "connection closed with error");
        }
    }

    async fn handle(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                debug!(remote_addr = %self.remote_addr, error = %e, "failed to read request body");
                return error_response(
                    StatusCode::BAD_REQUEST,
                    codes::BAD_REQUEST,
                    "failed to read request body",
                )
                .map(Full::new);
            }
        };

        let ctx = Arc::new(RequestContext::new(parts, body).with_remote_addr(self.remote_addr));
        let root = self.requests.child_token();
        ctx.with_context(root.clone());
        let _cancel = CancelOnDrop(root);

        let dispatched = AssertUnwindSafe(self.dispatcher.dispatch(Arc::clone(&ctx))).catch_unwind();
        let write_timeout = self.options.write_timeout;
        let outcome = if write_timeout.is_zero() {
            Ok(dispatched.await)
        } else {
            tokio::time::timeout(write_timeout, dispatched).await
        };

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                error!(
                    request_id = %ctx.request_id(),
                    path = %ctx.path(),
                    "request panicked outside the bounded executor"
                );
                ctx.error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    codes::INTERNAL_ERROR,
                    "Internal Server Error",
                );
                ctx.take_response()
            }
            Err(_) => {
                warn!(
                    request_id = %ctx.request_id(),
                    path = %ctx.path(),
                    timeout_secs = write_timeout.as_secs(),
                    "response not produced within the write timeout"
                );
                ctx.error(
                    StatusCode::GATEWAY_TIMEOUT,
                    codes::TIMEOUT,
                    "Response not produced within the write timeout",
                );
                ctx.take_response()
            }
        };
        response.map(Full::new)
    }
}

/// Cancels a request's root token when the request future completes or is
/// dropped with its connection.
struct CancelOnDrop(CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
