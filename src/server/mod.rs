//! The server lifecycle and its single worker.
//!
//! [`Server::start`] binds and listens, then hands the [`Connection`] to one
//! spawned task that serves exactly one peer at a time:
//!
//! ```text
//!  accept ──▶ receive/parse ──▶ dispatch ──▶ send ──▶ release ──┐
//!    ▲                                                          │
//!    └──────────────────────────────────────────────────────────┘
//! ```
//!
//! A second peer waits in the listen backlog until the first has been
//! answered and released. Each connection is its own failure boundary: an
//! error while serving one peer is logged and the worker goes back to
//! accepting. Only [`ServerHandle::stop`] ends the loop, and it does so
//! between connections, never in the middle of a response.

pub mod connection;

use std::any::Any;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::http::{ParseError, Parser, Request, Response, StatusCode, Status};
use crate::router::Router;
use connection::{Connection, ConnectionError, Received};

/// Pause after a failed `accept` before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("bad request: {0}")]
    Parse(#[from] ParseError),

    #[error("peer sent nothing for {0:?}")]
    ReadTimeout(Duration),

    #[error("handler panicked: {0}")]
    HandlerPanic(String),

    #[error("server worker failed: {0}")]
    Join(#[from] JoinError),

    #[error("server did not stop within {0:?}")]
    ShutdownTimeout(Duration),
}

/// A configured server that has not started yet.
///
/// # Examples
///
/// ```rust,no_run
/// use solo::{Router, Server, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut router = Router::new();
///     router.get("/", |_ctx, res| {
///         res.body("Hello!");
///     });
///
///     let handle = Server::new(ServerConfig::with_port(8080), router).start().await?;
///     tokio::signal::ctrl_c().await?;
///     handle.stop().await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    config: ServerConfig,
    router: Router,
}

impl Server {
    pub fn new(config: ServerConfig, router: Router) -> Self {
        Self { config, router }
    }

    /// Binds, listens, and spawns the worker task.
    ///
    /// Must be called from within a tokio runtime. The socket is listening
    /// when this returns, so clients may connect immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Connection`] if the socket cannot be created,
    /// bound, or put into listening mode.
    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        let mut connection = Connection::new(self.config.port);
        connection.connect()?;
        connection.listen(self.config.backlog)?;
        let local_addr = connection
            .local_addr()
            .ok_or(ConnectionError::Logic("socket is not bound"))?;

        let (shutdown, signal) = watch::channel(false);
        let grace = self.config.shutdown_grace;
        let worker = Worker {
            connection,
            router: self.router,
            config: self.config,
        };
        let task = tokio::spawn(worker.run(signal));
        info!(address = %local_addr, "solo listening");

        Ok(ServerHandle {
            local_addr,
            shutdown,
            task,
            grace,
        })
    }
}

/// Control handle for a running server.
///
/// Dropping the handle without calling [`stop`](Self::stop) also signals the
/// worker to stop after its current connection, but nothing waits for it.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    grace: Duration,
}

impl ServerHandle {
    /// Returns the address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the bound port.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Stops the server, waiting up to the configured shutdown grace.
    ///
    /// # Errors
    ///
    /// See [`stop_within`](Self::stop_within).
    pub async fn stop(self) -> Result<(), ServerError> {
        let grace = self.grace;
        self.stop_within(grace).await
    }

    /// Asks the worker to stop once the in-flight connection (if any) has
    /// been answered, and waits up to `grace` for it to exit.
    ///
    /// # Errors
    ///
    /// - [`ServerError::ShutdownTimeout`]: the worker was still busy after
    ///   `grace`; it has been aborted.
    /// - [`ServerError::Join`]: the worker task panicked.
    pub async fn stop_within(self, grace: Duration) -> Result<(), ServerError> {
        // The worker may already be gone, in which case nobody is listening.
        let _ = self.shutdown.send(true);

        let mut task = self.task;
        match tokio::time::timeout(grace, &mut task).await {
            Ok(joined) => joined.map_err(ServerError::from),
            Err(_) => {
                task.abort();
                Err(ServerError::ShutdownTimeout(grace))
            }
        }
    }
}

// Everything the worker task owns.
struct Worker {
    connection: Connection,
    router: Router,
    config: ServerConfig,
}

impl Worker {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let port = self.connection.port();
        debug!(port, "worker started");

        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                accepted = self.connection.accept() => accepted,
            };

            match accepted {
                Ok(peer) => {
                    debug!(%peer, "connection accepted");
                    if let Err(e) = self.serve().await {
                        warn!(%peer, error = %e, "connection closed with error");
                    }
                    self.connection.release().await;
                }
                Err(ConnectionError::Logic(reason)) => {
                    error!(reason, "listener unusable, stopping");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }

        self.connection.close();
        info!(port, "solo stopped");
    }

    // Serves the accepted peer: one request, one response.
    async fn serve(&mut self) -> Result<(), ServerError> {
        let Some(request) = self.read_request().await? else {
            return Ok(());
        };

        let response = self.respond_to(&request);
        let status = response.status_code();
        response.send(&mut self.connection).await?;

        info!(
            method = request.method(),
            path = request.path(),
            status = status.as_u16(),
            "request served"
        );
        Ok(())
    }

    // Receives until the parser completes. `None` means the peer hung up
    // first, in which case nothing is dispatched and nothing is sent.
    async fn read_request(&mut self) -> Result<Option<Request>, ServerError> {
        let mut parser = Parser::with_limit(self.config.max_request_bytes);
        let mut buf = vec![0u8; self.config.recv_buffer_size.max(1)];

        loop {
            let n = match self.connection.receive(&mut buf)? {
                Received::Data(n) => n,
                Received::WouldBlock => {
                    self.wait_readable().await?;
                    continue;
                }
                Received::Closed => {
                    debug!(state = ?parser.state(), "peer closed before the request completed");
                    return Ok(None);
                }
            };

            match parser.feed(&buf[..n]) {
                Ok(Status::Complete) => return Ok(Some(parser.into_request())),
                Ok(Status::Partial) => {}
                Err(e) => {
                    self.reject(parser.request(), &e).await?;
                    return Err(e.into());
                }
            }
        }
    }

    async fn wait_readable(&self) -> Result<(), ServerError> {
        match self.config.read_timeout {
            Some(limit) => tokio::time::timeout(limit, self.connection.readable())
                .await
                .map_err(|_| ServerError::ReadTimeout(limit))??,
            None => self.connection.readable().await?,
        }
        Ok(())
    }

    // Answers a request the parser gave up on.
    async fn reject(&mut self, request: &Request, err: &ParseError) -> Result<(), ConnectionError> {
        let mut response = Response::for_request(request);
        match err {
            ParseError::TooLarge { .. } => response
                .status(StatusCode::PAYLOAD_TOO_LARGE)
                .status_message("Payload Too Large"),
            _ => response.status(StatusCode::BAD_REQUEST),
        };
        response.send(&mut self.connection).await
    }

    // Runs the router inside its own failure boundary. No match becomes a
    // 404; a panicking handler becomes a 500 and leaves the worker alive.
    fn respond_to(&self, request: &Request) -> Response {
        let mut response = Response::for_request(request);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.router.dispatch(request, &mut response)
        }));

        match outcome {
            Ok(0) => {
                debug!(path = request.path(), "no route matched");
                response.status(StatusCode::NOT_FOUND);
            }
            Ok(handlers) => debug!(handlers, "request dispatched"),
            Err(payload) => {
                let err = ServerError::HandlerPanic(panic_message(payload.as_ref()));
                error!(method = request.method(), path = request.path(), error = %err, "handler failed");
                response = Response::for_request(request);
                response
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .status_message("Internal Server Error");
            }
        }
        response
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
