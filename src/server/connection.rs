//! The listening socket and the single accepted peer.
//!
//! [`Connection`] walks an explicit lifecycle:
//!
//! ```text
//!   new ──connect()──▶ bound ──listen()──▶ listening ──accept()──▶ accepted
//!                                              ▲                      │
//!                                              └──────release()───────┘
//! ```
//!
//! Every operation checks its precondition and reports misuse as
//! [`ConnectionError::Logic`] instead of touching an unopened handle.
//! Sockets are non-blocking; waiting happens on tokio's readiness
//! notifications, never in a spin loop.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{debug, trace};

/// Errors produced by [`Connection`] operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// An underlying socket call failed.
    #[error("{op} failed: {source}")]
    Os {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// An operation was invoked before its precondition was met.
    #[error("{0}")]
    Logic(&'static str),
}

impl ConnectionError {
    fn os(op: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Os { op, source }
    }
}

/// Outcome of a single [`Connection::receive`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// `n` bytes were copied into the buffer.
    Data(usize),
    /// The peer closed its side of the connection.
    Closed,
    /// Nothing is available right now; wait with [`Connection::readable`] and retry.
    WouldBlock,
}

/// Owns the listening socket and at most one accepted peer.
///
/// Dropping a `Connection` releases whatever handles it holds; handles that
/// were never opened are simply absent.
///
/// # Examples
///
/// ```rust,no_run
/// use solo::server::connection::{Connection, Received};
///
/// # async fn example() -> Result<(), solo::server::connection::ConnectionError> {
/// let mut conn = Connection::new(3000);
/// conn.connect()?;
/// conn.listen(5)?;
/// conn.accept().await?;
///
/// let mut buf = [0u8; 256];
/// loop {
///     match conn.receive(&mut buf)? {
///         Received::Data(n) => println!("got {n} bytes"),
///         Received::WouldBlock => conn.readable().await?,
///         Received::Closed => break,
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Connection {
    port: u16,
    socket: Option<TcpSocket>,
    listener: Option<TcpListener>,
    peer: Option<(TcpStream, SocketAddr)>,
}

impl Connection {
    /// Creates a connection that will bind `port` on all interfaces.
    ///
    /// Port `0` asks the OS for an ephemeral port; [`port`](Self::port)
    /// reports the real one after [`connect`](Self::connect).
    pub fn new(port: u16) -> Self {
        Self {
            port,
            socket: None,
            listener: None,
            peer: None,
        }
    }

    /// Returns the bound port (the requested one until `connect` succeeds).
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the local address once the socket is bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match (&self.socket, &self.listener) {
            (Some(socket), _) => socket.local_addr().ok(),
            (None, Some(listener)) => listener.local_addr().ok(),
            (None, None) => None,
        }
    }

    /// Returns the address of the accepted peer, if one is held.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer.as_ref().map(|(_, addr)| *addr)
    }

    /// Returns `true` while an accepted peer is held.
    pub fn is_accepted(&self) -> bool {
        self.peer.is_some()
    }

    /// Creates a non-blocking IPv4 socket bound to the port on all interfaces.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::Logic`]: the socket already exists.
    /// - [`ConnectionError::Os`]: socket creation, option setting or binding failed.
    pub fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.socket.is_some() || self.listener.is_some() {
            return Err(ConnectionError::Logic("socket is already created"));
        }

        let socket = TcpSocket::new_v4().map_err(ConnectionError::os("socket"))?;
        socket
            .set_reuseaddr(true)
            .map_err(ConnectionError::os("setsockopt"))?;
        socket
            .bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port)))
            .map_err(ConnectionError::os("bind"))?;

        self.port = socket
            .local_addr()
            .map_err(ConnectionError::os("getsockname"))?
            .port();
        self.socket = Some(socket);
        debug!(port = self.port, "socket bound");
        Ok(())
    }

    /// Marks the bound socket ready to accept, with room for `backlog`
    /// pending peers.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::Logic`]: called before [`connect`](Self::connect)
    ///   or after a previous successful `listen`.
    /// - [`ConnectionError::Os`]: the `listen` call failed.
    pub fn listen(&mut self, backlog: u32) -> Result<(), ConnectionError> {
        if self.listener.is_some() {
            return Err(ConnectionError::Logic("socket is already listening"));
        }
        let socket = self
            .socket
            .take()
            .ok_or(ConnectionError::Logic("socket is not created"))?;
        let listener = socket.listen(backlog).map_err(ConnectionError::os("listen"))?;
        self.listener = Some(listener);
        debug!(port = self.port, backlog, "socket listening");
        Ok(())
    }

    /// Waits until a peer connects and holds it as the accepted peer.
    ///
    /// A peer still held from an earlier `accept` is dropped first. Transient
    /// outcomes (would-block, interrupted, aborted handshakes) are retried.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::Logic`]: called before [`listen`](Self::listen).
    /// - [`ConnectionError::Os`]: any other accept failure.
    pub async fn accept(&mut self) -> Result<SocketAddr, ConnectionError> {
        let listener = self
            .listener
            .as_ref()
            .ok_or(ConnectionError::Logic("socket is not listening"))?;
        self.peer = None;

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    self.peer = Some((stream, addr));
                    return Ok(addr);
                }
                Err(e) if is_transient(&e) => {
                    trace!(error = %e, "transient accept failure, retrying");
                }
                Err(e) => return Err(ConnectionError::Os { op: "accept", source: e }),
            }
        }
    }

    /// Reads up to `buf.len()` bytes from the accepted peer without blocking.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::Logic`]: no peer is accepted.
    /// - [`ConnectionError::Os`]: the read failed for a reason other than
    ///   would-block.
    pub fn receive(&mut self, buf: &mut [u8]) -> Result<Received, ConnectionError> {
        let (stream, _) = self
            .peer
            .as_ref()
            .ok_or(ConnectionError::Logic("socket is not accepted"))?;
        match stream.try_read(buf) {
            Ok(0) => Ok(Received::Closed),
            Ok(n) => Ok(Received::Data(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Received::WouldBlock),
            Err(e) => Err(ConnectionError::Os { op: "recv", source: e }),
        }
    }

    /// Waits until the accepted peer has data (or a close) to read.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::Logic`]: no peer is accepted.
    /// - [`ConnectionError::Os`]: readiness polling failed.
    pub async fn readable(&self) -> Result<(), ConnectionError> {
        let (stream, _) = self
            .peer
            .as_ref()
            .ok_or(ConnectionError::Logic("socket is not accepted"))?;
        stream.readable().await.map_err(ConnectionError::os("poll"))
    }

    /// Writes all of `bytes` to the accepted peer.
    ///
    /// Short writes are continued until the whole buffer is out.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::Logic`]: no peer is accepted.
    /// - [`ConnectionError::Os`]: the write failed.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        let (stream, _) = self
            .peer
            .as_mut()
            .ok_or(ConnectionError::Logic("socket is not accepted"))?;
        stream
            .write_all(bytes)
            .await
            .map_err(ConnectionError::os("send"))?;
        stream.flush().await.map_err(ConnectionError::os("send"))
    }

    /// Closes the accepted peer, if any, after shutting down its write side.
    pub async fn release(&mut self) {
        if let Some((mut stream, addr)) = self.peer.take() {
            if let Err(e) = stream.shutdown().await {
                trace!(peer = %addr, error = %e, "shutdown on release failed");
            }
            debug!(peer = %addr, "connection released");
        }
    }

    /// Releases both handles. Safe to call in any state, any number of times.
    pub fn close(&mut self) {
        self.peer = None;
        self.listener = None;
        self.socket = None;
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
    )
}
