//! Server tunables and the command line of the `solo` binary.
//!
//! ```bash
//! solo --path ./public
//! SOLO_PATH=./public RUST_LOG=solo=debug solo
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::http::parser::MAX_REQUEST_SIZE;

/// The port the binary listens on.
pub const DEFAULT_PORT: u16 = 3000;

/// Tunables for [`Server`](crate::server::Server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Port to bind on all interfaces; `0` picks an ephemeral port.
    pub port: u16,
    /// Pending-connection queue length passed to `listen`.
    pub backlog: u32,
    /// Bytes read from the peer per `receive` call.
    pub recv_buffer_size: usize,
    /// Requests longer than this are answered with `413`.
    pub max_request_bytes: usize,
    /// How long a peer may stay silent mid-request; `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Default bound on how long [`ServerHandle::stop`](crate::server::ServerHandle::stop)
    /// waits for the in-flight connection.
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            backlog: 5,
            recv_buffer_size: 255,
            max_request_bytes: MAX_REQUEST_SIZE,
            read_timeout: Some(Duration::from_secs(30)),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Returns the default configuration bound to `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }
}

/// Command line of the `solo` binary.
#[derive(Debug, Clone, Parser)]
#[command(name = "solo")]
#[command(about = "Serves index.html one connection at a time, counting hits")]
#[command(version)]
pub struct Cli {
    /// Directory holding index.html
    #[arg(short, long, value_name = "DIR", default_value = ".", env = "SOLO_PATH")]
    pub path: PathBuf,
}

impl Cli {
    /// Returns the server configuration the binary runs with.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::default()
    }
}
