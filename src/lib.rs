//! # solo
//!
//! A small HTTP/1.1 server that serves exactly one connection at a time.
//!
//! Requests are reconstructed from raw byte chunks by an incremental state
//! machine ([`http::Parser`]), dispatched to every matching handler in a
//! method/pattern [`Router`], and answered with a [`Response`] written back on
//! the same socket before the next peer is accepted.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use solo::{Router, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router.get("/", |ctx, res| {
//!         res.body(format!("Hello, {}!", ctx.request().hostname()));
//!     });
//!
//!     let handle = Server::new(ServerConfig::default(), router).start().await?;
//!     println!("Listening on port {}", handle.port());
//!     tokio::signal::ctrl_c().await?;
//!     handle.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod http;
pub mod page;
pub mod router;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use config::ServerConfig;
pub use context::Context;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError, ServerHandle};
