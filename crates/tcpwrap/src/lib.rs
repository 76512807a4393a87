//! # tcpwrap
//!
//! Blocking TCP endpoints with a background connect/accept task and
//! automatic reconnection.
//!
//! ## Features
//!
//! - **Server**: binds a port and serves one connection at a time, accepting
//!   the next one after the peer leaves
//! - **Client**: connects to a fixed peer and reconnects after it leaves
//! - **Exact-length I/O**: `read` and `write` move exactly `buf.len()` bytes
//!   under a per-connection deadline
//! - **Bounded teardown**: dropping an endpoint cancels a pending accept or
//!   connect and joins the background task
//! - **Observability**: lifecycle events, counters, and `tracing` spans
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::net::Ipv4Addr;
//! use std::time::Duration;
//! use tcpwrap::{Client, Server};
//!
//! # fn main() -> Result<(), tcpwrap::EndpointError> {
//! let timeout = Duration::from_secs(15);
//! let server = Server::new(5005, timeout)?;
//! let client = Client::new(Ipv4Addr::LOCALHOST, 5005, timeout)?;
//!
//! if server.wait_for_connection(timeout) && client.wait_for_connection(timeout) {
//!     client.write(b"Hello world\n")?;
//!     let mut buf = [0u8; 4];
//!     server.read(&mut buf)?;
//!     assert_eq!(&buf, b"Hell");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! Each endpoint owns one background thread. `read` and `write` take `&self`
//! and may be called from any thread, but calls on one endpoint should not
//! overlap: bytes are not framed, so concurrent reads interleave arbitrarily.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

mod client;
mod endpoint;
mod server;
mod state;
mod supervisor;
mod transfer;

pub use client::{Client, ClientBuilder, Connector};
pub use endpoint::{Endpoint, Establish};
pub use server::{Acceptor, Server, ServerBuilder};

// Re-export core types for convenience
pub use tcpwrap_core::{
    AtomicMetrics, Backoff, ClientConfig, ConnectionState, DEFAULT_EVENT_CAPACITY,
    DEFAULT_IO_TIMEOUT, DEFAULT_PORT, EndpointError, EndpointEvent, EndpointMetrics,
    EndpointResult, OsCode, ReconnectConfig, Role, ServerConfig,
};
