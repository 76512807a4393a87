//! # tcpwrap core
//!
//! Foundation types shared by the `tcpwrap` server and client endpoints.
//!
//! ## Overview
//!
//! This crate defines:
//! - **State**: [`ConnectionState`] and its legal transitions, [`Role`]
//! - **Errors**: [`EndpointError`], [`EndpointResult`]
//! - **Config**: [`ServerConfig`], [`ClientConfig`], [`ReconnectConfig`], [`Backoff`]
//! - **Events**: [`EndpointEvent`], [`EventEmitter`]
//! - **Metrics**: [`EndpointMetrics`], [`AtomicMetrics`]
//!
//! It performs no I/O of its own.

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

mod config;
mod error;
mod events;
mod metrics;
mod types;

// Re-export all public items
pub use config::{
    Backoff, ClientConfig, DEFAULT_EVENT_CAPACITY, DEFAULT_IO_TIMEOUT, DEFAULT_PORT,
    ReconnectConfig, ServerConfig,
};
pub use error::{EndpointError, EndpointResult, OsCode};
pub use events::{EndpointEvent, EventEmitter};
pub use metrics::{AtomicMetrics, EndpointMetrics};
pub use types::{ConnectionState, Role};
