//! Endpoint error types.

use std::fmt;
use std::io;

use thiserror::Error;

/// A specialized `Result` type for endpoint operations.
pub type EndpointResult<T> = std::result::Result<T, EndpointError>;

/// OS error code attached to setup and connection failures.
///
/// Renders as `errno: N`, or `errno: unknown` when the failure did not
/// originate from a syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OsCode(pub Option<i32>);

impl OsCode {
    /// Captures the raw OS error code of `err`, if any.
    pub fn of(err: &io::Error) -> Self {
        Self(err.raw_os_error())
    }
}

impl fmt::Display for OsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "errno: {code}"),
            None => f.write_str("errno: unknown"),
        }
    }
}

/// Represents errors that can occur while setting up or using an endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EndpointError {
    /// Socket creation or configuration failed.
    #[error("{operation}, {code}")]
    Initialization {
        /// The setup step that failed (e.g. `Bind`).
        operation: &'static str,
        /// The OS error code reported for the failure.
        code: OsCode,
    },

    /// Connecting, accepting, or transferring bytes failed.
    #[error("{operation}, {code}")]
    Connection {
        /// The operation that failed (e.g. `Connect`).
        operation: &'static str,
        /// The OS error code reported for the failure.
        code: OsCode,
    },

    /// The peer closed the connection, or no connection was established.
    #[error("Connection reset: {0}")]
    ConnectionReset(&'static str),

    /// The per-connection read or write deadline expired.
    #[error("Timed out: {0}")]
    Timeout(&'static str),

    /// An unexpected condition with no OS error attached.
    #[error("{0}")]
    Other(String),
}

impl EndpointError {
    /// Builds an [`EndpointError::Initialization`] from an I/O failure.
    pub fn initialization(operation: &'static str, err: &io::Error) -> Self {
        Self::Initialization {
            operation,
            code: OsCode::of(err),
        }
    }

    /// Builds an [`EndpointError::Connection`] from an I/O failure.
    pub fn connection(operation: &'static str, err: &io::Error) -> Self {
        Self::Connection {
            operation,
            code: OsCode::of(err),
        }
    }

    /// Classifies a failed socket transfer.
    ///
    /// Would-block and timed-out conditions map to [`EndpointError::Timeout`],
    /// everything else to [`EndpointError::Connection`].
    pub fn from_transfer(operation: &'static str, err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::Timeout(operation),
            _ => Self::connection(operation, err),
        }
    }

    /// Returns the OS error code carried by this error, if any.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            Self::Initialization { code, .. } | Self::Connection { code, .. } => code.0,
            _ => None,
        }
    }

    /// Returns `true` for [`EndpointError::ConnectionReset`].
    pub fn is_reset(&self) -> bool {
        matches!(self, Self::ConnectionReset(_))
    }

    /// Returns `true` for [`EndpointError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
