//! Core endpoint types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The side of the connection an endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Binds a port and accepts one connection at a time.
    Server,
    /// Connects to a fixed remote address.
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => write!(f, "server"),
            Self::Client => write!(f, "client"),
        }
    }
}

/// Lifecycle state of an endpoint's connection.
///
/// ```text
/// Uninit ──▶ Init ──▶ Connected
///             ▲           │
///             └───────────┘   (peer closed)
///
/// any state ──▶ Shutdown      (owner teardown, terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Constructed; the background task may not run yet.
    #[default]
    Uninit,
    /// Ready to accept or connect, or waiting for the next attempt to succeed.
    Init,
    /// A connection socket is established and usable for I/O.
    Connected,
    /// Terminal. Every blocked operation must unblock.
    Shutdown,
}

impl ConnectionState {
    /// Returns `true` if moving from `self` to `next` is a legal edge.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Uninit, Self::Init)
                | (Self::Init, Self::Connected)
                | (Self::Connected, Self::Init)
                | (Self::Uninit | Self::Init | Self::Connected, Self::Shutdown)
        )
    }

    /// Returns `true` once no further transition is possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Shutdown)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninit => write!(f, "uninit"),
            Self::Init => write!(f, "init"),
            Self::Connected => write!(f, "connected"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}
