//! Endpoint lifecycle events.

use std::net::SocketAddr;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::error::EndpointError;
use crate::types::Role;

/// Represents notable transitions in an endpoint's background task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointEvent {
    /// The background task is about to accept or connect.
    AwaitingConnection {
        /// Role of the emitting endpoint.
        role: Role,
    },

    /// A connection has been established.
    Connected {
        /// Role of the emitting endpoint.
        role: Role,
        /// Address of the remote side.
        peer: SocketAddr,
    },

    /// The connection was closed by the peer and released.
    Reset {
        /// Role of the emitting endpoint.
        role: Role,
    },

    /// An accept, connect, or connection setup attempt failed.
    Failed {
        /// Role of the emitting endpoint.
        role: Role,
        /// The failure.
        error: EndpointError,
        /// Consecutive failures so far, including this one.
        attempt: u32,
    },

    /// The background task has exited and will not reconnect.
    Stopped {
        /// Role of the emitting endpoint.
        role: Role,
    },
}

/// An emitter for delivering [`EndpointEvent`]s to the owner.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender: Sender<EndpointEvent>,
    receiver: Receiver<EndpointEvent>,
}

impl EventEmitter {
    /// Creates an emitter backed by a channel holding at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        Self { sender, receiver }
    }

    /// Emits an event, dropping it if the channel is full to avoid blocking.
    pub fn emit(&self, event: EndpointEvent) {
        if let Err(TrySendError::Full(dropped)) = self.sender.try_send(event) {
            tracing::trace!(?dropped, "event channel full, dropping event");
        }
    }

    /// Returns a receiver for pending and future events.
    ///
    /// Receivers share one queue; each event is delivered to one of them.
    pub fn subscribe(&self) -> Receiver<EndpointEvent> {
        self.receiver.clone()
    }
}
