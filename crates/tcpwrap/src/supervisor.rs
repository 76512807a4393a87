//! Background connect/accept loop.

use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use tcpwrap_core::{Backoff, ConnectionState, EndpointError, EndpointEvent, EndpointResult};

use crate::endpoint::{Establish, Settings, Shared};

/// Drives one endpoint's connection lifecycle on its background thread.
pub(crate) struct Supervisor<S> {
    strategy: S,
    shared: Arc<Shared>,
    io_timeout: Option<Duration>,
    backoff: Backoff,
}

impl<S: Establish> Supervisor<S> {
    pub(crate) fn new(strategy: S, shared: Arc<Shared>, settings: &Settings) -> Self {
        Self {
            strategy,
            shared,
            io_timeout: (!settings.io_timeout.is_zero()).then_some(settings.io_timeout),
            backoff: Backoff::new(settings.reconnect.clone()),
        }
    }

    pub(crate) async fn run(mut self) {
        let role = S::ROLE;
        self.shared
            .state
            .until(|state| state != ConnectionState::Uninit)
            .await;

        while !self.shared.state.get().is_terminal() {
            info!(%role, "awaiting connection");
            self.shared
                .events
                .emit(EndpointEvent::AwaitingConnection { role });

            let attempt = tokio::select! {
                result = self.strategy.establish() => result,
                _ = self.shared.state.until(ConnectionState::is_terminal) => break,
            };

            let (stream, peer) = match attempt.and_then(|(stream, peer)| {
                configure(stream, self.io_timeout).map(|stream| (stream, peer))
            }) {
                Ok(established) => established,
                Err(error) => {
                    if self.recover(error).await {
                        continue;
                    }
                    break;
                }
            };

            self.backoff.reset();
            self.shared
                .metrics
                .connections
                .fetch_add(1, Ordering::Relaxed);
            self.shared.install(Arc::new(stream));
            if !self.shared.state.advance(ConnectionState::Connected) {
                // Shutdown won the race against this connection.
                self.shared.take_connection();
                break;
            }
            info!(%role, %peer, "connection established");
            self.shared
                .events
                .emit(EndpointEvent::Connected { role, peer });

            let state = self
                .shared
                .state
                .until(|state| matches!(state, ConnectionState::Init | ConnectionState::Shutdown))
                .await;
            self.release();

            if state == ConnectionState::Init {
                info!(%role, "connection released, reconnecting");
                self.shared.events.emit(EndpointEvent::Reset { role });
            }
        }

        self.release();
        self.shared.stop();
        self.shared.events.emit(EndpointEvent::Stopped { role });
        debug!(%role, "background task stopped");
    }

    /// Reports a failed attempt and waits out the backoff delay.
    ///
    /// Returns `false` when the loop should end, either because shutdown was
    /// requested or because the retry budget is spent. Failures that coincide
    /// with shutdown are not reported.
    async fn recover(&mut self, error: EndpointError) -> bool {
        let role = S::ROLE;
        if self.shared.state.get().is_terminal() {
            return false;
        }

        let attempt = self.backoff.failures().saturating_add(1);
        warn!(%role, %error, attempt, "connection attempt failed");
        self.shared.record_failure(error.clone());
        self.shared.events.emit(EndpointEvent::Failed {
            role,
            error,
            attempt,
        });

        let Some(delay) = self.backoff.next_delay() else {
            error!(%role, attempt, "giving up after repeated failures");
            return false;
        };

        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            _ = self.shared.state.until(ConnectionState::is_terminal) => false,
        }
    }

    /// Closes the current connection, if any, in the role's release direction.
    fn release(&self) {
        if let Some(stream) = self.shared.take_connection()
            && let Err(err) = stream.shutdown(S::RELEASE)
        {
            // The peer may already have torn the socket down.
            debug!(role = %S::ROLE, error = %err, "connection shutdown failed");
        }
    }
}

/// Turns a freshly established async stream into a blocking one carrying the
/// per-connection deadline.
fn configure(
    stream: tokio::net::TcpStream,
    io_timeout: Option<Duration>,
) -> EndpointResult<TcpStream> {
    let stream = stream
        .into_std()
        .map_err(|e| EndpointError::initialization("Detach", &e))?;
    stream
        .set_nonblocking(false)
        .map_err(|e| EndpointError::initialization("Blocking Mode", &e))?;
    stream
        .set_read_timeout(io_timeout)
        .map_err(|e| EndpointError::initialization("Receive Timeout", &e))?;
    stream
        .set_write_timeout(io_timeout)
        .map_err(|e| EndpointError::initialization("Send Timeout", &e))?;
    Ok(stream)
}
