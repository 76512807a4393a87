//! The endpoint state machine shared by servers and clients.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use tcpwrap_core::{
    AtomicMetrics, ConnectionState, EndpointError, EndpointEvent, EndpointMetrics,
    EndpointResult, EventEmitter, ReconnectConfig, Role,
};

use crate::state::StateCell;
use crate::supervisor::Supervisor;
use crate::transfer::{self, READ, WRITE};

/// How an endpoint obtains its next connection.
///
/// Implementations run on the endpoint's background task. A pending
/// `establish` future is dropped when the endpoint shuts down, so it must be
/// safe to cancel at any await point.
pub trait Establish: Send + 'static {
    /// Role reported in logs and events.
    const ROLE: Role;

    /// Direction closed when a connection is released.
    const RELEASE: Shutdown;

    /// Accepts or connects one stream and returns it with the peer address.
    fn establish(
        &mut self,
    ) -> impl Future<Output = EndpointResult<(tokio::net::TcpStream, SocketAddr)>> + '_;
}

/// Settings the background task needs regardless of role.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) io_timeout: Duration,
    pub(crate) reconnect: ReconnectConfig,
    pub(crate) event_capacity: usize,
}

/// State shared between the owner and the background task.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) role: Role,
    pub(crate) state: StateCell,
    pub(crate) metrics: AtomicMetrics,
    pub(crate) events: EventEmitter,
    connection: Mutex<Option<Arc<TcpStream>>>,
    last_error: Mutex<Option<EndpointError>>,
    running: AtomicBool,
}

impl Shared {
    fn new(role: Role, event_capacity: usize) -> Self {
        Self {
            role,
            state: StateCell::new(),
            metrics: AtomicMetrics::new(),
            events: EventEmitter::new(event_capacity),
            connection: Mutex::new(None),
            last_error: Mutex::new(None),
            running: AtomicBool::new(true),
        }
    }

    /// Hands out the live connection, or fails without waiting when there is none.
    fn connected_stream(&self, operation: &'static str) -> EndpointResult<Arc<TcpStream>> {
        if self.state.get() != ConnectionState::Connected {
            return Err(EndpointError::ConnectionReset(operation));
        }
        self.connection
            .lock()
            .clone()
            .ok_or(EndpointError::ConnectionReset(operation))
    }

    pub(crate) fn install(&self, stream: Arc<TcpStream>) {
        *self.connection.lock() = Some(stream);
    }

    pub(crate) fn take_connection(&self) -> Option<Arc<TcpStream>> {
        self.connection.lock().take()
    }

    pub(crate) fn record_failure(&self, error: EndpointError) {
        self.metrics
            .failed_connections
            .fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(error);
    }

    /// Marks the background task as gone and wakes anyone waiting on it.
    pub(crate) fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.state.wake();
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Records a peer close noticed by a caller: `Connected -> Init`.
    fn peer_closed(&self) {
        if self
            .state
            .advance_from(ConnectionState::Connected, ConnectionState::Init)
        {
            self.metrics.resets.fetch_add(1, Ordering::Relaxed);
            info!(role = %self.role, "connection reset by peer");
        }
    }
}

/// A blocking TCP endpoint driven by a background connect/accept task.
///
/// Use the [`Server`](crate::Server) and [`Client`](crate::Client) aliases
/// to construct one. Dropping the endpoint shuts the background task down and
/// waits for it to exit.
pub struct Endpoint<S: Establish> {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    addr: SocketAddr,
    _strategy: PhantomData<fn() -> S>,
}

impl<S: Establish> fmt::Debug for Endpoint<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("role", &S::ROLE)
            .field("addr", &self.addr)
            .field("state", &self.shared.state.get())
            .field("running", &self.shared.is_running())
            .finish()
    }
}

impl<S: Establish> Endpoint<S> {
    /// Starts the background task and releases it by moving the state from
    /// `Uninit` to `Init`.
    ///
    /// `setup` runs on the caller's thread inside the background runtime's
    /// context, so sockets it registers belong to that runtime. Its failure
    /// is returned before any thread is started.
    pub(crate) fn spawn(
        setup: impl FnOnce() -> EndpointResult<(S, SocketAddr)>,
        settings: Settings,
    ) -> EndpointResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()
            .map_err(|e| EndpointError::initialization("Runtime", &e))?;

        let (strategy, addr) = {
            let _guard = runtime.enter();
            setup()?
        };

        let shared = Arc::new(Shared::new(S::ROLE, settings.event_capacity));
        let supervisor = Supervisor::new(strategy, Arc::clone(&shared), &settings);

        let worker = std::thread::Builder::new()
            .name(format!("tcpwrap-{}", S::ROLE))
            .spawn(move || runtime.block_on(supervisor.run()))
            .map_err(|e| EndpointError::initialization("Spawn", &e))?;

        shared.state.advance(ConnectionState::Init);
        debug!(role = %S::ROLE, %addr, "endpoint started");

        Ok(Self {
            shared,
            worker: Some(worker),
            addr,
            _strategy: PhantomData,
        })
    }

    /// Blocks until a connection is established or `timeout` elapses.
    ///
    /// Returns early with `false` when the endpoint can no longer connect
    /// because its background task has stopped.
    pub fn wait_for_connection(&self, timeout: Duration) -> bool {
        let shared = &self.shared;
        let state = shared.state.wait_for(timeout, |state| {
            state == ConnectionState::Connected || state.is_terminal() || !shared.is_running()
        });
        state == ConnectionState::Connected
    }

    /// Reads exactly `buf.len()` bytes from the current connection.
    ///
    /// Fails immediately with [`EndpointError::ConnectionReset`] when not
    /// connected. A peer close also fails with `ConnectionReset` and returns
    /// the endpoint to `Init` so the background task can reconnect. An expired
    /// per-connection deadline fails with [`EndpointError::Timeout`] and keeps
    /// the connection.
    pub fn read(&self, buf: &mut [u8]) -> EndpointResult<usize> {
        let stream = self.shared.connected_stream(READ)?;
        if buf.is_empty() {
            return Ok(0);
        }

        match transfer::read_full(&*stream, buf) {
            Ok(n) => {
                self.shared.metrics.record_received(n);
                Ok(n)
            }
            Err(err) => {
                if err.is_reset() {
                    self.shared.peer_closed();
                }
                Err(err)
            }
        }
    }

    /// Writes all of `buf` to the current connection.
    ///
    /// Same precondition and deadline handling as [`read`](Self::read). A
    /// zero-byte send is reported as [`EndpointError::Other`] and does not
    /// reset the connection.
    pub fn write(&self, buf: &[u8]) -> EndpointResult<usize> {
        let stream = self.shared.connected_stream(WRITE)?;
        if buf.is_empty() {
            return Ok(0);
        }

        let written = transfer::write_full(&*stream, buf)?;
        self.shared.metrics.record_sent(written);
        Ok(written)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    /// Returns `true` while a connection is established.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Returns `true` while the background task is still accepting or
    /// connecting. It stops early only when the reconnect policy gives up.
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// The most recent failure reported by the background task.
    pub fn last_error(&self) -> Option<EndpointError> {
        self.shared.last_error.lock().clone()
    }

    /// Snapshot of the endpoint's counters.
    pub fn metrics(&self) -> EndpointMetrics {
        self.shared.metrics.snapshot()
    }

    /// Receiver for lifecycle events emitted by the background task.
    pub fn events(&self) -> Receiver<EndpointEvent> {
        self.shared.events.subscribe()
    }

    /// Role of this endpoint.
    pub fn role(&self) -> Role {
        S::ROLE
    }

    pub(crate) fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl<S: Establish> Drop for Endpoint<S> {
    fn drop(&mut self) {
        self.shared.state.advance(ConnectionState::Shutdown);

        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!(role = %S::ROLE, "background task panicked");
        }
        debug!(role = %S::ROLE, "endpoint shut down");
    }
}
