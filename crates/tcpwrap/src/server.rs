//! Server endpoint: binds a port and serves one connection at a time.

use std::future::Future;
use std::net::{Ipv4Addr, Shutdown, SocketAddr};
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::info;

use tcpwrap_core::{EndpointError, EndpointResult, ReconnectConfig, Role, ServerConfig};

use crate::endpoint::{Endpoint, Establish, Settings};

/// Pending connections queued by the OS while one is being served.
const BACKLOG: u32 = 1;

/// Accepts connections on a listening socket.
#[derive(Debug)]
pub struct Acceptor {
    listener: TcpListener,
}

impl Establish for Acceptor {
    const ROLE: Role = Role::Server;
    const RELEASE: Shutdown = Shutdown::Both;

    fn establish(
        &mut self,
    ) -> impl Future<Output = EndpointResult<(TcpStream, SocketAddr)>> + '_ {
        async move {
            self.listener
                .accept()
                .await
                .map_err(|e| EndpointError::connection("Accept", &e))
        }
    }
}

/// A blocking TCP server that accepts one connection at a time and accepts
/// the next one after the peer disconnects.
///
/// ```rust,no_run
/// use std::time::Duration;
/// use tcpwrap::Server;
///
/// # fn main() -> Result<(), tcpwrap::EndpointError> {
/// let server = Server::new(5005, Duration::from_secs(15))?;
/// if server.wait_for_connection(Duration::from_secs(15)) {
///     let mut buf = [0u8; 4];
///     server.read(&mut buf)?;
/// }
/// # Ok(())
/// # }
/// ```
pub type Server = Endpoint<Acceptor>;

impl Endpoint<Acceptor> {
    /// Binds `0.0.0.0:port` and starts accepting connections.
    ///
    /// `io_timeout` is applied to every accepted connection as its read and
    /// write deadline; `Duration::ZERO` disables it.
    pub fn new(port: u16, io_timeout: Duration) -> EndpointResult<Self> {
        Self::with_config(ServerConfig {
            port,
            io_timeout,
            ..ServerConfig::default()
        })
    }

    /// Binds and starts a server from a full configuration.
    ///
    /// Socket creation, address reuse, bind, and listen happen before this
    /// returns; their failures are reported as
    /// [`EndpointError::Initialization`].
    pub fn with_config(config: ServerConfig) -> EndpointResult<Self> {
        let settings = Settings {
            io_timeout: config.io_timeout,
            reconnect: config.reconnect,
            event_capacity: config.event_capacity,
        };
        Endpoint::spawn(|| bind_listener(config.port), settings)
    }

    /// Returns a builder for a server on `port`.
    #[must_use]
    pub fn builder(port: u16) -> ServerBuilder {
        ServerBuilder::new(port)
    }

    /// The address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr()
    }
}

/// Creates, binds, and listens on `0.0.0.0:port`.
///
/// Must run inside a tokio runtime context.
fn bind_listener(port: u16) -> EndpointResult<(Acceptor, SocketAddr)> {
    let socket = TcpSocket::new_v4().map_err(|e| EndpointError::initialization("Create", &e))?;
    socket
        .set_reuseaddr(true)
        .map_err(|e| EndpointError::initialization("Setsockopt SO_REUSEADDR", &e))?;
    socket
        .bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .map_err(|e| EndpointError::initialization("Bind", &e))?;
    let listener = socket
        .listen(BACKLOG)
        .map_err(|e| EndpointError::initialization("Listen", &e))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| EndpointError::initialization("Local Address", &e))?;
    info!(%local_addr, backlog = BACKLOG, "server listening");

    Ok((Acceptor { listener }, local_addr))
}

/// Server builder
#[derive(Debug, Clone)]
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    /// Create a builder for `port`
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            config: ServerConfig::new(port),
        }
    }

    /// Set the per-connection read/write deadline
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.config.io_timeout = timeout;
        self
    }

    /// Set the policy for retrying after a failed accept
    #[must_use]
    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.config.reconnect = reconnect;
        self
    }

    /// Set the event channel capacity
    #[must_use]
    pub const fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Bind and start the server
    pub fn build(self) -> EndpointResult<Server> {
        Server::with_config(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_builder() {
        let builder = ServerBuilder::new(9000)
            .io_timeout(Duration::from_secs(3))
            .reconnect(ReconnectConfig::bounded(4))
            .event_capacity(8);

        assert_eq!(builder.config.port, 9000);
        assert_eq!(builder.config.io_timeout, Duration::from_secs(3));
        assert_eq!(builder.config.reconnect.max_retries, Some(4));
        assert_eq!(builder.config.event_capacity, 8);
    }

    #[test]
    fn test_ephemeral_port_is_reported() {
        let server = Server::new(0, Duration::from_secs(1)).unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(server.role(), Role::Server);
    }
}
