//! Client endpoint: connects to a fixed peer and reconnects after it leaves.

use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Shutdown, SocketAddr};
use std::time::Duration;

use tokio::net::{TcpSocket, TcpStream};

use tcpwrap_core::{ClientConfig, EndpointError, EndpointResult, ReconnectConfig, Role};

use crate::endpoint::{Endpoint, Establish, Settings};

/// Connects to one remote address, optionally bounding each attempt.
#[derive(Debug, Clone)]
pub struct Connector {
    target: SocketAddr,
    connect_timeout: Option<Duration>,
}

impl Connector {
    async fn connect(&self) -> EndpointResult<TcpStream> {
        let socket =
            TcpSocket::new_v4().map_err(|e| EndpointError::initialization("Create", &e))?;
        let connecting = socket.connect(self.target);

        let result = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connecting)
                .await
                .unwrap_or_else(|_| Err(io::ErrorKind::TimedOut.into())),
            None => connecting.await,
        };
        result.map_err(|e| EndpointError::connection("Connect", &e))
    }
}

impl Establish for Connector {
    const ROLE: Role = Role::Client;
    const RELEASE: Shutdown = Shutdown::Write;

    fn establish(
        &mut self,
    ) -> impl Future<Output = EndpointResult<(TcpStream, SocketAddr)>> + '_ {
        async move {
            let stream = self.connect().await?;
            Ok((stream, self.target))
        }
    }
}

/// A blocking TCP client that keeps a connection to one peer, reconnecting
/// whenever the peer closes it.
///
/// Construction performs no network I/O; connect failures are reported
/// through [`last_error`](Endpoint::last_error) and the event channel.
///
/// ```rust,no_run
/// use std::net::Ipv4Addr;
/// use std::time::Duration;
/// use tcpwrap::Client;
///
/// # fn main() -> Result<(), tcpwrap::EndpointError> {
/// let client = Client::new(Ipv4Addr::LOCALHOST, 5005, Duration::from_secs(15))?;
/// if client.wait_for_connection(Duration::from_secs(15)) {
///     client.write(b"Hello world\n")?;
/// }
/// # Ok(())
/// # }
/// ```
pub type Client = Endpoint<Connector>;

impl Endpoint<Connector> {
    /// Starts connecting to `address:port`.
    ///
    /// `io_timeout` is applied to every established connection as its read
    /// and write deadline; `Duration::ZERO` disables it.
    pub fn new(address: Ipv4Addr, port: u16, io_timeout: Duration) -> EndpointResult<Self> {
        Self::with_config(ClientConfig {
            address,
            port,
            io_timeout,
            ..ClientConfig::default()
        })
    }

    /// Starts a client from a full configuration.
    pub fn with_config(config: ClientConfig) -> EndpointResult<Self> {
        let target = SocketAddr::from((config.address, config.port));
        let connector = Connector {
            target,
            connect_timeout: config.connect_timeout,
        };
        let settings = Settings {
            io_timeout: config.io_timeout,
            reconnect: config.reconnect,
            event_capacity: config.event_capacity,
        };
        Endpoint::spawn(move || Ok((connector, target)), settings)
    }

    /// Returns a builder for a client targeting `address:port`.
    #[must_use]
    pub fn builder(address: Ipv4Addr, port: u16) -> ClientBuilder {
        ClientBuilder::new(address, port)
    }

    /// The address this client connects to.
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr()
    }
}

/// Client builder
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a builder targeting `address:port`
    #[must_use]
    pub fn new(address: Ipv4Addr, port: u16) -> Self {
        Self {
            config: ClientConfig::new(address, port),
        }
    }

    /// Set the per-connection read/write deadline
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.config.io_timeout = timeout;
        self
    }

    /// Bound each connect attempt
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Set the policy for retrying after a failed connect
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

    /// Start the client
    pub fn build(self) -> EndpointResult<Client> {
        Client::with_config(self.config)
    }
}
