//! Endpoint configuration types.

use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Port used when none is given.
pub const DEFAULT_PORT: u16 = 5002;

/// Per-connection read/write deadline used when none is given.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(15);

/// Capacity of the lifecycle event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Policy applied by the background task after a failed accept or connect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Upper bound for the delay between retries.
    pub max_delay: Duration,

    /// Multiplier applied to the delay after every failure.
    pub backoff_factor: f64,

    /// Retries allowed after consecutive failures before the background task
    /// stops. `None` = retry forever
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            max_retries: None,
        }
    }
}

impl ReconnectConfig {
    /// Stop the background task after the first failure.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_factor: 1.0,
            max_retries: Some(0),
        }
    }

    /// Default backoff, giving up after `max_retries` retries.
    #[must_use]
    pub fn bounded(max_retries: u32) -> Self {
        Self {
            max_retries: Some(max_retries),
            ..Self::default()
        }
    }
}

/// Tracks consecutive failures against a [`ReconnectConfig`].
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    delay: Duration,
    failures: u32,
}

impl Backoff {
    /// Starts a fresh failure sequence.
    pub fn new(config: ReconnectConfig) -> Self {
        let delay = config.initial_delay;
        Self {
            config,
            delay,
            failures: 0,
        }
    }

    /// Records a failure and returns how long to wait before retrying,
    /// or `None` once the retry budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.config.max_retries
            && self.failures >= max
        {
            return None;
        }
        self.failures = self.failures.saturating_add(1);

        let current = self.delay.min(self.config.max_delay);
        let grown = current.as_secs_f64() * self.config.backoff_factor.max(1.0);
        self.delay = Duration::try_from_secs_f64(grown)
            .unwrap_or(self.config.max_delay)
            .min(self.config.max_delay);
        Some(current)
    }

    /// Forgets previous failures after a successful connection.
    pub fn reset(&mut self) {
        self.delay = self.config.initial_delay;
        self.failures = 0;
    }

    /// Number of retries granted since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Configuration for a `Server` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind on the IPv4 wildcard address. `0` picks an ephemeral port.
    pub port: u16,

    /// Receive/send deadline applied to each accepted connection.
    /// `Duration::ZERO` disables the deadline.
    pub io_timeout: Duration,

    /// Policy for retrying after a failed accept.
    pub reconnect: ReconnectConfig,

    /// Capacity of the lifecycle event channel.
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            io_timeout: DEFAULT_IO_TIMEOUT,
            reconnect: ReconnectConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Configuration for `port` with default settings otherwise.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }
}

/// Configuration for a `Client` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote IPv4 address.
    pub address: Ipv4Addr,

    /// Remote port.
    pub port: u16,

    /// Receive/send deadline applied to each established connection.
    /// `Duration::ZERO` disables the deadline.
    pub io_timeout: Duration,

    /// Bound on a single connect attempt.
    /// `None` = wait for the OS to resolve the attempt
    pub connect_timeout: Option<Duration>,

    /// Policy for retrying after a failed connect.
    pub reconnect: ReconnectConfig,

    /// Capacity of the lifecycle event channel.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: Ipv4Addr::LOCALHOST,
            port: DEFAULT_PORT,
            io_timeout: DEFAULT_IO_TIMEOUT,
            connect_timeout: None,
            reconnect: ReconnectConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Configuration targeting `address:port` with default settings otherwise.
    #[must_use]
    pub fn new(address: Ipv4Addr, port: u16) -> Self {
        Self {
            address,
            port,
            ..Self::default()
        }
    }
}
