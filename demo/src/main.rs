//! Loopback demo: a server and a client on the same port exchange one
//! greeting, then both are torn down.
//!
//! ```bash
//! RUST_LOG=debug cargo run -p tcpwrap-demo -- --port 5005
//! ```

use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tcpwrap::{Client, DEFAULT_PORT, Server};

const GREETING: &[u8] = b"Hello world\n";
const READ_LEN: usize = 4;

/// Exchange one greeting between a tcpwrap server and client over loopback
#[derive(Parser, Debug)]
#[command(name = "tcpwrap-demo", version, about)]
struct Args {
    /// Port the server binds and the client connects to
    #[arg(short, long, env = "TCPWRAP_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Seconds to wait for the connection and for each read or write
    #[arg(short, long, default_value_t = 15)]
    timeout: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let timeout = Duration::from_secs(args.timeout);

    let server = Server::new(args.port, timeout)
        .with_context(|| format!("failed to start server on port {}", args.port))?;
    let client = Client::new(Ipv4Addr::LOCALHOST, args.port, timeout)
        .context("failed to start client")?;

    if !server.wait_for_connection(timeout) {
        if let Some(error) = client.last_error() {
            bail!("client never connected: {error}");
        }
        bail!("no connection within {}s", args.timeout);
    }
    if !client.wait_for_connection(timeout) {
        bail!("client did not observe the connection within {}s", args.timeout);
    }

    let sent = client.write(GREETING).context("client write failed")?;
    info!(sent, "client wrote greeting");

    let mut buf = [0u8; READ_LEN];
    let received = server.read(&mut buf).context("server read failed")?;
    println!(
        "server received {received} bytes: {:?}",
        String::from_utf8_lossy(&buf)
    );

    info!(server = ?server.metrics(), client = ?client.metrics(), "done");
    Ok(())
}
