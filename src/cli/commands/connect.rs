//! Connect command implementation
//!
//! Opens a socket to a running server, performs `initialize`, prints the
//! reply, then shuts the server session down cleanly.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::{TcpStream, UnixStream};

use crate::app::App;
use crate::cli::address::parse_address;
use crate::lm::server::SERVER_NAME;
use crate::rpc::catalog::general;
use crate::rpc::{Dispatcher, FrameReader};
use crate::server::{TransportAddress, TransportKind};

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Server address (tcp://HOST:PORT, tcp4://, tcp6://, unix:///PATH)
    pub address: String,

    /// Pretty-print JSON
    #[arg(long)]
    pub pretty: bool,

    /// Seconds to wait for each reply
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,
}

pub async fn execute(args: ConnectArgs, app: &App) -> Result<()> {
    let address = parse_address(&args.address)
        .with_context(|| format!("Invalid address '{}'", args.address))?;
    let timeout = Duration::from_secs(args.timeout_secs);
    let output = app.output.with_pretty(args.pretty);

    let reply = match address.kind {
        TransportKind::Stdio => bail!("connect needs a socket address, not stdio"),
        TransportKind::Unix => {
            let path = address.path.as_ref().ok_or_else(|| anyhow!("missing socket path"))?;
            let stream = UnixStream::connect(path)
                .await
                .with_context(|| format!("Failed to connect to {}", address))?;
            handshake(stream, timeout, args.pretty).await?
        }
        _ => {
            let stream = connect_tcp(&address).await?;
            handshake(stream, timeout, args.pretty).await?
        }
    };

    output.print(&reply);
    Ok(())
}

async fn connect_tcp(address: &TransportAddress) -> Result<TcpStream> {
    let mut last_error = None;
    for addr in address.socket_addrs().await? {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                tracing::debug!("Connected to {}", addr);
                return Ok(stream);
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(match last_error {
        Some(e) => anyhow!("Failed to connect to {}: {}", address, e),
        None => anyhow!("No address to connect to for {}", address),
    })
}

/// Run initialize and shutdown over `stream`, returning the initialize reply.
async fn handshake<S>(stream: S, timeout: Duration, pretty: bool) -> Result<Value>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut reader = FrameReader::new(BufReader::new(reader));
    let mut dispatcher = Dispatcher::new(writer).pretty(pretty);

    let params = json!({
        "processId": std::process::id(),
        "clientInfo": {
            "name": format!("{}-connect", SERVER_NAME),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "rootUri": null,
        "capabilities": {},
    });
    dispatcher
        .request(general::INITIALIZE.method, Some(params))
        .await?;
    let reply = read_reply(&mut reader, timeout).await?;

    dispatcher.notify(general::INITIALIZED.method, None).await?;
    dispatcher.request(general::SHUTDOWN.method, None).await?;
    read_reply(&mut reader, timeout).await?;
    dispatcher.notify(general::EXIT.method, None).await?;

    Ok(reply)
}

async fn read_reply<R>(reader: &mut FrameReader<R>, timeout: Duration) -> Result<Value>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let frame = tokio::time::timeout(timeout, reader.read_frame())
        .await
        .map_err(|_| anyhow!("Timed out after {:?} waiting for reply", timeout))??
        .ok_or_else(|| anyhow!("Server closed the connection"))?;
    Ok(serde_json::from_slice(&frame.content)?)
}
