//! LSP Server
//!
//! Accepts connections on one transport and runs a [`Session`] per
//! connection. Stdio serves exactly one session inline; socket transports
//! spawn one task per connection, capped by a semaphore. A full pool stops
//! the accept loop until a session finishes.

pub mod tls;
pub mod transport;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket, UnixListener};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast};
use tokio::task::{self, JoinSet};
use tokio_rustls::TlsAcceptor;

use crate::error::{LspLmError, LspLmResult, TransportError};
use crate::rpc::frame::DEFAULT_MAX_CONTENT_LENGTH;
use crate::rpc::router::LanguageServer;
use crate::rpc::session::{Session, SessionStats};

pub use transport::{TransportAddress, TransportKind};

pub const DEFAULT_MAX_CONNECTIONS: usize = 4;

const LISTEN_BACKLOG: u32 = 1024;

/// Pause after a failed accept so persistent errors such as EMFILE do not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// ============================================================================
// Protocol Factory
// ============================================================================

/// Builds the protocol state for a new connection.
pub trait ProtocolFactory: Send + Sync + 'static {
    type Protocol: LanguageServer;

    fn create(&self, peer: &str) -> Self::Protocol;
}

impl<F, P> ProtocolFactory for F
where
    F: Fn(&str) -> P + Send + Sync + 'static,
    P: LanguageServer,
{
    type Protocol = P;

    fn create(&self, peer: &str) -> P {
        self(peer)
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub max_connections: usize,
    pub max_content_length: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
        }
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Any byte stream a session can run on
trait Duplex: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Duplex for T {}

pub enum Listener {
    Tcp(TcpListener),
    Unix { listener: UnixListener, path: PathBuf },
}

enum Accepted {
    Tcp(tokio::net::TcpStream, SocketAddr),
    Unix(tokio::net::UnixStream),
}

impl Listener {
    /// Bind a socket transport. Stdio has no listener.
    pub async fn bind(address: &TransportAddress) -> Result<Self, TransportError> {
        address.validate()?;

        match address.kind {
            TransportKind::Stdio => Err(TransportError::InvalidAddress {
                input: address.to_string(),
                message: "stdio does not listen".to_string(),
            }),
            TransportKind::Unix => {
                let path = address.path.clone().ok_or(TransportError::MissingPath)?;
                remove_stale_socket(&path).await.map_err(|source| TransportError::Bind {
                    addr: address.to_string(),
                    source,
                })?;
                let listener = UnixListener::bind(&path).map_err(|source| TransportError::Bind {
                    addr: address.to_string(),
                    source,
                })?;
                Ok(Self::Unix { listener, path })
            }
            _ => Self::bind_tcp(address).await,
        }
    }

    async fn bind_tcp(address: &TransportAddress) -> Result<Self, TransportError> {
        let mut last_error = None;

        for addr in address.socket_addrs().await? {
            match bind_reuse(addr) {
                Ok(listener) => return Ok(Self::Tcp(listener)),
                Err(e) => {
                    tracing::debug!("Failed to bind {}: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(TransportError::Bind {
            addr: address.to_string(),
            source: last_error.unwrap_or_else(|| std::io::Error::other("no usable address")),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp(listener) => listener.local_addr().ok(),
            Self::Unix { .. } => None,
        }
    }

    async fn accept(&self) -> std::io::Result<Accepted> {
        match self {
            Self::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                stream.set_nodelay(true)?;
                Ok(Accepted::Tcp(stream, addr))
            }
            Self::Unix { listener, .. } => {
                let (stream, _) = listener.accept().await?;
                Ok(Accepted::Unix(stream))
            }
        }
    }

    async fn cleanup(self) {
        if let Self::Unix { path, .. } = self {
            let _ = tokio::fs::remove_file(&path).await;
        }
    }
}

fn bind_reuse(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

// ============================================================================
// Server
// ============================================================================

struct SessionInfo {
    peer: String,
    started: Instant,
}

/// Stops a running server; live sessions are aborted.
#[derive(Clone)]
pub struct ShutdownHandle(broadcast::Sender<()>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.0.send(());
    }
}

pub struct Server<F> {
    address: TransportAddress,
    factory: Arc<F>,
    options: ServerOptions,
    tls: Option<TlsAcceptor>,
    semaphore: Arc<Semaphore>,
    shutdown_tx: broadcast::Sender<()>,
}

impl<F: ProtocolFactory> Server<F> {
    pub fn new(address: TransportAddress, factory: F) -> Self {
        Self::with_options(address, factory, ServerOptions::default())
    }

    pub fn with_options(address: TransportAddress, factory: F, options: ServerOptions) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            semaphore: Arc::new(Semaphore::new(options.max_connections.max(1))),
            address,
            factory: Arc::new(factory),
            options,
            tls: None,
            shutdown_tx,
        }
    }

    /// Wrap accepted TCP connections in server-side TLS.
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    pub fn address(&self) -> &TransportAddress {
        &self.address
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown_tx.clone())
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Serve until shut down. Stdio also returns when the session ends.
    pub async fn run(&self) -> LspLmResult<()> {
        if self.address.kind == TransportKind::Stdio {
            return self.serve_stdio().await;
        }
        let listener = self.listen().await?;
        self.serve(listener).await
    }

    pub async fn listen(&self) -> Result<Listener, TransportError> {
        if self.tls.is_some() && !self.address.kind.is_tcp() {
            tracing::warn!("TLS is only used for TCP; serving {} in plain text", self.address);
        }

        let listener = Listener::bind(&self.address).await?;
        match listener.local_addr() {
            Some(addr) => tracing::info!("Listening on {}://{}", self.address.kind, addr),
            None => tracing::info!("Listening on {}", self.address),
        }
        Ok(listener)
    }

    async fn serve_stdio(&self) -> LspLmResult<()> {
        tracing::info!("Serving on stdio");
        let protocol = self.factory.create("stdio");
        let mut session = Session::with_limit(
            "stdio",
            tokio::io::stdin(),
            tokio::io::stdout(),
            protocol,
            self.options.max_content_length,
        );
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::select! {
            result = session.run() => {
                result?;
            }
            _ = shutdown_rx.recv() => {
                tracing::info!("Shutdown signal received");
            }
        }
        Ok(())
    }

    /// Accept connections on `listener` until shutdown.
    pub async fn serve(&self, listener: Listener) -> LspLmResult<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut sessions: JoinSet<LspLmResult<SessionStats>> = JoinSet::new();
        let mut live: HashMap<task::Id, SessionInfo> = HashMap::new();
        let mut next_connection: u64 = 0;

        loop {
            tokio::select! {
                accepted = accept_with_permit(&listener, &self.semaphore) => {
                    let (accepted, permit) = match accepted {
                        Ok(v) => v,
                        Err(e) => {
                            accept_failed(&e).await;
                            continue;
                        }
                    };

                    next_connection += 1;
                    let peer = match &accepted {
                        Accepted::Tcp(_, addr) => format!("{}#{}", addr, next_connection),
                        Accepted::Unix(_) => format!("unix#{}", next_connection),
                    };
                    tracing::info!("Accepted connection {}", peer);

                    let task = self.connection_task(accepted, peer.clone(), permit);
                    let handle = sessions.spawn(task);
                    live.insert(handle.id(), SessionInfo { peer, started: Instant::now() });
                }
                Some(joined) = sessions.join_next_with_id(), if !sessions.is_empty() => {
                    let (id, outcome) = match joined {
                        Ok((id, outcome)) => (id, outcome.map(|_| ())),
                        Err(e) => (e.id(), Err(LspLmError::Io(std::io::Error::other(e.to_string())))),
                    };
                    if let Some(info) = live.remove(&id) {
                        match outcome {
                            Ok(()) => tracing::info!(
                                "Connection {} finished after {:?} ({} live)",
                                info.peer,
                                info.started.elapsed(),
                                live.len()
                            ),
                            Err(e) => tracing::warn!("Connection error: {}: {}", info.peer, e),
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        if !live.is_empty() {
            tracing::info!("Aborting {} live sessions", live.len());
        }
        sessions.shutdown().await;
        listener.cleanup().await;
        Ok(())
    }

    fn connection_task(
        &self,
        accepted: Accepted,
        peer: String,
        permit: OwnedSemaphorePermit,
    ) -> impl Future<Output = LspLmResult<SessionStats>> + Send + 'static {
        let factory = Arc::clone(&self.factory);
        let tls = self.tls.clone();
        let max_content_length = self.options.max_content_length;

        async move {
            let _permit = permit;

            let stream: Box<dyn Duplex> = match (accepted, tls) {
                (Accepted::Tcp(stream, _), Some(acceptor)) => {
                    let stream = acceptor
                        .accept(stream)
                        .await
                        .map_err(TransportError::Handshake)?;
                    tracing::debug!("TLS handshake with {} complete", peer);
                    Box::new(stream)
                }
                (Accepted::Tcp(stream, _), None) => Box::new(stream),
                (Accepted::Unix(stream), _) => Box::new(stream),
            };

            let (reader, writer) = tokio::io::split(stream);
            let protocol = factory.create(&peer);
            let mut session = Session::with_limit(peer, reader, writer, protocol, max_content_length);
            Ok(session.run().await?)
        }
    }
}

/// Remove a socket left behind by a previous server. Any other kind of
/// file at the path is left alone and refuses the bind.
async fn remove_stale_socket(path: &Path) -> std::io::Result<()> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    if !metadata.file_type().is_socket() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} exists and is not a socket", path.display()),
        ));
    }

    tracing::debug!("Removing stale socket {}", path.display());
    tokio::fs::remove_file(path).await
}

async fn accept_failed(error: &std::io::Error) {
    tracing::warn!("Failed to accept connection: {}", error);
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

async fn accept_with_permit(
    listener: &Listener,
    semaphore: &Arc<Semaphore>,
) -> std::io::Result<(Accepted, OwnedSemaphorePermit)> {
    let permit = Arc::clone(semaphore)
        .acquire_owned()
        .await
        .map_err(std::io::Error::other)?;
    let accepted = listener.accept().await?;
    Ok((accepted, permit))
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use tokio::io::{AsyncWriteExt, BufReader};
    use tokio::net::{TcpStream, UnixStream};
    use tokio_rustls::TlsConnector;
    use tokio_rustls::rustls::pki_types::ServerName;
    use tokio_rustls::rustls::{ClientConfig, RootCertStore};

    use super::*;
    use crate::rpc::frame::{FrameReader, write_frame};
    use crate::rpc::router::Router;

    struct Echo;

    impl LanguageServer for Echo {
        fn register(router: &mut Router<Self>) {
            router.register("echo", true, |_, params| Ok(params));
        }
    }

    fn echo_factory(_peer: &str) -> Echo {
        Echo
    }

    async fn call<S>(stream: &mut S, id: i64) -> Value
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request = json!({"jsonrpc": "2.0", "id": id, "method": "echo", "params": {"id": id}});
        write_frame(stream, request.to_string().as_bytes()).await.unwrap();
        let mut reader = FrameReader::new(BufReader::new(stream));
        let frame = reader.read_frame().await.unwrap().unwrap();
        serde_json::from_slice(&frame.content).unwrap()
    }

    async fn start<F: ProtocolFactory>(
        server: Server<F>,
    ) -> (Option<SocketAddr>, ShutdownHandle, tokio::task::JoinHandle<LspLmResult<()>>) {
        let listener = server.listen().await.unwrap();
        let addr = listener.local_addr();
        let handle = server.shutdown_handle();
        let join = tokio::spawn(async move { server.serve(listener).await });
        (addr, handle, join)
    }

    #[tokio::test]
    async fn test_tcp_round_trip() {
        let address = TransportAddress::tcp(TransportKind::Tcp4, "127.0.0.1", 0);
        let (addr, handle, join) = start(Server::new(address, echo_factory)).await;

        let mut stream = TcpStream::connect(addr.unwrap()).await.unwrap();
        let reply = call(&mut stream, 1).await;
        assert_eq!(reply, json!({"jsonrpc": "2.0", "id": 1, "result": {"id": 1}}));
        let reply = call(&mut stream, 2).await;
        assert_eq!(reply["id"], json!(2));

        handle.shutdown();
        join.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unix_socket_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lsp.sock");
        // Dropping a std listener leaves its socket file behind.
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let (_, handle, join) = start(Server::new(TransportAddress::unix(&path), echo_factory)).await;

        let mut stream = UnixStream::connect(&path).await.unwrap();
        assert_eq!(call(&mut stream, 5).await["result"], json!({"id": 5}));

        handle.shutdown();
        join.await.unwrap().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unix_bind_keeps_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"keep me").unwrap();

        let err = Listener::bind(&TransportAddress::unix(&path)).await.err().unwrap();
        assert!(matches!(err, TransportError::Bind { .. }));
        assert!(err.to_string().contains("is not a socket"));
        assert_eq!(std::fs::read(&path).unwrap(), b"keep me");
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_error_backs_off() {
        let started = tokio::time::Instant::now();
        accept_failed(&std::io::Error::other("too many open files")).await;
        assert!(started.elapsed() >= ACCEPT_BACKOFF);
    }

    #[tokio::test]
    async fn test_full_pool_blocks_accept() {
        let address = TransportAddress::tcp(TransportKind::Tcp4, "127.0.0.1", 0);
        let options = ServerOptions {
            max_connections: 1,
            ..ServerOptions::default()
        };
        let (addr, handle, join) = start(Server::with_options(address, echo_factory, options)).await;
        let addr = addr.unwrap();

        let mut first = TcpStream::connect(addr).await.unwrap();
        assert_eq!(call(&mut first, 1).await["id"], json!(1));

        // Queued in the backlog until the first session ends.
        let mut second = TcpStream::connect(addr).await.unwrap();
        let pending = tokio::time::timeout(Duration::from_millis(200), call(&mut second, 2)).await;
        assert!(pending.is_err());

        drop(first);
        let mut reader = FrameReader::new(BufReader::new(&mut second));
        let frame = tokio::time::timeout(Duration::from_secs(5), reader.read_frame())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let reply: Value = serde_json::from_slice(&frame.content).unwrap();
        assert_eq!(reply["id"], json!(2));

        handle.shutdown();
        join.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failing_connection_does_not_affect_others() {
        let address = TransportAddress::tcp(TransportKind::Tcp4, "127.0.0.1", 0);
        let (addr, handle, join) = start(Server::new(address, echo_factory)).await;
        let addr = addr.unwrap();

        let mut healthy = TcpStream::connect(addr).await.unwrap();
        let mut broken = TcpStream::connect(addr).await.unwrap();

        broken
            .write_all(b"Content-Length: notanumber\r\n\r\n")
            .await
            .unwrap();
        // Closed without a reply: either a clean EOF or a reset.
        let mut reader = FrameReader::new(BufReader::new(&mut broken));
        assert!(!matches!(reader.read_frame().await, Ok(Some(_))));

        assert_eq!(call(&mut healthy, 3).await["id"], json!(3));

        handle.shutdown();
        join.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_tls_round_trip() {
        let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
        let cert = manifest.join("testdata/localhost.crt");
        let acceptor = tls::load_acceptor(&cert, &manifest.join("testdata/localhost.key")).unwrap();

        let address = TransportAddress::tcp(TransportKind::Tcp4, "127.0.0.1", 0);
        let (addr, handle, join) =
            start(Server::new(address, echo_factory).with_tls(acceptor)).await;

        let mut roots = RootCertStore::empty();
        let pem = std::fs::read(&cert).unwrap();
        for der in rustls_pemfile::certs(&mut pem.as_slice()) {
            roots.add(der.unwrap()).unwrap();
        }
        let config = ClientConfig::builder_with_provider(Arc::new(
            tokio_rustls::rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();

        let tcp = TcpStream::connect(addr.unwrap()).await.unwrap();
        let server_name = ServerName::try_from("localhost").unwrap();
        let mut stream = TlsConnector::from(Arc::new(config))
            .connect(server_name, tcp)
            .await
            .unwrap();

        assert_eq!(call(&mut stream, 9).await["result"], json!({"id": 9}));

        handle.shutdown();
        join.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stdio_has_no_listener() {
        let result = Listener::bind(&TransportAddress::stdio()).await;
        assert!(matches!(result, Err(TransportError::InvalidAddress { .. })));
    }
}
