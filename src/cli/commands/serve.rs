//! Serve command implementation
//!
//! Runs the completion server on one transport until the client disconnects
//! (stdio) or Ctrl-C is received.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;

use crate::app::App;
use crate::cli::address::parse_address;
use crate::lm::{CompletionServerFactory, load_completor};
use crate::models::config::LspLmConfig;
use crate::server::tls::load_acceptor;
use crate::server::{Server, ServerOptions, TransportAddress, TransportKind};

const DEFAULT_HOST: &str = "127.0.0.1";

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to serve on (stdio:, tcp://HOST:PORT, tcp4://, tcp6://, unix:///PATH)
    #[arg(default_value = "stdio:")]
    pub address: String,

    /// TCP host (overrides ADDRESS)
    #[arg(long)]
    pub host: Option<String>,

    /// TCP port (overrides ADDRESS)
    #[arg(long)]
    pub port: Option<u16>,

    /// Unix socket path (overrides ADDRESS)
    #[arg(long, conflicts_with_all = ["host", "port"])]
    pub path: Option<PathBuf>,

    /// PEM certificate chain for TLS over TCP
    #[arg(long, requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key for TLS over TCP
    #[arg(long, requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// Maximum concurrent connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Language model type (vocab, dummy)
    #[arg(long)]
    pub model_type: Option<String>,

    /// Vocabulary file, one word per line
    #[arg(long)]
    pub vocab: Option<PathBuf>,

    /// Completions returned per request
    #[arg(long)]
    pub num_results: Option<usize>,
}

pub async fn execute(args: ServeArgs, app: &App) -> Result<()> {
    let address = resolve_address(&args)?;
    let config = apply_overrides(app.config.clone(), &args)?;

    let completor = load_completor(&config.completion)?;
    tracing::info!("Using {} completion backend", completor.name());

    let options = ServerOptions {
        max_connections: config.server.max_connections,
        max_content_length: config.server.max_content_length,
    };
    let mut server =
        Server::with_options(address, CompletionServerFactory::new(completor), options);

    match (&config.tls.cert_path, &config.tls.key_path) {
        (Some(cert), Some(key)) => {
            server = server.with_tls(load_acceptor(cert, key)?);
            tracing::info!("TLS enabled");
        }
        (None, None) => {}
        _ => bail!("TLS needs both tls.cert_path and tls.key_path"),
    }

    let handle = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted");
            handle.shutdown();
        }
    });

    server.run().await?;
    tracing::info!("Server stopped");
    Ok(())
}

/// `--path` selects unix; `--host`/`--port` select tcp. Otherwise ADDRESS.
fn resolve_address(args: &ServeArgs) -> Result<TransportAddress> {
    if let Some(path) = &args.path {
        return Ok(TransportAddress::unix(path.clone()));
    }

    if args.host.is_none() && args.port.is_none() {
        return parse_address(&args.address)
            .with_context(|| format!("Invalid address '{}'", args.address));
    }

    let base = parse_address(&args.address).ok().filter(|a| a.kind.is_tcp());
    let kind = base.as_ref().map_or(TransportKind::Tcp, |a| a.kind);
    let host = args
        .host
        .clone()
        .or_else(|| base.as_ref().and_then(|a| a.host.clone()))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let Some(port) = args.port.or_else(|| base.as_ref().and_then(|a| a.port)) else {
        bail!("--host needs a port (--port or ADDRESS)");
    };

    let address = TransportAddress::tcp(kind, host, port);
    address.validate()?;
    Ok(address)
}

fn apply_overrides(mut config: LspLmConfig, args: &ServeArgs) -> Result<LspLmConfig> {
    if let Some(max) = args.max_connections {
        if max == 0 {
            bail!("--max-connections must be at least 1");
        }
        config.server.max_connections = max;
    }
    if let Some(model_type) = &args.model_type {
        config.completion.model_type = model_type.clone();
    }
    if let Some(vocab) = &args.vocab {
        config.completion.vocab_path = Some(vocab.clone());
    }
    if let Some(n) = args.num_results {
        config.completion.num_results = n;
    }
    if args.tls_cert.is_some() {
        config.tls.cert_path = args.tls_cert.clone();
        config.tls.key_path = args.tls_key.clone();
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::{Cli, Commands};

    fn serve_args(argv: &[&str]) -> ServeArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Commands::Serve(args) => args,
            other => panic!("expected serve, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_from_address() {
        let args = serve_args(&["lsp-lm", "serve", "tcp6://[::1]:5007"]);
        let addr = resolve_address(&args).unwrap();
        assert_eq!(addr.kind, TransportKind::Tcp6);
        assert_eq!(addr.port, Some(5007));
    }

    #[test]
    fn test_port_flag_defaults_host() {
        let args = serve_args(&["lsp-lm", "serve", "--port", "5007"]);
        let addr = resolve_address(&args).unwrap();
        assert_eq!(addr.to_string(), "tcp://127.0.0.1:5007");
    }

    #[test]
    fn test_host_flag_keeps_address_port() {
        let args = serve_args(&["lsp-lm", "serve", "tcp4://0.0.0.0:9000", "--host", "10.0.0.1"]);
        let addr = resolve_address(&args).unwrap();
        assert_eq!(addr.to_string(), "tcp4://10.0.0.1:9000");

        let args = serve_args(&["lsp-lm", "serve", "--host", "localhost"]);
        assert!(resolve_address(&args).is_err());
    }

    #[test]
    fn test_path_flag_selects_unix() {
        let args = serve_args(&["lsp-lm", "serve", "--path", "/tmp/lsp-lm.sock"]);
        let addr = resolve_address(&args).unwrap();
        assert_eq!(addr.kind, TransportKind::Unix);
        assert_eq!(addr.to_string(), "unix:///tmp/lsp-lm.sock");
    }

    #[test]
    fn test_tls_flags_come_in_pairs() {
        assert!(Cli::try_parse_from(["lsp-lm", "serve", "--tls-cert", "c.pem"]).is_err());
        assert!(Cli::try_parse_from(["lsp-lm", "serve", "--path", "/tmp/s", "--port", "1"]).is_err());
    }

    #[test]
    fn test_overrides() {
        let args = serve_args(&[
            "lsp-lm",
            "serve",
            "--model-type",
            "dummy",
            "--num-results",
            "3",
            "--max-connections",
            "8",
            "--tls-cert",
            "c.pem",
            "--tls-key",
            "k.pem",
        ]);
        let config = apply_overrides(LspLmConfig::default(), &args).unwrap();
        assert_eq!(config.completion.model_type, "dummy");
        assert_eq!(config.completion.num_results, 3);
        assert_eq!(config.server.max_connections, 8);
        assert_eq!(config.tls.key_path, Some(PathBuf::from("k.pem")));

        let args = serve_args(&["lsp-lm", "serve", "--max-connections", "0"]);
        assert!(apply_overrides(LspLmConfig::default(), &args).is_err());
    }
}
