//! CLI module for lsp-lm
//!
//! Provides command-line interface using clap derive macros.

pub mod address;
pub mod commands;
pub mod output;

pub use address::parse_address;
pub use output::OutputContext;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::{catalog::CatalogArgs, connect::ConnectArgs, serve::ServeArgs};

const LONG_ABOUT: &str = r#"
lsp-lm - Language server that serves language-model completions

QUICK START:
  1. Serve an editor over stdio:    lsp-lm serve
  2. Serve over TCP:                lsp-lm serve tcp://127.0.0.1:5007
  3. Check a running server:        lsp-lm connect tcp://127.0.0.1:5007

ADDRESSES:
  stdio:                        process stdin/stdout (default)
  tcp://HOST:PORT               any address family
  tcp4://HOST:PORT              IPv4 only
  tcp6://[HOST]:PORT            IPv6 only
  unix:///PATH                  Unix domain socket

Logs go to stderr. Use RUST_LOG=lsp_lm=trace to see every frame.
"#;

/// lsp-lm - Language server that serves language-model completions
#[derive(Parser, Debug)]
#[command(name = "lsp-lm")]
#[command(author, version, about, long_about = LONG_ABOUT)]
#[command(propagate_version = true)]
#[command(after_help = "Use 'lsp-lm <COMMAND> --help' for more information about a command.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: $XDG_CONFIG_HOME/lsp-lm/config.toml)
    #[arg(short, long, global = true, env = "LSP_LM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the language server
    Serve(ServeArgs),

    /// Send initialize to a running server and print the reply
    Connect(ConnectArgs),

    /// Print the LSP capability catalog
    Catalog(CatalogArgs),
}
