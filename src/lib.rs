//! lsp-lm - Language Server Library
//!
//! LSP base-protocol framing, a JSON-RPC router and session engine, a
//! multi-transport server, and a completion server backed by pluggable
//! language models.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod lm;
pub mod models;
pub mod rpc;
pub mod server;

pub use error::{LspLmError, LspLmResult};
