//! Data models for lsp-lm

pub mod config;

pub use config::LspLmConfig;
