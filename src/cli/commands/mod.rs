//! Command implementations for lsp-lm
//!
//! Each command is implemented in its own module.

pub mod catalog;
pub mod connect;
pub mod serve;
