//! Configuration model for lsp-lm
//!
//! Every field has a default, so an empty file (or no file) is valid.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// lsp-lm configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LspLmConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub completion: CompletionSettings,

    #[serde(default)]
    pub tls: TlsSettings,
}

/// Connection handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "defaults::max_connections")]
    pub max_connections: usize,

    /// Upper bound on a single frame payload, in bytes
    #[serde(default = "defaults::max_content_length")]
    pub max_content_length: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            max_connections: defaults::max_connections(),
            max_content_length: defaults::max_content_length(),
        }
    }
}

/// Completion backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionSettings {
    /// `vocab` or `dummy`
    #[serde(default = "defaults::model_type")]
    pub model_type: String,

    #[serde(default)]
    pub vocab_path: Option<PathBuf>,

    #[serde(default = "defaults::num_results")]
    pub num_results: usize,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model_type: defaults::model_type(),
            vocab_path: None,
            num_results: defaults::num_results(),
        }
    }
}

/// Server-side TLS for TCP transports. Both paths must be set to enable it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TlsSettings {
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

mod defaults {
    use crate::rpc::frame::DEFAULT_MAX_CONTENT_LENGTH;
    use crate::server::DEFAULT_MAX_CONNECTIONS;

    // Server
    pub fn max_connections() -> usize {
        DEFAULT_MAX_CONNECTIONS
    }
    pub fn max_content_length() -> usize {
        DEFAULT_MAX_CONTENT_LENGTH
    }

    // Completion
    pub fn model_type() -> String {
        "vocab".to_string()
    }
    pub fn num_results() -> usize {
        10
    }
}
