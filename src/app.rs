//! Application container for lsp-lm

use std::path::Path;

use crate::cli::OutputContext;
use crate::config;
use crate::models::config::LspLmConfig;

pub struct App {
    pub(crate) output: OutputContext,
    pub(crate) config: LspLmConfig,
}

impl App {
    /// Load configuration from `config_path`, or the global file if unset.
    pub fn new(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let config = config::load(config_path)?;
        tracing::debug!(
            "Config: max_connections={}, model_type={}",
            config.server.max_connections,
            config.completion.model_type
        );

        Ok(Self {
            output: OutputContext::default(),
            config,
        })
    }

    pub fn config(&self) -> &LspLmConfig {
        &self.config
    }
}
