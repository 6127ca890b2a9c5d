//! Completion language server
//!
//! The concrete protocol served by `lsp-lm`: document synchronization plus
//! `textDocument/completion` backed by a [`Completor`]. One instance exists
//! per session; the completor is shared.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::de::IgnoredAny;
use serde_json::Value;

use super::completion::Completor;
use super::corpus::Corpus;
use super::types::*;
use crate::error::HandlerError;
use crate::rpc::catalog::{general, text_document};
use crate::rpc::router::{LanguageServer, Router};
use crate::server::ProtocolFactory;

pub const SERVER_NAME: &str = "lsp-lm";

const COMMIT_CHARACTERS: &str = " !?:;,.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Running,
    ShuttingDown,
    Exited,
}

pub struct CompletionServer {
    completor: Arc<dyn Completor + Send + Sync>,
    corpus: Corpus,
    lifecycle: Lifecycle,
    client_pid: Option<i64>,
    trace: String,
}

impl CompletionServer {
    pub fn new(completor: Arc<dyn Completor + Send + Sync>) -> Self {
        Self {
            completor,
            corpus: Corpus::new(),
            lifecycle: Lifecycle::Uninitialized,
            client_pid: None,
            trace: "off".to_string(),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn client_pid(&self) -> Option<i64> {
        self.client_pid
    }

    pub fn trace(&self) -> &str {
        &self.trace
    }

    pub fn capabilities() -> ServerCapabilities {
        ServerCapabilities {
            text_document_sync: TextDocumentSyncOptions {
                change: SYNC_FULL,
                open_close: true,
                save: true,
            },
            completion_provider: CompletionOptions {
                trigger_characters: ('a'..='z').chain('A'..='Z').map(String::from).collect(),
                all_commit_characters: COMMIT_CHARACTERS.chars().map(String::from).collect(),
                resolve_provider: false,
            },
        }
    }

    /// Gate for requests other than `initialize`
    fn ensure_running(&self) -> Result<(), HandlerError> {
        match self.lifecycle {
            Lifecycle::Running => Ok(()),
            Lifecycle::Uninitialized => Err(HandlerError::not_initialized()),
            Lifecycle::ShuttingDown | Lifecycle::Exited => {
                Err(HandlerError::invalid_request("server is shutting down"))
            }
        }
    }

    /// Gate for document notifications; these are dropped outside Running.
    fn accepts_notifications(&self, method: &str) -> bool {
        if self.lifecycle == Lifecycle::Running {
            return true;
        }
        tracing::warn!("Drop {} in state {:?}", method, self.lifecycle);
        false
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    fn initialize(&mut self, params: InitializeParams) -> Result<InitializeResult, HandlerError> {
        if self.lifecycle != Lifecycle::Uninitialized {
            return Err(HandlerError::invalid_request("server is already initialized"));
        }

        tracing::debug!("Initialize params:\n{}", format_initialize_params(&params));

        let pid = match &params.process_id {
            None => i64::from(std::os::unix::process::parent_id()),
            Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
                HandlerError::invalid_params("processId must be an integer or null")
            })?,
            Some(_) => {
                return Err(HandlerError::invalid_params(
                    "processId must be an integer or null",
                ));
            }
        };
        tracing::info!("Watch for process with pid {}", pid);

        self.client_pid = Some(pid);
        if let Some(trace) = params.trace {
            self.trace = trace;
        }
        self.lifecycle = Lifecycle::Running;
        tracing::info!("Initialized with {} completor", self.completor.name());

        Ok(InitializeResult {
            capabilities: Self::capabilities(),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        })
    }

    fn initialized(&mut self) {
        tracing::debug!("Client confirmed initialization");
    }

    fn shutdown(&mut self) -> Result<(), HandlerError> {
        self.ensure_running()?;
        tracing::info!("Shutdown requested; {} documents open", self.corpus.len());
        self.lifecycle = Lifecycle::ShuttingDown;
        Ok(())
    }

    fn exit(&mut self) {
        if self.lifecycle != Lifecycle::ShuttingDown {
            tracing::warn!("Exit without prior shutdown");
        }
        self.lifecycle = Lifecycle::Exited;
    }

    fn set_trace(&mut self, params: SetTraceParams) {
        tracing::debug!("Trace level set to {}", params.value);
        self.trace = params.value;
    }

    // ========================================================================
    // Text Document Synchronization
    // ========================================================================

    fn did_open(&mut self, params: DidOpenTextDocumentParams) {
        if !self.accepts_notifications(text_document::DID_OPEN.method) {
            return;
        }
        let doc = params.text_document;
        tracing::debug!("Open {} (version {})", doc.uri, doc.version);
        self.corpus.open(doc.uri, doc.text, doc.version);
    }

    fn did_change(&mut self, params: DidChangeTextDocumentParams) -> Result<(), HandlerError> {
        if !self.accepts_notifications(text_document::DID_CHANGE.method) {
            return Ok(());
        }
        let uri = params.text_document.uri;
        let version = params.text_document.version;
        tracing::debug!("Apply {} changes to {}", params.content_changes.len(), uri);

        for change in params.content_changes {
            if change.range.is_some() {
                tracing::warn!("Incremental change to {} is not supported; skipped", uri);
                continue;
            }
            self.corpus
                .set_text(&uri, change.text, version)
                .map_err(anyhow::Error::from)?;
        }
        Ok(())
    }

    fn did_close(&mut self, params: DidCloseTextDocumentParams) {
        if !self.accepts_notifications(text_document::DID_CLOSE.method) {
            return;
        }
        if self.corpus.close(&params.text_document.uri).is_none() {
            tracing::warn!("Close for unknown document {}", params.text_document.uri);
        }
    }

    fn did_save(&mut self, params: DidSaveTextDocumentParams) -> Result<(), HandlerError> {
        if !self.accepts_notifications(text_document::DID_SAVE.method) {
            return Ok(());
        }
        if let Some(text) = params.text {
            self.corpus
                .set_text(&params.text_document.uri, text, None)
                .map_err(anyhow::Error::from)?;
        }
        Ok(())
    }

    // ========================================================================
    // Completion
    // ========================================================================

    fn completion(&mut self, params: CompletionParams) -> Result<Vec<CompletionItem>, HandlerError> {
        self.ensure_running()?;

        let uri = &params.text_document.uri;
        let Position { line, character } = params.position;
        let doc = self
            .corpus
            .get(uri)
            .ok_or_else(|| anyhow::anyhow!("Document is not open: {}", uri))?;
        tracing::trace!("Cursor line {}: {:?}", line, doc.line(line));

        let items: Vec<_> = self
            .completor
            .complete(doc, line, character)
            .into_iter()
            .map(|label| CompletionItem { label })
            .collect();
        tracing::debug!("Complete {}:{}:{} -> {} items", uri, line, character, items.len());
        Ok(items)
    }
}

impl LanguageServer for CompletionServer {
    fn register(router: &mut Router<Self>) {
        router.route(&general::INITIALIZE, Self::initialize);
        router.route(&general::INITIALIZED, |s: &mut Self, _: IgnoredAny| {
            s.initialized();
            Ok(())
        });
        router.route(&general::SHUTDOWN, |s: &mut Self, _: IgnoredAny| s.shutdown());
        router.route(&general::EXIT, |s: &mut Self, _: IgnoredAny| {
            s.exit();
            Ok(())
        });
        router.route(&general::SET_TRACE, |s: &mut Self, p| {
            s.set_trace(p);
            Ok(())
        });

        router.route(&text_document::DID_OPEN, |s: &mut Self, p| {
            s.did_open(p);
            Ok(())
        });
        router.route(&text_document::DID_CHANGE, Self::did_change);
        router.route(&text_document::DID_CLOSE, |s: &mut Self, p| {
            s.did_close(p);
            Ok(())
        });
        router.route(&text_document::DID_SAVE, Self::did_save);
        router.route(&text_document::COMPLETION, Self::completion);
    }

    fn exit_requested(&self) -> bool {
        self.lifecycle == Lifecycle::Exited
    }
}

/// Builds a [`CompletionServer`] per connection around a shared completor.
#[derive(Clone)]
pub struct CompletionServerFactory {
    completor: Arc<dyn Completor + Send + Sync>,
}

impl CompletionServerFactory {
    pub fn new(completor: Arc<dyn Completor + Send + Sync>) -> Self {
        Self { completor }
    }
}

impl ProtocolFactory for CompletionServerFactory {
    type Protocol = CompletionServer;

    fn create(&self, peer: &str) -> CompletionServer {
        tracing::debug!("New completion server for {}", peer);
        CompletionServer::new(Arc::clone(&self.completor))
    }
}

/// Human-readable summary of the client's initialize request
pub fn format_initialize_params(params: &InitializeParams) -> String {
    let mut out = String::new();
    let json = |v: &Option<Value>| v.as_ref().map_or("null".to_string(), Value::to_string);

    let pid = json(&params.process_id);
    let _ = writeln!(out, "Parent PID:             {}", pid);
    if let Some(info) = &params.client_info {
        match &info.version {
            Some(v) => {
                let _ = writeln!(out, "Client info:            {}/{}", info.name, v);
            }
            None => {
                let _ = writeln!(out, "Client info:            {}", info.name);
            }
        }
    }
    let _ = writeln!(out, "Locale:                 {}", params.locale.as_deref().unwrap_or(""));
    let root = params.root_uri.as_deref().or(params.root_path.as_deref());
    let _ = writeln!(out, "Root URI:               {}", root.unwrap_or("null"));
    let _ = writeln!(out, "Workspace Folders:");
    for (i, folder) in params.workspace_folders.iter().flatten().enumerate() {
        let _ = writeln!(out, "[{:2}] {} -> {}", i + 1, folder.name, folder.uri);
    }
    let _ = writeln!(out, "Initialization Options: {}", json(&params.initialization_options));
    let _ = writeln!(out, "Tracing:                {}", params.trace.as_deref().unwrap_or("off"));

    let caps = params.capabilities.as_ref();
    let _ = writeln!(out, "Client Capabilities:");
    for (label, key) in [
        ("General", "general"),
        ("Document", "textDocument"),
        ("Workspace", "workspace"),
        ("Experimental", "experimental"),
    ] {
        let value = caps.and_then(|c| c.get(key)).cloned();
        let _ = writeln!(out, "[{}] {}", label, json(&value));
    }
    out
}
