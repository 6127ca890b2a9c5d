//! LSP Capability Catalog
//!
//! Every endpoint this engine understands, grouped by capability area and
//! tagged as request or notification. The table is part of the protocol,
//! not of any particular server: which endpoints actually get handlers is
//! decided by the [`LanguageServer`](super::router::LanguageServer)
//! implementation.

use serde::Serialize;

/// Whether a method expects a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Request,
    Notification,
}

/// A catalogued endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub method: &'static str,
    pub kind: Kind,
}

impl Endpoint {
    pub const fn request(method: &'static str) -> Self {
        Self {
            method,
            kind: Kind::Request,
        }
    }

    pub const fn notification(method: &'static str) -> Self {
        Self {
            method,
            kind: Kind::Notification,
        }
    }

    pub fn requires_result(&self) -> bool {
        self.kind == Kind::Request
    }
}

/// A named group of endpoints
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CapabilityGroup {
    pub name: &'static str,
    pub endpoints: &'static [Endpoint],
}

pub mod general {
    use super::Endpoint;

    pub const INITIALIZE: Endpoint = Endpoint::request("initialize");
    pub const INITIALIZED: Endpoint = Endpoint::notification("initialized");
    pub const SHUTDOWN: Endpoint = Endpoint::request("shutdown");
    pub const EXIT: Endpoint = Endpoint::notification("exit");
    pub const LOG_TRACE: Endpoint = Endpoint::notification("$/logTrace");
    pub const SET_TRACE: Endpoint = Endpoint::notification("$/setTrace");

    pub const ENDPOINTS: &[Endpoint] = &[
        INITIALIZE,
        INITIALIZED,
        SHUTDOWN,
        EXIT,
        LOG_TRACE,
        SET_TRACE,
    ];
}

pub mod client {
    use super::Endpoint;

    pub const REGISTER_CAPABILITY: Endpoint = Endpoint::request("client/registerCapability");
    pub const UNREGISTER_CAPABILITY: Endpoint = Endpoint::request("client/unregisterCapability");

    pub const ENDPOINTS: &[Endpoint] = &[REGISTER_CAPABILITY, UNREGISTER_CAPABILITY];
}

pub mod diagnostics {
    use super::Endpoint;

    pub const PUBLISH_DIAGNOSTICS: Endpoint =
        Endpoint::notification("textDocument/publishDiagnostics");

    pub const ENDPOINTS: &[Endpoint] = &[PUBLISH_DIAGNOSTICS];
}

pub mod telemetry {
    use super::Endpoint;

    pub const EVENT: Endpoint = Endpoint::notification("telemetry/event");

    pub const ENDPOINTS: &[Endpoint] = &[EVENT];
}

pub mod text_document {
    use super::Endpoint;

    pub const COMPLETION: Endpoint = Endpoint::request("textDocument/completion");
    pub const DID_CHANGE: Endpoint = Endpoint::notification("textDocument/didChange");
    pub const DID_CLOSE: Endpoint = Endpoint::notification("textDocument/didClose");
    pub const DID_OPEN: Endpoint = Endpoint::notification("textDocument/didOpen");
    pub const DID_SAVE: Endpoint = Endpoint::notification("textDocument/didSave");
    pub const HOVER: Endpoint = Endpoint::request("textDocument/hover");
    pub const WILL_SAVE: Endpoint = Endpoint::notification("textDocument/willSave");
    pub const WILL_SAVE_WAIT_UNTIL: Endpoint =
        Endpoint::notification("textDocument/willSaveWaitUntil");

    pub const ENDPOINTS: &[Endpoint] = &[
        COMPLETION,
        DID_CHANGE,
        DID_CLOSE,
        DID_OPEN,
        DID_SAVE,
        HOVER,
        WILL_SAVE,
        WILL_SAVE_WAIT_UNTIL,
    ];
}

pub mod window {
    use super::Endpoint;

    pub const LOG_MESSAGE: Endpoint = Endpoint::notification("window/logMessage");
    pub const SHOW_DOCUMENT: Endpoint = Endpoint::request("window/showDocument");
    pub const SHOW_MESSAGE: Endpoint = Endpoint::notification("window/showMessage");
    pub const SHOW_MESSAGE_REQUEST: Endpoint = Endpoint::request("window/showMessageRequest");

    pub const ENDPOINTS: &[Endpoint] = &[
        LOG_MESSAGE,
        SHOW_DOCUMENT,
        SHOW_MESSAGE,
        SHOW_MESSAGE_REQUEST,
    ];
}

pub mod workspace {
    use super::Endpoint;

    pub const APPLY_EDIT: Endpoint = Endpoint::request("workspace/applyEdit");
    pub const CONFIGURATION: Endpoint = Endpoint::request("workspace/configuration");
    pub const DID_CHANGE_CONFIGURATION: Endpoint =
        Endpoint::notification("workspace/didChangeConfiguration");
    pub const DID_CHANGE_WATCHED_FILES: Endpoint =
        Endpoint::notification("workspace/didChangeWatchedFiles");
    pub const DID_CHANGE_WORKSPACE_FOLDERS: Endpoint =
        Endpoint::notification("workspace/didChangeWorkspaceFolders");
    pub const DID_CREATE_FILES: Endpoint = Endpoint::notification("workspace/didCreateFiles");
    pub const DID_DELETE_FILES: Endpoint = Endpoint::notification("workspace/didDeleteFiles");
    pub const DID_RENAME_FILES: Endpoint = Endpoint::notification("workspace/didRenameFiles");
    pub const EXECUTE_COMMAND: Endpoint = Endpoint::request("workspace/executeCommand");
    pub const SYMBOL: Endpoint = Endpoint::request("workspace/symbol");
    pub const WILL_CREATE_FILES: Endpoint = Endpoint::notification("workspace/willCreateFiles");
    pub const WILL_RENAME_FILES: Endpoint = Endpoint::notification("workspace/willRenameFiles");
    pub const WILL_DELETE_FILES: Endpoint = Endpoint::notification("workspace/willDeleteFiles");
    pub const WORKSPACE_FOLDERS: Endpoint = Endpoint::request("workspace/workspaceFolders");

    pub const ENDPOINTS: &[Endpoint] = &[
        APPLY_EDIT,
        CONFIGURATION,
        DID_CHANGE_CONFIGURATION,
        DID_CHANGE_WATCHED_FILES,
        DID_CHANGE_WORKSPACE_FOLDERS,
        DID_CREATE_FILES,
        DID_DELETE_FILES,
        DID_RENAME_FILES,
        EXECUTE_COMMAND,
        SYMBOL,
        WILL_CREATE_FILES,
        WILL_RENAME_FILES,
        WILL_DELETE_FILES,
        WORKSPACE_FOLDERS,
    ];
}

pub const GROUPS: &[CapabilityGroup] = &[
    CapabilityGroup {
        name: "General",
        endpoints: general::ENDPOINTS,
    },
    CapabilityGroup {
        name: "Client",
        endpoints: client::ENDPOINTS,
    },
    CapabilityGroup {
        name: "Diagnostics",
        endpoints: diagnostics::ENDPOINTS,
    },
    CapabilityGroup {
        name: "Telemetry",
        endpoints: telemetry::ENDPOINTS,
    },
    CapabilityGroup {
        name: "TextDocument",
        endpoints: text_document::ENDPOINTS,
    },
    CapabilityGroup {
        name: "Window",
        endpoints: window::ENDPOINTS,
    },
    CapabilityGroup {
        name: "Workspace",
        endpoints: workspace::ENDPOINTS,
    },
];

/// Find a catalogued endpoint by method name
pub fn lookup(method: &str) -> Option<&'static Endpoint> {
    endpoints().find(|e| e.method == method)
}

/// Capability group a method belongs to
pub fn group_of(method: &str) -> Option<&'static CapabilityGroup> {
    GROUPS
        .iter()
        .find(|g| g.endpoints.iter().any(|e| e.method == method))
}

pub fn endpoints() -> impl Iterator<Item = &'static Endpoint> {
    GROUPS.iter().flat_map(|g| g.endpoints.iter())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_methods_are_unique() {
        let mut seen = HashSet::new();
        for endpoint in endpoints() {
            assert!(seen.insert(endpoint.method), "duplicate {}", endpoint.method);
        }
        assert_eq!(seen.len(), 36);
    }

    #[test]
    fn test_group_sizes() {
        let sizes: Vec<_> = GROUPS.iter().map(|g| (g.name, g.endpoints.len())).collect();
        assert_eq!(
            sizes,
            vec![
                ("General", 6),
                ("Client", 2),
                ("Diagnostics", 1),
                ("Telemetry", 1),
                ("TextDocument", 8),
                ("Window", 4),
                ("Workspace", 14),
            ]
        );
    }

    #[test]
    fn test_lookup() {
        let completion = lookup("textDocument/completion").unwrap();
        assert!(completion.requires_result());
        assert!(!lookup("exit").unwrap().requires_result());
        assert!(lookup("textDocument/definition").is_none());
        assert_eq!(group_of("$/setTrace").unwrap().name, "General");
        assert_eq!(group_of("workspace/symbol").unwrap().name, "Workspace");
    }

    #[test]
    fn test_request_flags() {
        let requests: Vec<_> = endpoints()
            .filter(|e| e.requires_result())
            .map(|e| e.method)
            .collect();
        assert_eq!(
            requests,
            vec![
                "initialize",
                "shutdown",
                "client/registerCapability",
                "client/unregisterCapability",
                "textDocument/completion",
                "textDocument/hover",
                "window/showDocument",
                "window/showMessageRequest",
                "workspace/applyEdit",
                "workspace/configuration",
                "workspace/executeCommand",
                "workspace/symbol",
                "workspace/workspaceFolders",
            ]
        );
    }
}
