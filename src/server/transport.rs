//! Transport addresses
//!
//! Where a server listens or a client connects. Parsing the string form is
//! the CLI's job (`cli::address`); this module holds the validated value.

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Stdio,
    Tcp,
    Tcp4,
    Tcp6,
    Unix,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Tcp => "tcp",
            Self::Tcp4 => "tcp4",
            Self::Tcp6 => "tcp6",
            Self::Unix => "unix",
        }
    }

    pub fn is_tcp(self) -> bool {
        matches!(self, Self::Tcp | Self::Tcp4 | Self::Tcp6)
    }

    /// Whether a resolved socket address is acceptable for this kind
    pub fn accepts(self, addr: &SocketAddr) -> bool {
        match self {
            Self::Tcp => true,
            Self::Tcp4 => addr.is_ipv4(),
            Self::Tcp6 => addr.is_ipv6(),
            Self::Stdio | Self::Unix => false,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transport endpoint. `options` is a multimap of `?key=value` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportAddress {
    pub kind: TransportKind,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<PathBuf>,
    pub options: BTreeMap<String, Vec<String>>,
}

impl TransportAddress {
    pub fn stdio() -> Self {
        Self {
            kind: TransportKind::Stdio,
            host: None,
            port: None,
            path: None,
            options: BTreeMap::new(),
        }
    }

    pub fn tcp(kind: TransportKind, host: impl Into<String>, port: u16) -> Self {
        Self {
            kind,
            host: Some(host.into()),
            port: Some(port),
            path: None,
            options: BTreeMap::new(),
        }
    }

    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: TransportKind::Unix,
            host: None,
            port: None,
            path: Some(path.into()),
            options: BTreeMap::new(),
        }
    }

    pub fn add_option(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.options.entry(key.into()).or_default().push(value.into());
    }

    /// First value recorded for `key`
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Check the fields the kind requires. Stdio ignores all of them.
    pub fn validate(&self) -> Result<(), TransportError> {
        match self.kind {
            TransportKind::Stdio => Ok(()),
            TransportKind::Unix => match &self.path {
                Some(p) if !p.as_os_str().is_empty() => Ok(()),
                _ => Err(TransportError::MissingPath),
            },
            kind => {
                if self.host.as_deref().is_none_or(str::is_empty) {
                    return Err(TransportError::MissingHost {
                        kind: kind.to_string(),
                    });
                }
                if self.port.is_none() {
                    return Err(TransportError::MissingPort {
                        kind: kind.to_string(),
                    });
                }
                Ok(())
            }
        }
    }

    /// Resolve host and port, keeping only addresses of the kind's family.
    pub async fn socket_addrs(&self) -> Result<Vec<SocketAddr>, TransportError> {
        self.validate()?;
        let (Some(host), Some(port)) = (self.host.as_deref(), self.port) else {
            return Err(TransportError::MissingHost {
                kind: self.kind.to_string(),
            });
        };

        let addrs: Vec<_> = tokio::net::lookup_host((host, port))
            .await?
            .filter(|addr| self.kind.accepts(addr))
            .collect();

        if addrs.is_empty() {
            return Err(TransportError::NoAddress {
                host: host.to_string(),
                family: self.kind.to_string(),
            });
        }
        Ok(addrs)
    }
}

impl fmt::Display for TransportAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TransportKind::Stdio => f.write_str("stdio:"),
            TransportKind::Unix => {
                let path = self.path.as_deref().unwrap_or(Path::new(""));
                write!(f, "unix://{}", path.display())
            }
            kind => {
                let host = self.host.as_deref().unwrap_or_default();
                let port = self.port.unwrap_or_default();
                if host.contains(':') {
                    write!(f, "{}://[{}]:{}", kind, host, port)
                } else {
                    write!(f, "{}://{}:{}", kind, host, port)
                }
            }
        }
    }
}
