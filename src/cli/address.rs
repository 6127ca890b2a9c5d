//! Transport address parsing for CLI commands
//!
//! Accepted forms:
//!
//! ```text
//! stdio:                 stdio
//! tcp://localhost:8080   tcp4://127.0.0.1:8080   tcp6://[::1]:8080
//! unix:///run/lsp-lm.sock
//! localhost:8080         (bare host:port means tcp)
//! ```
//!
//! Any form may carry `?key=value&key=value` options; repeated keys
//! accumulate.

use std::path::PathBuf;

use crate::error::TransportError;
use crate::server::{TransportAddress, TransportKind};

pub fn parse_address(input: &str) -> Result<TransportAddress, TransportError> {
    let input = input.trim();
    let invalid = |message: &str| TransportError::InvalidAddress {
        input: input.to_string(),
        message: message.to_string(),
    };

    if input.is_empty() {
        return Err(invalid("address cannot be empty"));
    }

    let (body, query) = match input.split_once('?') {
        Some((body, query)) => (body, Some(query)),
        None => (input, None),
    };

    let (kind, rest) = split_scheme(body);
    let mut address = match kind {
        TransportKind::Stdio => {
            if !rest.is_empty() {
                return Err(invalid("stdio takes no host, port or path"));
            }
            TransportAddress::stdio()
        }
        TransportKind::Unix => TransportAddress::unix(PathBuf::from(rest)),
        kind => {
            let (host, port) = split_host_port(rest).map_err(|m| invalid(&m))?;
            TransportAddress {
                kind,
                host: (!host.is_empty()).then(|| host.to_string()),
                port,
                path: None,
                options: Default::default(),
            }
        }
    };

    for pair in query.into_iter().flat_map(|q| q.split('&')).filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        address.add_option(key, value);
    }

    address.validate()?;
    Ok(address)
}

/// Split `scheme:[//]rest`. Anything without a known scheme is tcp.
fn split_scheme(body: &str) -> (TransportKind, &str) {
    if body.eq_ignore_ascii_case("stdio") {
        return (TransportKind::Stdio, "");
    }

    if let Some((scheme, rest)) = body.split_once(':') {
        let kind = match scheme.to_ascii_lowercase().as_str() {
            "stdio" => Some(TransportKind::Stdio),
            "tcp" => Some(TransportKind::Tcp),
            "tcp4" => Some(TransportKind::Tcp4),
            "tcp6" => Some(TransportKind::Tcp6),
            "unix" => Some(TransportKind::Unix),
            _ => None,
        };
        if let Some(kind) = kind {
            return (kind, rest.strip_prefix("//").unwrap_or(rest));
        }
    }

    (TransportKind::Tcp, body)
}

fn split_host_port(rest: &str) -> Result<(&str, Option<u16>), String> {
    let rest = rest.trim_end_matches('/');

    let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| "unterminated IPv6 literal".to_string())?;
        match after {
            "" => (host, None),
            _ => match after.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None => return Err(format!("unexpected '{}' after IPv6 literal", after)),
            },
        }
    } else {
        match rest.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (rest, None),
        }
    };

    let port = port
        .map(|p| {
            p.parse::<u16>()
                .map_err(|_| format!("invalid port '{}'", p))
        })
        .transpose()?;
    Ok((host, port))
}
