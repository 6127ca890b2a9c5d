//! Request/notification routing
//!
//! A [`Router`] maps endpoint names to handlers supplied by a
//! [`LanguageServer`] implementation. It is built once per session, so
//! handlers receive exclusive access to the protocol state and no locking
//! is involved.

use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::catalog::{self, Endpoint};
use super::envelope::{Envelope, ErrorResponse, Notification, Request, Response, ResponseError};
use crate::error::HandlerError;

pub type HandlerResult = Result<Value, HandlerError>;

type Handler<P> = Box<dyn Fn(&mut P, Value) -> HandlerResult + Send + Sync>;

/// The handler set of a concrete protocol implementation.
///
/// Implementations register handlers for the part of the catalog they
/// support; everything else is answered with `MethodNotFound`.
pub trait LanguageServer: Send + Sized + 'static {
    fn register(router: &mut Router<Self>);

    /// Checked after every message; `true` ends the session.
    fn exit_requested(&self) -> bool {
        false
    }
}

/// Binding of an endpoint to its handler
pub struct Route<P> {
    pub endpoint: String,
    pub requires_result: bool,
    handler: Handler<P>,
}

pub struct Router<P> {
    routes: HashMap<String, Route<P>>,
}

impl<P> Default for Router<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Router<P> {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Insert or replace the handler for `endpoint`. The last registration
    /// wins.
    pub fn register<F>(&mut self, endpoint: impl Into<String>, requires_result: bool, handler: F)
    where
        F: Fn(&mut P, Value) -> HandlerResult + Send + Sync + 'static,
    {
        let endpoint = endpoint.into();

        match catalog::lookup(&endpoint) {
            Some(known) if known.requires_result() != requires_result => tracing::warn!(
                "Route {} registered as {} but catalogued as {:?}",
                endpoint,
                if requires_result { "request" } else { "notification" },
                known.kind
            ),
            Some(_) => {}
            None => tracing::debug!("Route {} is not in the capability catalog", endpoint),
        }

        let route = Route {
            endpoint: endpoint.clone(),
            requires_result,
            handler: Box::new(handler),
        };

        if self.routes.insert(endpoint.clone(), route).is_some() {
            tracing::warn!("Route {} was already registered; overriding", endpoint);
        }
    }

    /// Register a typed handler for a catalogued endpoint. Params are
    /// deserialized into `T` (absent params read as `{}`), and the result is
    /// serialized back to JSON.
    pub fn route<T, R, F>(&mut self, endpoint: &Endpoint, handler: F)
    where
        T: DeserializeOwned,
        R: Serialize,
        F: Fn(&mut P, T) -> Result<R, HandlerError> + Send + Sync + 'static,
    {
        self.register(endpoint.method, endpoint.requires_result(), move |p, params| {
            let params: T = serde_json::from_value(params)?;
            let result = handler(p, params)?;
            serde_json::to_value(result)
                .map_err(|e| HandlerError::Internal(anyhow::anyhow!("Failed to encode result: {}", e)))
        });
    }

    pub fn contains(&self, endpoint: &str) -> bool {
        self.routes.contains_key(endpoint)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Route an inbound envelope. Returns the reply to send, if any.
    ///
    /// Requests always get exactly one Response or Error. Notifications and
    /// peer responses never get a reply.
    pub fn dispatch(&self, protocol: &mut P, envelope: Envelope) -> Option<Envelope> {
        match envelope {
            Envelope::Request(request) => Some(self.handle_request(protocol, request)),
            Envelope::Notification(notification) => {
                self.handle_notification(protocol, notification);
                None
            }
            Envelope::Response(Response { id, .. }) | Envelope::Error(ErrorResponse { id: Some(id), .. }) => {
                tracing::debug!("Ignore reply for id {}: no outstanding requests", id);
                None
            }
            Envelope::Error(ErrorResponse { id: None, error, .. }) => {
                tracing::warn!("Peer reported an error: {}", error);
                None
            }
        }
    }

    fn handle_request(&self, protocol: &mut P, request: Request) -> Envelope {
        let Request {
            id, method, params, ..
        } = request;
        tracing::debug!("Handle request {} (id {})", method, id);

        let Some(route) = self.routes.get(&method) else {
            tracing::warn!("Unsupported method to call: {}", method);
            return ErrorResponse::new(Some(id), ResponseError::method_not_found()).into();
        };

        if !route.requires_result {
            tracing::warn!("Notification {} was sent as a request", method);
        }

        match (route.handler)(protocol, normalize_params(params)) {
            Ok(result) => Response::new(id, result).into(),
            Err(err) => {
                match &err {
                    HandlerError::Internal(e) => {
                        tracing::error!("Failed to run route handler {}: {:#}", method, e)
                    }
                    other => tracing::warn!("Request {} failed: {}", method, other),
                }
                ErrorResponse::new(Some(id), ResponseError::from(err)).into()
            }
        }
    }

    fn handle_notification(&self, protocol: &mut P, notification: Notification) {
        let Notification { method, params, .. } = notification;
        tracing::debug!("Handle notification {}", method);

        let Some(route) = self.routes.get(&method) else {
            tracing::warn!("Unsupported notification: {}", method);
            return;
        };

        if route.requires_result {
            tracing::warn!("Request {} was sent as a notification; no reply", method);
        }

        if let Err(err) = (route.handler)(protocol, normalize_params(params)) {
            tracing::error!("Failed to handle notification {}: {}", method, err);
        }
    }
}

fn normalize_params(params: Option<Value>) -> Value {
    match params {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(v) => v,
    }
}
