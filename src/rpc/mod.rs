//! JSON-RPC over the LSP base protocol
//!
//! Layers, bottom up: [`frame`] (Content-Length framing), [`envelope`]
//! (JSON-RPC message shapes), [`catalog`] (known LSP endpoints), [`router`]
//! (endpoint to handler), [`session`] (per-connection pump) and [`client`]
//! (outbound dispatcher).

pub mod catalog;
pub mod client;
pub mod envelope;
pub mod frame;
pub mod router;
pub mod session;

pub use client::Dispatcher;
pub use envelope::{Envelope, ErrorCode, RequestId, ResponseError};
pub use frame::{Frame, FrameReader, FrameWriter};
pub use router::{LanguageServer, Router};
pub use session::{Session, SessionState, SessionStats};
