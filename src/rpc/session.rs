//! Per-connection frame pump
//!
//! A session owns one connection's read and write halves, a freshly built
//! [`Router`] and the protocol state. Messages are handled strictly one at a
//! time, so replies leave in the order their requests arrived.

use tokio::io::{AsyncRead, AsyncWrite, BufReader};

use super::envelope::{self, Envelope, ErrorResponse, RequestId, ResponseError};
use super::frame::{DEFAULT_MAX_CONTENT_LENGTH, FrameReader, FrameWriter};
use super::router::{LanguageServer, Router};
use crate::error::{EnvelopeError, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Halves bound and handlers registered
    Open,
    Serving,
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub replies: u64,
    pub rejected: u64,
}

pub struct Session<R, W, P> {
    peer: String,
    reader: FrameReader<BufReader<R>>,
    writer: FrameWriter<W>,
    router: Router<P>,
    protocol: P,
    state: SessionState,
    stats: SessionStats,
}

impl<R, W, P> Session<R, W, P>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    P: LanguageServer,
{
    pub fn new(peer: impl Into<String>, reader: R, writer: W, protocol: P) -> Self {
        Self::with_limit(peer, reader, writer, protocol, DEFAULT_MAX_CONTENT_LENGTH)
    }

    pub fn with_limit(
        peer: impl Into<String>,
        reader: R,
        writer: W,
        protocol: P,
        max_content_length: usize,
    ) -> Self {
        let mut router = Router::new();
        P::register(&mut router);

        let peer = peer.into();
        tracing::debug!("Session {} open with {} routes", peer, router.len());

        Self {
            peer,
            reader: FrameReader::with_limit(BufReader::new(reader), max_content_length),
            writer: FrameWriter::new(writer),
            router,
            protocol,
            state: SessionState::Open,
            stats: SessionStats::default(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    /// Consume the session, returning the protocol state and write half.
    pub fn into_parts(self) -> (P, W) {
        (self.protocol, self.writer.into_inner())
    }

    /// Serve until the peer closes the stream, the protocol asks to exit, or
    /// a framing or I/O error occurs. A closed session cannot be restarted.
    pub async fn run(&mut self) -> Result<SessionStats, SessionError> {
        if self.state == SessionState::Closed {
            return Ok(self.stats);
        }

        self.state = SessionState::Serving;
        let result = self.serve().await;
        self.state = SessionState::Closed;

        match &result {
            Ok(()) => tracing::info!(
                "Session {} closed ({} frames, {} replies)",
                self.peer,
                self.stats.frames,
                self.stats.replies
            ),
            Err(e) => tracing::warn!("Session {} closed with error: {}", self.peer, e),
        }

        result.map(|()| self.stats)
    }

    async fn serve(&mut self) -> Result<(), SessionError> {
        loop {
            let Some(frame) = self.reader.read_frame().await? else {
                tracing::debug!("Session {}: end of stream", self.peer);
                return Ok(());
            };
            self.stats.frames += 1;

            let media_type = frame.media_type();
            let reply = match envelope::decode(&frame.content, &media_type.charset) {
                Ok(envelope) => self.router.dispatch(&mut self.protocol, envelope),
                Err(err) => {
                    tracing::warn!("Malformed message from {}: {}", self.peer, err);
                    self.stats.rejected += 1;
                    Some(rejection(&err))
                }
            };

            if let Some(reply) = reply {
                let content = reply.encode()?;
                self.writer.write_frame(&content).await?;
                self.stats.replies += 1;
            }

            if self.protocol.exit_requested() {
                tracing::debug!("Session {}: exit requested", self.peer);
                return Ok(());
            }
        }
    }
}

/// Error reply for a payload that could not be classified
fn rejection(err: &EnvelopeError) -> Envelope {
    let id = match err {
        EnvelopeError::MissingMethod { id } | EnvelopeError::InvalidMethod { id } => {
            id.as_ref().and_then(RequestId::from_value)
        }
        _ => None,
    };
    ErrorResponse::new(id, ResponseError::from_envelope_error(err)).into()
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::error::{FrameError, HandlerError};
    use crate::rpc::envelope::ErrorCode;
    use crate::rpc::frame::write_frame;

    #[derive(Default)]
    struct Echo {
        exit: bool,
    }

    impl LanguageServer for Echo {
        fn register(router: &mut Router<Self>) {
            router.register("echo", true, |_, params| Ok(params));
            router.register("shutdown", true, |_, _| Ok(Value::Null));
            router.register("fail", false, |_, _| {
                Err(HandlerError::Internal(anyhow::anyhow!("nope")))
            });
            router.register("exit", false, |p: &mut Echo, _| {
                p.exit = true;
                Ok(Value::Null)
            });
        }

        fn exit_requested(&self) -> bool {
            self.exit
        }
    }

    async fn frames(messages: &[Value]) -> Vec<u8> {
        let mut out = Vec::new();
        for m in messages {
            write_frame(&mut out, m.to_string().as_bytes()).await.unwrap();
        }
        out
    }

    async fn replies(output: &[u8]) -> Vec<Value> {
        let mut reader = FrameReader::new(output);
        let mut out = Vec::new();
        while let Some(frame) = reader.read_frame().await.unwrap() {
            out.push(serde_json::from_slice(&frame.content).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_replies_follow_request_order() {
        let input = frames(&[
            json!({"jsonrpc": "2.0", "id": 1, "method": "echo", "params": {"n": 1}}),
            json!({"jsonrpc": "2.0", "method": "fail"}),
            json!({"jsonrpc": "2.0", "id": "two", "method": "echo", "params": {"n": 2}}),
            json!({"jsonrpc": "2.0", "id": 3, "method": "shutdown"}),
        ])
        .await;

        let mut session = Session::new("test", input.as_slice(), Vec::new(), Echo::default());
        assert_eq!(session.state(), SessionState::Open);

        let stats = session.run().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(stats.frames, 4);
        assert_eq!(stats.replies, 3);

        let (_, output) = session.into_parts();
        let ids: Vec<_> = replies(&output).await.into_iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!("two"), json!(3)]);
    }

    #[tokio::test]
    async fn test_bad_content_length_closes_without_reply() {
        let input = b"Content-Length: notanumber\r\n\r\n{}".as_slice();
        let mut session = Session::new("test", input, Vec::new(), Echo::default());

        let err = session.run().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Frame(FrameError::InvalidContentLength(_))
        ));
        assert_eq!(session.state(), SessionState::Closed);

        let (_, output) = session.into_parts();
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_envelopes_are_answered() {
        let mut input = Vec::new();
        write_frame(&mut input, b"{not json").await.unwrap();
        write_frame(&mut input, br#"{"jsonrpc":"2.0","id":9}"#).await.unwrap();
        write_frame(&mut input, br#"{"jsonrpc":"2.0","id":1.5,"method":"echo"}"#)
            .await
            .unwrap();
        write_frame(&mut input, br#"{"jsonrpc":"2.0","id":10,"method":"shutdown"}"#)
            .await
            .unwrap();

        let mut session = Session::new("test", input.as_slice(), Vec::new(), Echo::default());
        let stats = session.run().await.unwrap();
        assert_eq!(stats.rejected, 3);

        let (_, output) = session.into_parts();
        let replies = replies(&output).await;
        assert_eq!(replies.len(), 4);
        assert_eq!(replies[0]["id"], Value::Null);
        assert_eq!(replies[0]["error"]["code"], json!(ErrorCode::ParseError.code()));
        assert_eq!(replies[1]["id"], json!(9));
        assert_eq!(replies[1]["error"]["code"], json!(ErrorCode::InvalidRequest.code()));
        assert_eq!(replies[2]["id"], Value::Null);
        assert_eq!(replies[2]["error"]["code"], json!(ErrorCode::InvalidRequest.code()));
        assert_eq!(replies[3]["result"], Value::Null);
    }

    #[tokio::test]
    async fn test_u64_request_id_is_echoed() {
        let mut input = Vec::new();
        write_frame(
            &mut input,
            br#"{"jsonrpc":"2.0","id":18446744073709551615,"method":"echo","params":[1]}"#,
        )
        .await
        .unwrap();

        let mut session = Session::new("test", input.as_slice(), Vec::new(), Echo::default());
        let stats = session.run().await.unwrap();
        assert_eq!(stats.rejected, 0);

        let (_, output) = session.into_parts();
        let replies = replies(&output).await;
        assert_eq!(replies[0]["id"], json!(u64::MAX));
        assert_eq!(replies[0]["result"], json!([1]));
    }

    #[tokio::test]
    async fn test_unsupported_charset_is_parse_error() {
        let body = br#"{"jsonrpc":"2.0","id":1,"method":"shutdown"}"#;
        let mut input = format!(
            "Content-Length: {}\r\nContent-Type: application/vscode-jsonrpc; charset=koi8-r\r\n\r\n",
            body.len()
        )
        .into_bytes();
        input.extend_from_slice(body);

        let mut session = Session::new("test", input.as_slice(), Vec::new(), Echo::default());
        session.run().await.unwrap();

        let (_, output) = session.into_parts();
        let replies = replies(&output).await;
        assert_eq!(replies[0]["error"]["code"], json!(-32700));
    }

    #[tokio::test]
    async fn test_exit_ends_session_over_duplex() {
        let (mut client, server) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(server);

        let handle = tokio::spawn(async move {
            let mut session = Session::new("duplex", read_half, write_half, Echo::default());
            let stats = session.run().await;
            (stats, session.protocol().exit)
        });

        let input = frames(&[
            json!({"jsonrpc": "2.0", "id": 0, "method": "echo", "params": [1, 2]}),
            json!({"jsonrpc": "2.0", "method": "exit"}),
        ])
        .await;
        client.write_all(&input).await.unwrap();

        // The client keeps its end open; only the exit notification stops the
        // session.
        let (stats, exited) = handle.await.unwrap();
        assert!(exited);
        assert_eq!(stats.unwrap().replies, 1);

        let mut reader = FrameReader::new(BufReader::new(&mut client));
        let frame = reader.read_frame().await.unwrap().unwrap();
        let reply: Value = serde_json::from_slice(&frame.content).unwrap();
        assert_eq!(reply, json!({"jsonrpc": "2.0", "id": 0, "result": [1, 2]}));
    }
}
