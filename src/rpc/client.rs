//! Client Dispatcher
//!
//! Write-only counterpart of the session: builds requests and notifications,
//! frames them and writes them to the peer. Replies are not correlated;
//! callers read them with a [`FrameReader`](super::frame::FrameReader).

use serde_json::Value;
use tokio::io::AsyncWrite;

use super::envelope::{Envelope, Notification, Request, RequestId};
use super::frame::FrameWriter;
use crate::error::SessionError;

pub struct Dispatcher<W> {
    writer: FrameWriter<W>,
    next_request_id: i64,
    pretty: bool,
}

impl<W: AsyncWrite + Unpin> Dispatcher<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: FrameWriter::new(writer),
            next_request_id: 0,
            pretty: false,
        }
    }

    /// Indent outgoing JSON, for humans watching the wire
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Send a request and return the id it was assigned.
    pub async fn request(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<RequestId, SessionError> {
        let id = RequestId::Number(self.next_request_id);
        self.next_request_id += 1;

        tracing::debug!("Send request {} (id {})", method, id);
        self.send(&Request::new(id.clone(), method, params).into())
            .await?;
        Ok(id)
    }

    pub async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<(), SessionError> {
        tracing::debug!("Send notification {}", method);
        self.send(&Notification::new(method, params).into()).await
    }

    async fn send(&mut self, envelope: &Envelope) -> Result<(), SessionError> {
        let content = if self.pretty {
            serde_json::to_vec_pretty(envelope)?
        } else {
            envelope.encode()?
        };
        self.writer.write_frame(&content).await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::rpc::frame::FrameReader;

    async fn decode_all(bytes: &[u8]) -> Vec<Value> {
        let mut reader = FrameReader::new(bytes);
        let mut out = Vec::new();
        while let Some(frame) = reader.read_frame().await.unwrap() {
            out.push(serde_json::from_slice(&frame.content).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_request_ids_start_at_zero() {
        let mut dispatcher = Dispatcher::new(Vec::new());
        let first = dispatcher
            .request("initialize", Some(json!({"processId": null})))
            .await
            .unwrap();
        dispatcher.notify("initialized", None).await.unwrap();
        let second = dispatcher.request("shutdown", None).await.unwrap();

        assert_eq!(first, RequestId::Number(0));
        assert_eq!(second, RequestId::Number(1));

        let sent = decode_all(&dispatcher.into_inner()).await;
        assert_eq!(
            sent,
            vec![
                json!({"jsonrpc": "2.0", "id": 0, "method": "initialize", "params": {"processId": null}}),
                json!({"jsonrpc": "2.0", "method": "initialized"}),
                json!({"jsonrpc": "2.0", "id": 1, "method": "shutdown"}),
            ]
        );
    }

    #[tokio::test]
    async fn test_pretty_output_is_still_framed() {
        let mut dispatcher = Dispatcher::new(Vec::new()).pretty(true);
        dispatcher.notify("exit", None).await.unwrap();

        let raw = dispatcher.into_inner();
        let text = String::from_utf8(raw.clone()).unwrap();
        assert!(text.contains("\n  \"method\": \"exit\""));
        assert_eq!(decode_all(&raw).await, vec![json!({"jsonrpc": "2.0", "method": "exit"})]);
    }
}
