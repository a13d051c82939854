//! Transport abstraction for a single client connection.
//!
//! The registry, dispatcher and heartbeat monitor only ever talk to a
//! client through [`ClientSocket`], so the WebSocket transport can be
//! replaced by a test double.

use crate::error::TransportError;
use async_trait::async_trait;
use futures_util::sink::SinkExt;
use futures_util::stream::SplitSink;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};

/// Write side of one bidirectional client transport.
#[async_trait]
pub trait ClientSocket: Send + Sync {
    /// Writes one application payload as a text frame.
    async fn send_text(&self, text: &str) -> Result<(), TransportError>;

    /// Sends a liveness probe that carries no application payload.
    async fn probe(&self) -> Result<(), TransportError>;

    /// Closes the transport. Errors are swallowed; closing twice is harmless.
    async fn close(&self, reason: &str);
}

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// [`ClientSocket`] over the write half of a tokio-tungstenite stream.
///
/// Writes hold the sink lock for as long as the peer takes to accept the
/// frame. `close` raises the `closed` flag first, which aborts any write in
/// flight and releases the lock, so a peer that stopped reading cannot keep
/// the socket open.
#[derive(Clone)]
pub struct WsClientSocket {
    sink: Arc<Mutex<WsSink>>,
    closed: watch::Sender<bool>,
}

impl WsClientSocket {
    pub fn new(sink: WsSink) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
            closed: watch::Sender::new(false),
        }
    }

    /// Resolves once `close` has been called.
    pub async fn closed(&self) {
        let mut closed = self.closed.subscribe();
        let _ = closed.wait_for(|closed| *closed).await;
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    async fn write(&self, message: Message) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let send = async {
            let mut sink = self.sink.lock().await;
            sink.send(message).await.map_err(|e| match e {
                tokio_tungstenite::tungstenite::Error::ConnectionClosed
                | tokio_tungstenite::tungstenite::Error::AlreadyClosed => TransportError::Closed,
                other => TransportError::Write(other.to_string()),
            })
        };
        tokio::select! {
            result = send => result,
            _ = self.closed() => Err(TransportError::Closed),
        }
    }
}

impl std::fmt::Debug for WsClientSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsClientSocket")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ClientSocket for WsClientSocket {
    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.write(Message::Text(text.to_string().into())).await
    }

    async fn probe(&self) -> Result<(), TransportError> {
        self.write(Message::Ping(Default::default())).await
    }

    async fn close(&self, reason: &str) {
        if self.closed.send_replace(true) {
            return;
        }
        let close_msg = Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: reason.to_string().into(),
        }));
        let mut sink = self.sink.lock().await;
        let _ = sink.send(close_msg).await;
        let _ = sink.close().await;
    }
}
