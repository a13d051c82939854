//! Per-connection WebSocket handling.

use crate::connection::{ClientSocket, WsClientSocket};
use crate::error::RelayError;
use crate::messaging::types::{ClientReply, CODE_NODE_FULL, CODE_SYSTEM_ID_MISSING};
use crate::node::RelayNode;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace};

/// Handles one client from handshake to teardown.
///
/// 1. Upgrade the socket, capturing the `systemId` query parameter
/// 2. Refuse the client with an error frame if `systemId` is missing or the
///    node is full
/// 3. Register the connection and send the connect acknowledgement
/// 4. Read until the peer closes or the transport fails
/// 5. Tear the connection down
///
/// Inbound application frames are not routed; sends reach clients through
/// the node's routing API.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    node: Arc<RelayNode>,
) -> Result<(), RelayError> {
    let max_message_size = node.config().max_message_size;
    let ws_config = WebSocketConfig::default()
        .max_message_size(Some(max_message_size))
        .max_frame_size(Some(max_message_size));

    let mut system_id: Option<String> = None;
    let capture = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        system_id = query_param(request.uri().query(), "systemId");
        Ok(response)
    };
    let ws_stream = accept_hdr_async_with_config(stream, capture, Some(ws_config))
        .await
        .map_err(|e| RelayError::Network(format!("WebSocket handshake failed: {e}")))?;

    let (sink, mut receiver) = ws_stream.split();
    let socket = Arc::new(WsClientSocket::new(sink));

    let Some(system_id) = system_id.filter(|id| !id.is_empty()) else {
        debug!("🚫 Refusing {}: missing systemId", addr);
        refuse(&socket, CODE_SYSTEM_ID_MISSING, "systemId is required").await;
        return Ok(());
    };

    let connection = match node.accept(&system_id, socket.clone(), Some(addr)).await {
        Ok(connection) => connection,
        Err(e) => {
            refuse(&socket, CODE_NODE_FULL, &e.to_string()).await;
            return Err(e);
        }
    };
    let client_id = connection.id.clone();

    let ack = ClientReply::connected(client_id.clone())
        .to_json()
        .map_err(|e| RelayError::Internal(format!("encoding connect ack: {e}")))?;
    if let Err(e) = socket.send_text(&ack).await {
        node.disconnect(&client_id).await;
        return Err(e.into());
    }
    debug!("👋 Client {} connected from {} (system '{}')", client_id, addr, system_id);

    loop {
        let frame = tokio::select! {
            frame = receiver.next() => frame,
            _ = socket.closed() => {
                debug!("🔌 Client {} closed by the node", client_id);
                break;
            }
        };
        match frame {
            Some(Ok(Message::Close(_))) | None => {
                debug!("🔌 Client {} requested close", client_id);
                break;
            }
            Some(Ok(Message::Text(_))) | Some(Ok(Message::Binary(_))) => {
                trace!("Ignoring inbound frame from {}", client_id);
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!("WebSocket error for client {}: {}", client_id, e);
                break;
            }
        }
    }

    node.disconnect(&client_id).await;
    Ok(())
}

async fn refuse(socket: &WsClientSocket, code: i32, msg: &str) {
    if let Ok(reply) = ClientReply::error(code, msg).to_json() {
        let _ = socket.send_text(&reply).await;
    }
    socket.close(msg).await;
}

/// Form-decoded value of `name` in a query string. A value with a broken
/// percent escape or invalid UTF-8 counts as absent.
fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| form_decode(value))
}

fn form_decode(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'+' => {
                decoded.push(b' ');
                index += 1;
            }
            b'%' => {
                let hex = value
                    .get(index + 1..index + 3)
                    .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))?;
                decoded.push(u8::from_str_radix(hex, 16).ok()?);
                index += 3;
            }
            byte => {
                decoded.push(byte);
                index += 1;
            }
        }
    }
    String::from_utf8(decoded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param() {
        assert_eq!(query_param(Some("systemId=shop&x=1"), "systemId").as_deref(), Some("shop"));
        assert_eq!(query_param(Some("x=1&systemId="), "systemId").as_deref(), Some(""));
        assert_eq!(query_param(Some("x=1"), "systemId"), None);
        assert_eq!(query_param(None, "systemId"), None);
    }

    #[test]
    fn test_query_param_is_form_decoded() {
        assert_eq!(query_param(Some("systemId=a%20b"), "systemId").as_deref(), Some("a b"));
        assert_eq!(query_param(Some("systemId=a+b"), "systemId").as_deref(), Some("a b"));
        assert_eq!(query_param(Some("systemId=caf%C3%A9"), "systemId").as_deref(), Some("café"));
        assert_eq!(query_param(Some("systemId=%2"), "systemId"), None);
        assert_eq!(query_param(Some("systemId=%zz"), "systemId"), None);
        assert_eq!(query_param(Some("systemId=%+1"), "systemId"), None);
    }
}
