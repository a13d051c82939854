//! Frames the relay itself writes to clients.

use crate::token::ClientId;
use serde::{Deserialize, Serialize};

/// Reply code for a successful connect.
pub const CODE_SUCCESS: i32 = 0;
/// Reply code for a handshake without a `systemId`.
pub const CODE_SYSTEM_ID_MISSING: i32 = 10001;
/// Reply code for a connection refused because the node is full.
pub const CODE_NODE_FULL: i32 = 10002;

/// Payload of a successful connect acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectAck {
    pub client_id: ClientId,
}

/// Envelope for every frame the relay sends on its own behalf:
/// `{"code": .., "msg": .., "data": ..}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientReply<T> {
    pub code: i32,
    pub msg: String,
    pub data: T,
}

impl ClientReply<ConnectAck> {
    pub fn connected(client_id: ClientId) -> Self {
        Self {
            code: CODE_SUCCESS,
            msg: "success".to_string(),
            data: ConnectAck { client_id },
        }
    }
}

impl ClientReply<Vec<String>> {
    pub fn error(code: i32, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            data: Vec::new(),
        }
    }
}

impl<T: Serialize> ClientReply<T> {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
