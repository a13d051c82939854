//! Locality tokens: self-describing client identifiers.
//!
//! Every client identifier seals the address of the node that accepted the
//! connection. Any node holding the shared key can unseal it and decide
//! whether the client is local or where to forward, so no cluster-wide
//! "who owns which client" directory is needed.

pub mod address;
pub mod codec;

pub use address::NodeAddr;
pub use codec::{Locality, TokenCodec};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, externally visible handle for a client connection.
///
/// The string is a sealed `(host, port, nonce)` triple. It carries no
/// plaintext structure and must only be interpreted through
/// [`TokenCodec::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ClientId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for ClientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
