//! Sealing and unsealing of client identifiers.
//!
//! Plaintext is `host:port:nonce` with a hyphen-free UUIDv4 nonce. It is
//! sealed with AES-256-GCM under a key derived from the shared secret and
//! rendered as unpadded URL-safe base64 of `nonce(12) || ciphertext+tag`.

use super::{ClientId, NodeAddr};
use crate::error::RelayError;
use aes_gcm::{
    aead::{Aead, AeadCore, OsRng},
    Aes256Gcm, KeyInit,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Result of resolving a client identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locality {
    /// The node that owns the connection
    pub owner: NodeAddr,
    /// Whether `owner` is the node doing the resolving
    pub is_local: bool,
}

/// Issues and resolves locality tokens for one node.
pub struct TokenCodec {
    cipher: Aes256Gcm,
    local: NodeAddr,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("local", &self.local)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Creates a codec for the node advertising `local`, keyed by the
    /// SHA-256 digest of `shared_key`.
    pub fn new(shared_key: &str, local: NodeAddr) -> Self {
        let key = Sha256::digest(shared_key.as_bytes());
        Self {
            cipher: Aes256Gcm::new(&key),
            local,
        }
    }

    /// The address this codec treats as local.
    pub fn local_addr(&self) -> &NodeAddr {
        &self.local
    }

    /// Issues a fresh identifier owned by this node.
    pub fn issue_local(&self) -> Result<ClientId, RelayError> {
        self.issue(self.local.host(), self.local.port())
    }

    /// Issues a fresh identifier owned by `host:port`.
    pub fn issue(&self, host: &str, port: u16) -> Result<ClientId, RelayError> {
        let plaintext = format!("{}:{}:{}", host, port, Uuid::new_v4().simple());
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| RelayError::Internal(format!("token sealing failed: {e}")))?;

        let mut raw = Vec::with_capacity(NONCE_LEN + sealed.len());
        raw.extend_from_slice(&nonce);
        raw.extend_from_slice(&sealed);
        Ok(ClientId::from(URL_SAFE_NO_PAD.encode(raw)))
    }

    /// Unseals `id` and reports its owner and whether that owner is this node.
    pub fn resolve(&self, id: &ClientId) -> Result<Locality, RelayError> {
        let malformed = |reason: &str| RelayError::MalformedIdentifier(reason.to_string());

        let raw = URL_SAFE_NO_PAD
            .decode(id.as_str())
            .map_err(|_| malformed("not base64url"))?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(malformed("too short"));
        }

        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let nonce = aes_gcm::aead::generic_array::GenericArray::from_slice(nonce);
        let plaintext = self
            .cipher
            .decrypt(nonce, sealed)
            .map_err(|_| malformed("authentication failed"))?;
        let plaintext = String::from_utf8(plaintext).map_err(|_| malformed("not utf-8"))?;

        let mut fields = plaintext.split(':');
        let (host, port) = match (fields.next(), fields.next()) {
            (Some(host), Some(port)) if !host.is_empty() => (host, port),
            _ => return Err(malformed("missing host:port")),
        };
        let port = port.parse::<u16>().map_err(|_| malformed("bad port"))?;

        let owner = NodeAddr::new(host, port);
        let is_local = owner == self.local;
        Ok(Locality { owner, is_local })
    }
}
