//! Wire types shared by every chain implementation.

use std::fmt;

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::MINT_CALL_DOMAIN;
use crate::identity::IdentityFingerprint;
use crate::store::ContentId;

/// Handle the chain issues for a broadcast transaction.
///
/// Opaque to the bridge; we store it, poll with it, and show it to
/// operators. Conventionally a 0x-prefixed hex string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHandle(String);

impl TxHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the chain currently knows about a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxStatus {
    /// Broadcast but not yet included in a block.
    Pending,
    /// Included, with `depth` blocks built on top of the inclusion block.
    Confirmed { depth: u32 },
    /// Executed and rejected by the registry.
    Reverted { reason: String },
    /// The chain has no record of this handle.
    Unknown,
}

/// The registry call a worker submits: mint one credential token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintCall {
    pub fingerprint: IdentityFingerprint,
    pub metadata: ContentId,
    pub idempotency_key: [u8; 32],
}

impl MintCall {
    pub fn new(fingerprint: IdentityFingerprint, metadata: ContentId) -> Self {
        Self {
            fingerprint,
            metadata,
            idempotency_key: idempotency_key(&fingerprint),
        }
    }
}

/// Derives the idempotency key the registry dedupes on.
///
/// Depends only on the fingerprint, so any resubmission for the same
/// identity, from any process, at any time, lands on the same key.
pub fn idempotency_key(fingerprint: &IdentityFingerprint) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(MINT_CALL_DOMAIN);
    hasher.update(fingerprint.as_bytes());
    *hasher.finalize().as_bytes()
}

/// A signed, encoded call ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallData {
    /// bincode-encoded [`MintCall`].
    pub payload: Vec<u8>,
    /// Ed25519 signature over `payload`.
    pub signature: Vec<u8>,
    /// Public key of the signing account.
    pub public_key: [u8; 32],
}

impl CallData {
    /// Verifies the signature and decodes the payload.
    ///
    /// Every chain implementation calls this before executing anything;
    /// failures map to [`ChainError::InvalidCall`].
    pub fn decode_verified(&self) -> Result<MintCall, ChainError> {
        let key = VerifyingKey::from_bytes(&self.public_key).map_err(|e| {
            ChainError::InvalidCall {
                reason: format!("bad public key: {e}"),
            }
        })?;
        let sig_bytes: [u8; 64] =
            self.signature
                .as_slice()
                .try_into()
                .map_err(|_| ChainError::InvalidCall {
                    reason: format!("signature must be 64 bytes, got {}", self.signature.len()),
                })?;
        let signature = Signature::from_bytes(&sig_bytes);
        key.verify(&self.payload, &signature)
            .map_err(|_| ChainError::InvalidCall {
                reason: "signature verification failed".into(),
            })?;
        bincode::deserialize(&self.payload).map_err(|e| ChainError::InvalidCall {
            reason: format!("payload decode failed: {e}"),
        })
    }
}

/// Errors a chain client can report.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Transport or mempool trouble. Worth retrying.
    #[error("transient chain error: {reason}")]
    Transient { reason: String },

    /// The chain executed the call and the registry rejected it.
    #[error("call reverted: {reason}")]
    Reverted { reason: String },

    /// Malformed call or bad signature. Never retryable.
    #[error("invalid call: {reason}")]
    InvalidCall { reason: String },
}

impl ChainError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Transient { .. })
    }
}
