//! Ed25519 signing account for registry calls.
//!
//! One account signs every mint call a node broadcasts, and the persisted
//! nonce counter in the ledger is scoped to it. The secret never appears
//! in Debug output or logs.

use std::fmt;

use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use thiserror::Error;

use super::types::{CallData, MintCall};

/// Length of the raw seed in bytes.
pub const SEED_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("invalid secret key material: {0}")]
    InvalidSecretKey(String),

    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),

    #[error("call encoding failed: {0}")]
    Encode(String),
}

/// The bridge's on-chain identity.
pub struct ChainAccount {
    signing_key: SigningKey,
}

impl ChainAccount {
    /// Generates a fresh account from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_seed(seed: [u8; SEED_LEN]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Parses a hex-encoded 32-byte seed, as stored in the node's key file.
    pub fn from_hex(hex_seed: &str) -> Result<Self, AccountError> {
        let bytes = hex::decode(hex_seed.trim())
            .map_err(|e| AccountError::InvalidHex(e.to_string()))?;
        let seed: [u8; SEED_LEN] = bytes.as_slice().try_into().map_err(|_| {
            AccountError::InvalidSecretKey(format!(
                "expected {SEED_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::from_seed(seed))
    }

    /// Hex encoding of the seed, for the key file. Handle with care.
    pub fn to_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    /// Encodes and signs a mint call for broadcast.
    pub fn sign_call(&self, call: &MintCall) -> Result<CallData, AccountError> {
        let payload =
            bincode::serialize(call).map_err(|e| AccountError::Encode(e.to_string()))?;
        let signature = self.signing_key.sign(&payload);
        Ok(CallData {
            payload,
            signature: signature.to_bytes().to_vec(),
            public_key: self.public_key_bytes(),
        })
    }
}

impl Clone for ChainAccount {
    fn clone(&self) -> Self {
        Self::from_seed(self.signing_key.to_bytes())
    }
}

// Debug never prints the secret.
impl fmt::Debug for ChainAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainAccount(pub={})", self.public_key_hex())
    }
}
