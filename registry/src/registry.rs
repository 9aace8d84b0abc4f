//! # Identity Registry Contract
//!
//! The verified-identity set for the PearID network. Each successfully
//! bridged verification mints exactly one credential token, keyed by the
//! idempotency key derived from the holder's identity fingerprint. Token ids
//! are sequential and never reused.
//!
//! ## Security Model
//!
//! - **One credential per identity**: the registry maps idempotency key to
//!   token. A second mint for the same key reverts with a message containing
//!   `already verified`, which the bridge treats as success.
//! - **Operator pause**: while paused, every mint reverts. Existing tokens
//!   remain readable, so verification lookups keep working during an
//!   incident.
//! - **No token transfer**: credentials attest to a verification event and
//!   are bound to the identity that produced them. There is nothing to move.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pearid_bridge::store::ContentId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors a mint call can revert with.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The identity key already holds a credential token.
    #[error("identity already verified (token {0})")]
    AlreadyVerified(u64),

    /// The registry is paused by the operator.
    #[error("registry is paused")]
    Paused,

    /// The sequential token id space is exhausted.
    #[error("token id space exhausted")]
    IdSpaceExhausted,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A minted credential token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialToken {
    /// Sequential id, starting at 1.
    pub token_id: u64,
    /// The idempotency key the token is bound to.
    pub identity_key: [u8; 32],
    /// Content address of the credential metadata blob.
    pub metadata: ContentId,
    /// When the mint executed.
    pub minted_at: DateTime<Utc>,
}

/// The registry contract state.
///
/// Plain in-memory state with synchronous methods. Callers that need shared
/// access wrap it in a lock; `DevnetChain` does exactly that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryContract {
    /// Verified-identity set, keyed by idempotency key.
    tokens: HashMap<[u8; 32], CredentialToken>,
    /// Next token id to assign.
    next_token_id: u64,
    /// While true, all mints revert.
    paused: bool,
}

impl RegistryContract {
    /// Creates an empty registry. The first token minted gets id 1.
    pub fn new() -> Self {
        Self {
            tokens: HashMap::new(),
            next_token_id: 1,
            paused: false,
        }
    }

    /// Mints a credential token for `identity_key`.
    ///
    /// Reverts if the registry is paused or the key already holds a token.
    pub fn mint(
        &mut self,
        identity_key: [u8; 32],
        metadata: ContentId,
    ) -> Result<CredentialToken, RegistryError> {
        if self.paused {
            return Err(RegistryError::Paused);
        }
        if let Some(existing) = self.tokens.get(&identity_key) {
            return Err(RegistryError::AlreadyVerified(existing.token_id));
        }

        let token_id = self.next_token_id;
        self.next_token_id = token_id
            .checked_add(1)
            .ok_or(RegistryError::IdSpaceExhausted)?;

        let token = CredentialToken {
            token_id,
            identity_key,
            metadata,
            minted_at: Utc::now(),
        };
        self.tokens.insert(identity_key, token.clone());
        Ok(token)
    }

    /// Whether the identity key holds a credential token.
    pub fn is_verified(&self, identity_key: &[u8; 32]) -> bool {
        self.tokens.contains_key(identity_key)
    }

    /// Looks up the credential token for an identity key.
    pub fn token(&self, identity_key: &[u8; 32]) -> Option<&CredentialToken> {
        self.tokens.get(identity_key)
    }

    /// Number of credentials minted so far.
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Pauses minting. Idempotent.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resumes minting. Idempotent.
    pub fn unpause(&mut self) {
        self.paused = false;
    }

    /// Whether minting is currently paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl Default for RegistryContract {
    fn default() -> Self {
        Self::new()
    }
}
