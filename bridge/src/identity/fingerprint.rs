//! # Identity Fingerprint
//!
//! The 32-byte BLAKE3 digest that stands in for a verified human everywhere
//! in the bridge: ledger keys, mint calls, API paths, log lines. Rendered
//! for humans as a Bech32 string with the `pear` HRP, e.g.
//! `pear1w4mz0...`. The raw attributes are unrecoverable from it, which is
//! the entire point.
//!
//! Serialization is format-aware: human-readable formats (JSON) get the
//! Bech32 address, binary formats (bincode, the ledger's on-disk encoding)
//! get the raw 32 bytes.

use std::fmt;

use bech32::{Bech32, Hrp};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::attributes::IdentityAttributes;
use crate::config::PEAR_HRP;

/// Fingerprint digest length in bytes.
pub const FINGERPRINT_LEN: usize = 32;

/// Errors that can occur parsing a fingerprint from its rendered forms.
#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("bech32 decode failed: {0}")]
    Bech32Decode(String),

    #[error("wrong HRP: expected '{expected}', got '{got}'")]
    InvalidHrp { expected: String, got: String },

    #[error("invalid payload length: expected {expected} bytes, got {got}")]
    InvalidDataLength { expected: usize, got: usize },

    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),
}

/// Privacy-preserving identifier for one verified identity.
///
/// Equality, ordering into ledger keys, and worker partitioning all operate
/// on the digest bytes alone.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityFingerprint {
    digest: [u8; FINGERPRINT_LEN],
}

impl IdentityFingerprint {
    /// Derives the fingerprint for a set of attributes.
    ///
    /// Deterministic: the same person, however their provider formats the
    /// fields, always lands on the same fingerprint.
    pub fn derive(attributes: &IdentityAttributes) -> Self {
        let digest = *blake3::hash(&attributes.canonical_bytes()).as_bytes();
        Self { digest }
    }

    pub fn from_bytes(digest: [u8; FINGERPRINT_LEN]) -> Self {
        Self { digest }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, FingerprintError> {
        let digest: [u8; FINGERPRINT_LEN] =
            bytes
                .try_into()
                .map_err(|_| FingerprintError::InvalidDataLength {
                    expected: FINGERPRINT_LEN,
                    got: bytes.len(),
                })?;
        Ok(Self { digest })
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.digest
    }

    /// Renders the Bech32 address form, e.g. `pear1...`.
    pub fn to_address(&self) -> String {
        let hrp = Hrp::parse(PEAR_HRP).expect("static HRP is valid");
        bech32::encode::<Bech32>(hrp, &self.digest)
            .expect("encoding a 32-byte payload never fails")
    }

    /// Parses the Bech32 address form, validating HRP and payload length.
    pub fn from_address(address: &str) -> Result<Self, FingerprintError> {
        let (hrp, data) = bech32::decode(address)
            .map_err(|e| FingerprintError::Bech32Decode(e.to_string()))?;

        if hrp.as_str() != PEAR_HRP {
            return Err(FingerprintError::InvalidHrp {
                expected: PEAR_HRP.to_string(),
                got: hrp.as_str().to_string(),
            });
        }

        Self::from_slice(&data)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.digest)
    }

    pub fn from_hex(s: &str) -> Result<Self, FingerprintError> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| FingerprintError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for IdentityFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_address())
    }
}

impl fmt::Debug for IdentityFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityFingerprint({})", self.to_address())
    }
}

impl Serialize for IdentityFingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_address())
        } else {
            serializer.serialize_bytes(&self.digest)
        }
    }
}

impl<'de> Deserialize<'de> for IdentityFingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FingerprintVisitor;

        impl<'de> Visitor<'de> for FingerprintVisitor {
            type Value = IdentityFingerprint;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a bech32 pear address string or {FINGERPRINT_LEN} raw bytes")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                IdentityFingerprint::from_address(v).map_err(E::custom)
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                IdentityFingerprint::from_slice(v).map_err(E::custom)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut digest = [0u8; FINGERPRINT_LEN];
                for (i, slot) in digest.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(IdentityFingerprint::from_bytes(digest))
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_str(FingerprintVisitor)
        } else {
            deserializer.deserialize_bytes(FingerprintVisitor)
        }
    }
}
