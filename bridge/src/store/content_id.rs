//! Content identifiers: BLAKE3 digests of stored payloads.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::blob::StoreError;

/// Digest length in bytes.
pub const CONTENT_ID_LEN: usize = 32;

/// Address of one immutable blob in the store.
///
/// Derived from the payload itself, so storing the same bytes twice yields
/// the same id and a fetched payload can always be checked against its
/// address. Human-readable formats render it as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentId {
    digest: [u8; CONTENT_ID_LEN],
}

impl ContentId {
    /// Computes the id a payload will be stored under.
    pub fn for_bytes(payload: &[u8]) -> Self {
        Self {
            digest: *blake3::hash(payload).as_bytes(),
        }
    }

    pub fn from_bytes(digest: [u8; CONTENT_ID_LEN]) -> Self {
        Self { digest }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, StoreError> {
        let digest: [u8; CONTENT_ID_LEN] = bytes.try_into().map_err(|_| {
            StoreError::MalformedId(format!(
                "expected {CONTENT_ID_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { digest })
    }

    pub fn as_bytes(&self) -> &[u8; CONTENT_ID_LEN] {
        &self.digest
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.digest)
    }

    pub fn from_hex(s: &str) -> Result<Self, StoreError> {
        let bytes =
            hex::decode(s.trim()).map_err(|e| StoreError::MalformedId(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// True when `payload` hashes back to this id.
    pub fn matches(&self, payload: &[u8]) -> bool {
        *self == Self::for_bytes(payload)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.to_hex())
    }
}

impl Serialize for ContentId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_bytes(&self.digest)
        }
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ContentIdVisitor;

        impl<'de> Visitor<'de> for ContentIdVisitor {
            type Value = ContentId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a hex content id string or {CONTENT_ID_LEN} raw bytes")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                ContentId::from_hex(v).map_err(E::custom)
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                ContentId::from_slice(v).map_err(E::custom)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut digest = [0u8; CONTENT_ID_LEN];
                for (i, slot) in digest.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(ContentId::from_bytes(digest))
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_str(ContentIdVisitor)
        } else {
            deserializer.deserialize_bytes(ContentIdVisitor)
        }
    }
}
