//! # Bridge Database
//!
//! sled wrapper that owns the tree layout and the on-disk codec. Policy
//! lives one floor up in [`ledger`](super::ledger); this file only knows
//! how bytes get in and out.
//!
//! ## Tree Layout
//!
//! | Tree           | Key                          | Value                   |
//! |----------------|------------------------------|-------------------------|
//! | `approvals`    | fingerprint (32 bytes)       | `VerificationRecord`    |
//! | `rejections`   | fingerprint ++ seq (u64 BE)  | `VerificationRecord`    |
//! | `mints`        | fingerprint (32 bytes)       | active `MintRequest`    |
//! | `mint_archive` | fingerprint ++ seq (u64 BE)  | terminal `MintRequest`  |
//! | `meta`         | string key                   | u64 BE counter          |
//!
//! Sequence suffixes come from sled's monotonic id allocator, so entries
//! under one fingerprint prefix iterate in insertion order.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use thiserror::Error;

use crate::identity::{IdentityFingerprint, FINGERPRINT_LEN};

/// Meta key for the persisted account nonce counter.
pub const META_NONCE_COUNTER: &[u8] = b"nonce_counter";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt key in tree '{tree}': {reason}")]
    CorruptKey { tree: &'static str, reason: String },
}

pub type DbResult<T> = Result<T, DbError>;

/// Open handle on the bridge's sled database and its named trees.
pub struct BridgeDb {
    db: Db,
    pub(crate) approvals: Tree,
    pub(crate) rejections: Tree,
    pub(crate) mints: Tree,
    pub(crate) mint_archive: Tree,
    pub(crate) meta: Tree,
}

impl BridgeDb {
    /// Opens (or creates) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Opens an in-memory database for tests; vanishes on drop.
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    /// Wraps an already-open sled handle.
    pub fn from_db(db: Db) -> DbResult<Self> {
        let approvals = db.open_tree("approvals")?;
        let rejections = db.open_tree("rejections")?;
        let mints = db.open_tree("mints")?;
        let mint_archive = db.open_tree("mint_archive")?;
        let meta = db.open_tree("meta")?;
        Ok(Self {
            db,
            approvals,
            rejections,
            mints,
            mint_archive,
            meta,
        })
    }

    /// Flushes all trees to disk. Called after every write that must
    /// survive a crash, which in this ledger is all of them.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Monotonic sequence source for suffixed keys.
    pub(crate) fn next_seq(&self) -> DbResult<u64> {
        Ok(self.db.generate_id()?)
    }

    pub(crate) fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
        bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
    }

    pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
        bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
    }

    /// Builds a `fingerprint ++ seq` key for the append-only trees.
    pub(crate) fn suffixed_key(fingerprint: &IdentityFingerprint, seq: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(FINGERPRINT_LEN + 8);
        key.extend_from_slice(fingerprint.as_bytes());
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    /// Recovers the fingerprint from a bare or suffixed tree key.
    pub(crate) fn fingerprint_from_key(
        tree: &'static str,
        key: &[u8],
    ) -> DbResult<IdentityFingerprint> {
        if key.len() < FINGERPRINT_LEN {
            return Err(DbError::CorruptKey {
                tree,
                reason: format!("key is {} bytes, need at least {FINGERPRINT_LEN}", key.len()),
            });
        }
        IdentityFingerprint::from_slice(&key[..FINGERPRINT_LEN]).map_err(|e| {
            DbError::CorruptKey {
                tree,
                reason: e.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::record::{Decision, VerificationRecord};
    use crate::store::ContentId;

    fn fp(tag: u8) -> IdentityFingerprint {
        IdentityFingerprint::from_bytes([tag; 32])
    }

    #[test]
    fn temporary_db_opens_with_empty_trees() {
        let db = BridgeDb::open_temporary().expect("open");
        assert_eq!(db.approvals.len(), 0);
        assert_eq!(db.rejections.len(), 0);
        assert_eq!(db.mints.len(), 0);
        assert_eq!(db.mint_archive.len(), 0);
    }

    #[test]
    fn encode_decode_round_trip() {
        let record = VerificationRecord::new(
            fp(1),
            Decision::Approved,
            ContentId::for_bytes(b"evidence"),
        );
        let bytes = BridgeDb::encode(&record).expect("encode");
        let back: VerificationRecord = BridgeDb::decode(&bytes).expect("decode");
        assert_eq!(record, back);
    }

    #[test]
    fn encode_is_deterministic() {
        // CAS compares encoded bytes, so decode-then-encode must be stable.
        let record = VerificationRecord::new(
            fp(2),
            Decision::Rejected,
            ContentId::for_bytes(b"evidence"),
        );
        let first = BridgeDb::encode(&record).expect("encode");
        let decoded: VerificationRecord = BridgeDb::decode(&first).expect("decode");
        let second = BridgeDb::encode(&decoded).expect("encode");
        assert_eq!(first, second);
    }

    #[test]
    fn suffixed_keys_sort_by_sequence_within_prefix() {
        let a = BridgeDb::suffixed_key(&fp(1), 5);
        let b = BridgeDb::suffixed_key(&fp(1), 6);
        let c = BridgeDb::suffixed_key(&fp(2), 0);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(a.len(), 40);
    }

    #[test]
    fn fingerprint_recoverable_from_keys() {
        let key = BridgeDb::suffixed_key(&fp(7), 99);
        let recovered = BridgeDb::fingerprint_from_key("rejections", &key).expect("recover");
        assert_eq!(recovered, fp(7));

        let short = [1u8, 2, 3];
        assert!(matches!(
            BridgeDb::fingerprint_from_key("rejections", &short),
            Err(DbError::CorruptKey { tree: "rejections", .. })
        ));
    }

    #[test]
    fn sequences_are_monotonic() {
        let db = BridgeDb::open_temporary().expect("open");
        let first = db.next_seq().expect("seq");
        let second = db.next_seq().expect("seq");
        assert!(second > first);
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bridge-db");

        {
            let db = BridgeDb::open(&path).expect("open");
            db.approvals.insert(fp(1).as_bytes(), b"value".as_slice()).expect("insert");
            db.flush().expect("flush");
        }

        let db = BridgeDb::open(&path).expect("reopen");
        let value = db.approvals.get(fp(1).as_bytes()).expect("get").expect("present");
        assert_eq!(value.as_ref(), b"value");
    }
}
