//! # Identity Module
//!
//! Fingerprint derivation for the PearID bridge. A verification provider
//! hands us a set of document attributes; what crosses the bridge is never
//! those attributes but a 32-byte BLAKE3 digest of their canonical form,
//! rendered for humans as a Bech32 address with the `pear` HRP.
//!
//! The pipeline is deliberately short:
//!
//! 1. **Attributes** - Raw fields off a document (name, date of birth,
//!    document number, ...). Normalized so that trivial formatting noise
//!    cannot mint the same human twice.
//! 2. **Fingerprint** - BLAKE3 over a domain-tagged, length-prefixed
//!    encoding of the normalized fields. Deterministic, collision-resistant,
//!    and irreversible in practice.
//!
//! ## Design Decisions
//!
//! - BLAKE3 for the digest. Fast everywhere, 32-byte output, keyed-hash
//!   relatives available if we ever need them.
//! - Bech32 (not Bech32m) for rendering - we encode a raw digest, not a
//!   witness program, and Bech32's checksum catches the fat-finger class
//!   of errors we actually see.
//! - Length-prefixed field encoding. Concatenation without framing lets
//!   `("ab", "c")` collide with `("a", "bc")`; a u32 length prefix per
//!   field closes that door.

pub mod attributes;
pub mod fingerprint;

pub use attributes::{normalize, DocumentKind, IdentityAttributes};
pub use fingerprint::{FingerprintError, IdentityFingerprint, FINGERPRINT_LEN};
