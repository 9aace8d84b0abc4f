//! # Storage Module
//!
//! The durable heart of the bridge: every verification decision and every
//! mint request lives here, on sled, and survives a restart. In-memory
//! queues are rebuildable hints; this module is the truth.
//!
//! ## Architecture
//!
//! ```text
//! record.rs - VerificationRecord and the approve/reject decision
//! mint.rs   - MintRequest lifecycle state machine
//! db.rs     - sled wrapper: named trees, bincode codecs, key layout
//! ledger.rs - VerificationLedger: the policy layer (uniqueness, CAS
//!             transitions, archive, recovery scans, nonce counter)
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! Decision -> VerificationRecord -> approvals / rejections
//!                                        |
//!                               MintRequest (active slot, CAS-guarded)
//!                                        |
//!                                  mint_archive (terminal history)
//! ```
//!
//! ## Design Decisions
//!
//! 1. **One approval per fingerprint, enforced by compare-and-swap.** Not
//!    checked-then-inserted; swapped. Concurrent duplicates lose the race
//!    atomically.
//! 2. **Versioned mint requests.** Every persisted mutation bumps a version
//!    counter and goes through CAS against the exact bytes previously read.
//!    Two writers cannot silently overwrite each other.
//! 3. **Bincode for on-disk values.** Compact, deterministic, and the
//!    determinism is load-bearing: CAS compares encoded bytes.

pub mod db;
pub mod ledger;
pub mod mint;
pub mod record;

pub use db::{BridgeDb, DbError, DbResult};
pub use ledger::{LedgerError, LedgerResult, LedgerStats, StageOutcome, VerificationLedger};
pub use mint::{AttemptRecord, MintRequest, MintState};
pub use record::{Decision, VerificationRecord};
