//! # Mint Pipeline
//!
//! Turns approved verifications into confirmed credential tokens:
//!
//! - [`orchestrator`] - staging, partition routing, recovery, operator
//!   paths, and the lifecycle event stream.
//! - [`worker`] - the per-partition pipeline that fetches evidence, builds
//!   metadata, signs, broadcasts, and polls.
//! - [`backoff`] - jittered exponential delays between attempts.
//! - [`nonce`] - serialized allocation over the ledger's persisted counter.
//!
//! ## Design Decisions
//!
//! 1. **State lives in the ledger, not in tasks.** A worker can die at any
//!    await point and the next run of the job re-reads everything it needs.
//! 2. **One writer per fingerprint.** Partition routing makes request
//!    mutation single-writer; the ledger's CAS turns any remaining race
//!    (operator actions) into an explicit conflict.
//! 3. **Idempotency lives in the call.** Every broadcast for a fingerprint
//!    carries the same derived key, so replays after a crash cannot mint
//!    twice no matter how the timing falls.

pub mod backoff;
pub mod nonce;
pub mod orchestrator;
pub mod worker;

pub use backoff::BackoffPolicy;
pub use nonce::NonceAllocator;
pub use orchestrator::{
    MintEvent, MintJob, MintLoopError, MintOrchestrator, OrchestratorConfig, RecoveryReport,
    EVENT_CHANNEL_CAPACITY,
};
pub use worker::{CredentialMetadata, MintWorker};
