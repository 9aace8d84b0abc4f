//! # Chain Module
//!
//! The registry-chain capability: everything the mint pipeline needs from
//! a blockchain, and nothing it doesn't. Workers sign a mint call, hand it
//! to a [`ChainClient`] with a nonce, and poll the returned handle until
//! the transaction is buried deep enough to trust.
//!
//! ## Architecture
//!
//! ```text
//! types.rs    - MintCall, CallData, TxHandle, TxStatus, ChainError
//! account.rs  - Ed25519 signing account for registry calls
//! client.rs   - the ChainClient trait
//! scripted.rs - deterministic test double with queued outcomes
//! ```
//!
//! ## Design Decisions
//!
//! 1. **Errors carry intent.** `Transient` means retry, `Reverted` means
//!    the chain executed and said no, `InvalidCall` means the caller built
//!    garbage. The pipeline's whole retry policy hangs off this split.
//! 2. **Idempotency keys are derived, not stored.** A key is a domain-tagged
//!    BLAKE3 of the fingerprint, so every resubmission for the same identity
//!    hits the same registry slot no matter which process built it.
//! 3. **Signatures verify at the boundary.** Both chain implementations
//!    check the Ed25519 signature before executing anything.

pub mod account;
pub mod client;
pub mod scripted;
pub mod types;

pub use account::{AccountError, ChainAccount};
pub use client::ChainClient;
pub use scripted::{ScriptedChain, SubmitScript, SubmittedCall};
pub use types::{idempotency_key, CallData, ChainError, MintCall, TxHandle, TxStatus};
