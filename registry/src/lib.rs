//! # PearID Registry
//!
//! On-chain logic for the PearID credential registry, modeled in-process so
//! the bridge can be exercised end to end without a live network:
//!
//! - **Registry Contract** - the verified-identity set, keyed by idempotency
//!   key, minting one sequential credential token per identity with
//!   pause/unpause controls.
//! - **Devnet Chain** - a block-producing wrapper that exposes the contract
//!   through the bridge's `ChainClient` capability, with nonce replay
//!   protection and depth-based confirmation.
//!
//! ## Design Principles
//!
//! 1. The contract is a plain state machine: synchronous methods over owned
//!    state, no async, no I/O. The devnet layer owns all concurrency.
//! 2. Token ids use `checked_add`, because an id counter that silently wraps
//!    would hand two identities the same credential.
//! 3. Call data is verified before execution: a transaction whose signature
//!    does not check out never reaches the contract.
//! 4. Reverts are reported through transaction status, exactly as a real
//!    chain surfaces them, so the bridge's classification paths see the
//!    same strings in tests as they would in production.

pub mod devnet;
pub mod registry;
