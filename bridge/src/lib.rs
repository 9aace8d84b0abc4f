// Copyright (c) 2026 PearID Labs. MIT License.
// See LICENSE for details.

//! # PearID Bridge - Core Library
//!
//! PearID sits between two worlds that refuse to talk to each other: an
//! identity verification pipeline that decides whether a human is real, and
//! an on-chain registry that hands out one credential token per verified
//! human. This crate is the bridge. It records verification decisions
//! durably, derives a privacy-preserving fingerprint for each identity, and
//! drives approved identities through an at-least-once mint pipeline that
//! the registry's idempotency turns into exactly-once.
//!
//! ## Architecture
//!
//! The library is split into modules that mirror the actual concerns of the
//! bridge:
//!
//! - **identity** - Attribute normalization and fingerprint derivation.
//!   Raw documents never leave this doorstep; only a BLAKE3 digest does.
//! - **store** - Content-addressed blob storage for evidence and credential
//!   metadata. Trait-based, so tests run against memory and production can
//!   point at a pinning service.
//! - **chain** - The registry-chain capability: signed mint calls, broadcast
//!   handles, status polling. Also trait-based, with a scripted double for
//!   deterministic tests.
//! - **storage** - The verification ledger on sled. Approvals are unique per
//!   fingerprint, mint requests live in a CAS-guarded active slot, and
//!   everything survives a restart.
//! - **mint** - The orchestrator: a fingerprint-partitioned worker pool that
//!   takes each approval from PENDING to CONFIRMED (or a terminal failure
//!   an operator can see and resubmit).
//! - **config** - Protocol constants and default budgets.
//!
//! ## Design Philosophy
//!
//! 1. The ledger is the source of truth; queues are just hints.
//! 2. Every state change is a compare-and-swap. Lost updates are a bug
//!    class we refuse to have.
//! 3. Retries are cheap because the registry dedupes on an idempotency key.
//! 4. If it can fail halfway, there is a recovery sweep that finishes it.

pub mod chain;
pub mod config;
pub mod identity;
pub mod mint;
pub mod storage;
pub mod store;
