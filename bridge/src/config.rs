//! # Protocol Constants
//!
//! Every magic number in the bridge lives here, named and documented, so
//! that "why is the retry cap five?" has exactly one place to be answered.
//! Domain separation tags are versioned; bumping one is a breaking change
//! to every fingerprint or idempotency key ever derived, so don't.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Addressing
// ---------------------------------------------------------------------------

/// Bech32 human-readable part for identity fingerprints.
pub const PEAR_HRP: &str = "pear";

/// Domain separation tag mixed into every fingerprint derivation.
pub const FINGERPRINT_DOMAIN: &[u8] = b"pearid.fingerprint.v1";

/// Domain separation tag for mint idempotency keys. Distinct from the
/// fingerprint tag so a fingerprint can never collide with its own key.
pub const MINT_CALL_DOMAIN: &[u8] = b"pearid.mint.v1";

/// Schema identifier stamped into credential metadata documents.
pub const METADATA_SCHEMA: &str = "pearid.credential.v1";

// ---------------------------------------------------------------------------
// Mint pipeline budgets
// ---------------------------------------------------------------------------

/// Submission attempts per mint request before it fails terminally.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Blob store round-trips allowed per fetch or put before giving up.
pub const DEFAULT_STORE_RETRY_BUDGET: u32 = 3;

/// Confirmations required before a mint counts as final.
pub const DEFAULT_CONFIRMATION_DEPTH: u32 = 3;

/// Worker partitions in the orchestrator pool.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Queue capacity per worker partition.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// First backoff window after a retryable failure.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 500;

/// Backoff ceiling. One minute of patience is plenty for a devnet.
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 60_000;

/// How often a worker polls the chain for transaction status.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How long a worker waits for confirmation before scheduling a retry.
pub const DEFAULT_CONFIRMATION_DEADLINE: Duration = Duration::from_secs(30);

/// Devnet block interval. Real chains are slower; tests are faster.
pub const DEVNET_BLOCK_TIME_MS: u64 = 1_000;

// ---------------------------------------------------------------------------
// Revert classification
// ---------------------------------------------------------------------------

/// Substring that marks a registry revert as "someone already minted for
/// this identity", which the bridge treats as success. Case-insensitive.
pub const ALREADY_VERIFIED_MARKER: &str = "already verified";

// ---------------------------------------------------------------------------
// Node defaults
// ---------------------------------------------------------------------------

/// Default REST/WebSocket API port.
pub const DEFAULT_API_PORT: u16 = 9871;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 9872;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_tags_are_distinct() {
        assert_ne!(FINGERPRINT_DOMAIN, MINT_CALL_DOMAIN);
    }

    #[test]
    fn budgets_are_nonzero() {
        assert!(DEFAULT_MAX_ATTEMPTS > 0);
        assert!(DEFAULT_STORE_RETRY_BUDGET > 0);
        assert!(DEFAULT_CONFIRMATION_DEPTH > 0);
        assert!(DEFAULT_WORKER_COUNT > 0);
        assert!(DEFAULT_QUEUE_DEPTH > 0);
    }

    #[test]
    fn backoff_base_below_cap() {
        assert!(DEFAULT_BACKOFF_BASE_MS < DEFAULT_BACKOFF_CAP_MS);
    }

    #[test]
    fn ports_do_not_collide() {
        assert_ne!(DEFAULT_API_PORT, DEFAULT_METRICS_PORT);
    }
}
