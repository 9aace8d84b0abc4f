//! Integration tests for the identity registry contract.
//!
//! These walk realistic operator scenarios across several mints: a steady
//! stream of verifications, an incident pause in the middle of it, and the
//! duplicate-identity guard holding through the whole run.

use pearid_bridge::store::ContentId;
use pearid_registry::registry::{RegistryContract, RegistryError};

/// Helper: a deterministic identity key.
fn key(tag: u8) -> [u8; 32] {
    [tag; 32]
}

/// Helper: metadata content id derived from the tag.
fn metadata(tag: u8) -> ContentId {
    ContentId::for_bytes(&[tag; 24])
}

// ---------------------------------------------------------------------------
// Lifecycle Tests
// ---------------------------------------------------------------------------

#[test]
fn mint_stream_assigns_dense_sequential_ids() {
    let mut registry = RegistryContract::new();

    for tag in 1..=10u8 {
        let token = registry.mint(key(tag), metadata(tag)).unwrap();
        assert_eq!(token.token_id, u64::from(tag));
    }
    assert_eq!(registry.token_count(), 10);

    // Every identity resolves back to its own token and metadata.
    for tag in 1..=10u8 {
        let token = registry.token(&key(tag)).unwrap();
        assert_eq!(token.identity_key, key(tag));
        assert_eq!(token.metadata, metadata(tag));
    }
}

#[test]
fn incident_pause_keeps_ids_dense() {
    let mut registry = RegistryContract::new();
    registry.mint(key(1), metadata(1)).unwrap();
    registry.mint(key(2), metadata(2)).unwrap();

    // 1. Incident: operator pauses, pending mints bounce off.
    registry.pause();
    for tag in 3..=5u8 {
        assert_eq!(
            registry.mint(key(tag), metadata(tag)).unwrap_err(),
            RegistryError::Paused
        );
    }

    // 2. Recovery: the failed attempts consumed no ids.
    registry.unpause();
    let token = registry.mint(key(3), metadata(3)).unwrap();
    assert_eq!(token.token_id, 3);
    assert_eq!(registry.token_count(), 3);
}

#[test]
fn minted_token_records_the_mint_time() {
    let before = chrono::Utc::now();
    let mut registry = RegistryContract::new();
    let token = registry.mint(key(1), metadata(1)).unwrap();
    assert!(token.minted_at >= before);
    assert!(token.minted_at <= chrono::Utc::now());
}

// ---------------------------------------------------------------------------
// Guard Ordering
// ---------------------------------------------------------------------------

#[test]
fn pause_gate_checks_before_the_duplicate_guard() {
    let mut registry = RegistryContract::new();
    registry.mint(key(1), metadata(1)).unwrap();
    registry.pause();

    // While paused, even a duplicate reverts with the pause message. The
    // bridge classifies this as terminal rather than already-verified,
    // which is what an operator running an incident wants.
    assert_eq!(
        registry.mint(key(1), metadata(1)).unwrap_err(),
        RegistryError::Paused
    );

    registry.unpause();
    assert_eq!(
        registry.mint(key(1), metadata(1)).unwrap_err(),
        RegistryError::AlreadyVerified(1)
    );
}

#[test]
fn duplicate_guard_never_rewrites_metadata() {
    let mut registry = RegistryContract::new();
    registry.mint(key(1), metadata(1)).unwrap();

    for attempt in 2..=4u8 {
        registry.mint(key(1), metadata(attempt)).unwrap_err();
    }
    assert_eq!(registry.token(&key(1)).unwrap().metadata, metadata(1));
    assert_eq!(registry.token_count(), 1);
}
