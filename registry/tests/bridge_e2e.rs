//! The full bridge wired to the devnet registry.
//!
//! These are the closest tests to a production deployment: real ledger,
//! real blob store, real worker pool, and a chain whose confirmations come
//! from actual block production instead of a per-test script. Every path
//! the scripted tests cover in isolation has to hold here end to end.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use pearid_bridge::chain::{idempotency_key, ChainAccount};
use pearid_bridge::identity::IdentityFingerprint;
use pearid_bridge::mint::{BackoffPolicy, MintOrchestrator, OrchestratorConfig};
use pearid_bridge::storage::{Decision, MintState, VerificationLedger};
use pearid_bridge::store::{BlobStore, ContentId, MemoryBlobStore};
use pearid_registry::devnet::DevnetChain;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

struct DevnetBridge {
    orchestrator: Arc<MintOrchestrator>,
    ledger: Arc<VerificationLedger>,
    store: Arc<MemoryBlobStore>,
    chain: DevnetChain,
}

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        workers: 2,
        queue_depth: 16,
        max_attempts: 3,
        store_retry_budget: 2,
        confirmation_depth: 2,
        poll_interval: Duration::from_millis(10),
        confirmation_deadline: Duration::from_secs(2),
        backoff: BackoffPolicy::new(5, 20),
    }
}

fn setup() -> DevnetBridge {
    let ledger = Arc::new(VerificationLedger::open_temporary().expect("temp ledger"));
    let store = Arc::new(MemoryBlobStore::new());
    let chain = DevnetChain::new();
    let orchestrator = MintOrchestrator::start(
        Arc::clone(&ledger),
        store.clone(),
        Arc::new(chain.clone()),
        Arc::new(ChainAccount::generate()),
        fast_config(),
    );
    DevnetBridge {
        orchestrator,
        ledger,
        store,
        chain,
    }
}

fn fp(tag: u8) -> IdentityFingerprint {
    IdentityFingerprint::from_bytes([tag; 32])
}

async fn seed_evidence(bridge: &DevnetBridge, tag: u8) -> ContentId {
    bridge
        .store
        .put(vec![tag; 48])
        .await
        .expect("store evidence")
}

async fn wait_for_state(
    ledger: &VerificationLedger,
    fingerprint: &IdentityFingerprint,
    want: MintState,
) -> pearid_bridge::storage::MintRequest {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(request) = ledger.get_mint_state(fingerprint).expect("read request") {
            if request.state == want {
                return request;
            }
        }
        if tokio::time::Instant::now() > deadline {
            panic!("request for {fingerprint} never reached {want}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ---------------------------------------------------------------------------
// 1. Happy Path on Real Blocks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn approval_mints_a_registry_token() {
    let bridge = setup();
    let (stop_blocks, block_signal) = watch::channel(false);
    let ticker = bridge.chain.spawn_ticker(Duration::from_millis(20), block_signal);

    let fingerprint = fp(1);
    let evidence = seed_evidence(&bridge, 1).await;
    bridge
        .orchestrator
        .record_decision(fingerprint, Decision::Approved, evidence)
        .await
        .expect("record approval");

    let request = wait_for_state(&bridge.ledger, &fingerprint, MintState::Confirmed).await;
    assert!(request.tx_handle.is_some());
    assert_eq!(request.attempt_count, 1);

    // Exactly one token, bound to the derived key, pointing at the
    // metadata blob the worker pinned.
    let key = idempotency_key(&fingerprint);
    {
        let registry = bridge.chain.registry();
        assert!(registry.is_verified(&key));
        let token = registry.token(&key).expect("token minted");
        assert_eq!(token.token_id, 1);
        assert_eq!(Some(token.metadata), request.metadata_content_id);
    }

    stop_blocks.send(true).expect("stop blocks");
    ticker.await.expect("ticker joins");
    bridge.orchestrator.shutdown().await;
}

#[tokio::test]
async fn a_batch_of_approvals_all_mint() {
    let bridge = setup();
    let (stop_blocks, block_signal) = watch::channel(false);
    let ticker = bridge.chain.spawn_ticker(Duration::from_millis(10), block_signal);

    for tag in 1..=6u8 {
        let evidence = seed_evidence(&bridge, tag).await;
        bridge
            .orchestrator
            .record_decision(fp(tag), Decision::Approved, evidence)
            .await
            .expect("record approval");
    }
    for tag in 1..=6u8 {
        wait_for_state(&bridge.ledger, &fp(tag), MintState::Confirmed).await;
    }

    // Six identities, six tokens, ids 1 through 6 with no gaps.
    let registry = bridge.chain.registry();
    assert_eq!(registry.token_count(), 6);
    let mut ids: Vec<u64> = (1..=6u8)
        .map(|tag| registry.token(&idempotency_key(&fp(tag))).expect("token").token_id)
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
    drop(registry);

    stop_blocks.send(true).expect("stop blocks");
    ticker.await.expect("ticker joins");
    bridge.orchestrator.shutdown().await;
}

// ---------------------------------------------------------------------------
// 2. Manual Block Production
// ---------------------------------------------------------------------------

#[tokio::test]
async fn blocks_sealed_by_hand_confirm_the_mint() {
    let bridge = setup();

    let fingerprint = fp(2);
    let evidence = seed_evidence(&bridge, 2).await;
    bridge
        .orchestrator
        .record_decision(fingerprint, Decision::Approved, evidence)
        .await
        .expect("record approval");

    // The worker broadcasts, then polls a Pending handle.
    wait_for_state(&bridge.ledger, &fingerprint, MintState::Submitted).await;

    // Seal the inclusion block plus the required depth.
    bridge.chain.advance_blocks(3);
    wait_for_state(&bridge.ledger, &fingerprint, MintState::Confirmed).await;
    assert_eq!(bridge.chain.height(), 3);

    bridge.orchestrator.shutdown().await;
}

// ---------------------------------------------------------------------------
// 3. Duplicate Guard Across Operators
// ---------------------------------------------------------------------------

#[tokio::test]
async fn externally_minted_identity_counts_as_confirmed() {
    let bridge = setup();
    let (stop_blocks, block_signal) = watch::channel(false);
    let ticker = bridge.chain.spawn_ticker(Duration::from_millis(20), block_signal);

    // Another operator minted this identity first.
    let fingerprint = fp(3);
    let key = idempotency_key(&fingerprint);
    let external_metadata = ContentId::for_bytes(b"minted elsewhere");
    bridge
        .chain
        .registry()
        .mint(key, external_metadata)
        .expect("external mint");

    let evidence = seed_evidence(&bridge, 3).await;
    bridge
        .orchestrator
        .record_decision(fingerprint, Decision::Approved, evidence)
        .await
        .expect("record approval");

    // Our broadcast reverts with the duplicate guard, which the pipeline
    // treats as confirmation. No second token appears.
    let request = wait_for_state(&bridge.ledger, &fingerprint, MintState::Confirmed).await;
    assert_eq!(request.attempt_count, 1);
    assert_eq!(request.last_error, None);
    {
        let registry = bridge.chain.registry();
        assert_eq!(registry.token_count(), 1);
        assert_eq!(registry.token(&key).expect("token").metadata, external_metadata);
    }

    stop_blocks.send(true).expect("stop blocks");
    ticker.await.expect("ticker joins");
    bridge.orchestrator.shutdown().await;
}

// ---------------------------------------------------------------------------
// 4. Pause Incident and Operator Recovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pause_incident_fails_terminal_then_resubmit_mints() {
    let bridge = setup();
    let (stop_blocks, block_signal) = watch::channel(false);
    let ticker = bridge.chain.spawn_ticker(Duration::from_millis(20), block_signal);

    bridge.chain.registry().pause();

    let fingerprint = fp(4);
    let evidence = seed_evidence(&bridge, 4).await;
    bridge
        .orchestrator
        .record_decision(fingerprint, Decision::Approved, evidence)
        .await
        .expect("record approval");

    // The revert surfaces at poll time and is not the duplicate guard,
    // so the request goes terminal on the first attempt.
    let failed = wait_for_state(&bridge.ledger, &fingerprint, MintState::FailedTerminal).await;
    let reason = failed.last_error.expect("terminal reason");
    assert!(reason.contains("registry is paused"), "got: {reason}");
    let failures = bridge.ledger.terminal_failures().expect("failures");
    assert!(failures.iter().any(|r| r.fingerprint == fingerprint));

    // Operator clears the incident and resubmits.
    bridge.chain.registry().unpause();
    bridge
        .orchestrator
        .resubmit(fingerprint)
        .await
        .expect("resubmit");

    wait_for_state(&bridge.ledger, &fingerprint, MintState::Confirmed).await;
    {
        let registry = bridge.chain.registry();
        assert_eq!(registry.token_count(), 1);
        assert_eq!(
            registry.token(&idempotency_key(&fingerprint)).expect("token").token_id,
            1
        );
    }
    // Two broadcasts reached the chain: the paused one and the retry.
    assert_eq!(bridge.chain.transaction_count(), 2);

    stop_blocks.send(true).expect("stop blocks");
    ticker.await.expect("ticker joins");
    bridge.orchestrator.shutdown().await;
}
