//! Interactive CLI demo of the full PearID verification-to-mint lifecycle.
//!
//! Walks through identity fingerprinting, verification decisions, the mint
//! pipeline running against a block-producing devnet registry, duplicate
//! protection, and an operator incident drill. The output uses ANSI escape
//! codes for colored, storytelling-style terminal rendering.
//!
//! Run with:
//!   cargo run --example demo --release

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tokio::sync::{broadcast, watch};

use pearid_bridge::chain::{idempotency_key, ChainAccount, TxHandle};
use pearid_bridge::identity::{DocumentKind, IdentityAttributes, IdentityFingerprint};
use pearid_bridge::mint::{BackoffPolicy, MintEvent, MintOrchestrator, OrchestratorConfig};
use pearid_bridge::storage::{Decision, LedgerError, MintRequest, MintState, VerificationLedger};
use pearid_bridge::store::{BlobStore, MemoryBlobStore};
use pearid_registry::devnet::DevnetChain;

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const WHITE: &str = "\x1b[37m";

const BG_GREEN: &str = "\x1b[42m";

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn banner() {
    println!();
    println!(
        "{BG_GREEN}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!(
        "{BG_GREEN}{BOLD}{WHITE}    PEARID BRIDGE  --  Verification-to-Mint Lifecycle Demo          {RESET}"
    );
    println!(
        "{BG_GREEN}{BOLD}{WHITE}    Version 0.1.0  |  BLAKE3 + Ed25519 + Bech32                     {RESET}"
    );
    println!(
        "{BG_GREEN}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!();
}

fn section(num: u32, title: &str) {
    println!();
    println!(
        "{BOLD}{CYAN}===[{YELLOW} Step {num} {CYAN}]=============================================================={RESET}"
    );
    println!("{BOLD}{WHITE}  {title}{RESET}");
    println!(
        "{CYAN}------------------------------------------------------------------------{RESET}"
    );
}

fn subsection(text: &str) {
    println!("{DIM}{CYAN}  >> {text}{RESET}");
}

fn success(text: &str) {
    println!("{GREEN}  [OK] {text}{RESET}");
}

fn failure_note(text: &str) {
    println!("{RED}  [REFUSED] {text}{RESET}");
}

fn info(label: &str, value: &str) {
    println!("{WHITE}  {BOLD}{label}:{RESET} {YELLOW}{value}{RESET}");
}

fn timing(label: &str, elapsed: Duration) {
    let ms = elapsed.as_secs_f64() * 1000.0;
    println!("{DIM}{MAGENTA}  [{label}: {ms:.2} ms]{RESET}");
}

fn address_display(name: &str, addr: &str, color: &str) {
    let prefix = &addr[..6];
    let suffix = &addr[addr.len().saturating_sub(8)..];
    println!(
        "  {color}{BOLD}{name}{RESET}  {DIM}{prefix}...{suffix}{RESET}  {DIM}({} chars){RESET}",
        addr.len()
    );
}

fn short_handle(handle: &TxHandle) -> String {
    let s = handle.as_str();
    if s.len() > 14 {
        format!("{}...", &s[..14])
    } else {
        s.to_string()
    }
}

fn event_line(event: &MintEvent) {
    match event {
        MintEvent::Staged { fingerprint } => {
            println!("  {DIM}staged         {}{RESET}", fingerprint.to_address());
        }
        MintEvent::Submitted { fingerprint, tx_handle, attempt } => {
            println!(
                "  {BLUE}submitted      {} {DIM}tx={} attempt={attempt}{RESET}",
                fingerprint.to_address(),
                short_handle(tx_handle)
            );
        }
        MintEvent::RetryScheduled { fingerprint, attempt, delay_ms, reason } => {
            println!(
                "  {YELLOW}retry #{attempt}      {} {DIM}in {delay_ms} ms: {reason}{RESET}",
                fingerprint.to_address()
            );
        }
        MintEvent::Confirmed { fingerprint, depth, .. } => {
            println!(
                "  {GREEN}confirmed      {} {DIM}depth={depth}{RESET}",
                fingerprint.to_address()
            );
        }
        MintEvent::Failed { fingerprint, reason } => {
            println!(
                "  {RED}failed         {} {DIM}{reason}{RESET}",
                fingerprint.to_address()
            );
        }
        MintEvent::Cancelled { fingerprint } => {
            println!("  {RED}cancelled      {}{RESET}", fingerprint.to_address());
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn wait_for_state(
    ledger: &VerificationLedger,
    fingerprint: &IdentityFingerprint,
    want: MintState,
) -> MintRequest {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    loop {
        if let Some(request) = ledger.get_mint_state(fingerprint).expect("read request") {
            if request.state == want {
                return request;
            }
        }
        if tokio::time::Instant::now() > deadline {
            panic!("request for {fingerprint} never reached {want}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    let demo_start = Instant::now();

    banner();

    // -----------------------------------------------------------------------
    // Step 1: Identity Intake and Fingerprinting
    // -----------------------------------------------------------------------

    section(1, "Identity Intake and Fingerprinting");
    subsection("Normalizing provider attributes and deriving BLAKE3 fingerprints...");

    let t = Instant::now();
    let maya = IdentityAttributes::new(
        "Maya Andersson",
        NaiveDate::from_ymd_opt(1990, 4, 17).unwrap(),
        DocumentKind::Passport,
        "P-7781234",
        "SE",
    );
    let lucas = IdentityAttributes::new(
        "Lucas Ferreira",
        NaiveDate::from_ymd_opt(1985, 11, 2).unwrap(),
        DocumentKind::NationalId,
        "118.334.902-55",
        "BR",
    );
    let maya_fp = IdentityFingerprint::derive(&maya);
    let lucas_fp = IdentityFingerprint::derive(&lucas);
    timing("derive x2", t.elapsed());

    let maya_addr = maya_fp.to_address();
    let lucas_addr = lucas_fp.to_address();
    println!();
    address_display("Maya ", &maya_addr, BLUE);
    address_display("Lucas", &lucas_addr, MAGENTA);
    println!();

    // A second provider reports Maya with different formatting. Same
    // identity, same fingerprint.
    let maya_reformatted = IdentityAttributes::new(
        "  MAYA   ANDERSSON ",
        NaiveDate::from_ymd_opt(1990, 4, 17).unwrap(),
        DocumentKind::Passport,
        "p-7781234",
        "se",
    );
    assert_eq!(maya_fp, IdentityFingerprint::derive(&maya_reformatted));
    success("Reformatted attributes map to the same fingerprint");

    let recovered = IdentityFingerprint::from_address(&maya_addr).unwrap();
    assert_eq!(maya_fp, recovered);
    success("Addresses start with 'pear1' and pass Bech32 round-trip verification");

    // -----------------------------------------------------------------------
    // Step 2: Bridge Bootstrap
    // -----------------------------------------------------------------------

    section(2, "Bridge Bootstrap");
    subsection("Starting ledger, blob store, devnet registry, and the worker pool...");

    let t = Instant::now();
    let ledger = Arc::new(VerificationLedger::open_temporary().expect("temporary ledger"));
    let store = Arc::new(MemoryBlobStore::new());
    let chain = DevnetChain::new();
    let account = Arc::new(ChainAccount::generate());

    let (stop_blocks, block_signal) = watch::channel(false);
    let ticker = chain.spawn_ticker(Duration::from_millis(200), block_signal);

    let config = OrchestratorConfig {
        workers: 2,
        queue_depth: 16,
        max_attempts: 3,
        store_retry_budget: 2,
        confirmation_depth: 2,
        poll_interval: Duration::from_millis(25),
        confirmation_deadline: Duration::from_secs(10),
        backoff: BackoffPolicy::new(50, 400),
    };
    let orchestrator = MintOrchestrator::start(
        Arc::clone(&ledger),
        store.clone(),
        Arc::new(chain.clone()),
        account,
        config,
    );
    let mut event_rx = orchestrator.subscribe();
    timing("bootstrap", t.elapsed());

    info("Workers", "2");
    info("Confirmation depth", "2 blocks");
    info("Devnet block time", "200 ms");
    success("Bridge is live and producing blocks");

    // -----------------------------------------------------------------------
    // Step 3: Verification Decisions
    // -----------------------------------------------------------------------

    section(3, "Verification Decisions Arrive");
    subsection("Storing evidence bundles and recording provider decisions...");

    let maya_evidence = store
        .put(b"provider evidence: maya".to_vec())
        .await
        .expect("store evidence");
    let lucas_evidence = store
        .put(b"provider evidence: lucas".to_vec())
        .await
        .expect("store evidence");

    orchestrator
        .record_decision(maya_fp, Decision::Approved, maya_evidence)
        .await
        .expect("approve maya");
    success("Maya approved; mint request staged");

    orchestrator
        .record_decision(lucas_fp, Decision::Approved, lucas_evidence)
        .await
        .expect("approve lucas");
    success("Lucas approved; mint request staged");

    // A rejection is recorded for the audit trail but never mints.
    let rejected = IdentityAttributes::new(
        "Jordan Blake",
        NaiveDate::from_ymd_opt(1999, 7, 30).unwrap(),
        DocumentKind::DriversLicense,
        "DL-40122",
        "US",
    );
    let rejected_fp = IdentityFingerprint::derive(&rejected);
    let rejected_evidence = store
        .put(b"provider evidence: failed liveness check".to_vec())
        .await
        .expect("store evidence");
    orchestrator
        .record_decision(rejected_fp, Decision::Rejected, rejected_evidence)
        .await
        .expect("record rejection");
    info("Jordan", "rejected (failed liveness check), nothing staged");

    // -----------------------------------------------------------------------
    // Step 4: Mints Confirm on the Devnet
    // -----------------------------------------------------------------------

    section(4, "Credential Tokens Mint and Confirm");
    subsection("Workers sign mint calls, broadcast, and poll for depth...");

    let t = Instant::now();
    let maya_request = wait_for_state(&ledger, &maya_fp, MintState::Confirmed).await;
    let lucas_request = wait_for_state(&ledger, &lucas_fp, MintState::Confirmed).await;
    timing("both mints confirmed", t.elapsed());

    info(
        "Maya tx",
        &short_handle(maya_request.tx_handle.as_ref().unwrap()),
    );
    info(
        "Lucas tx",
        &short_handle(lucas_request.tx_handle.as_ref().unwrap()),
    );
    {
        let registry = chain.registry();
        let maya_token = registry.token(&idempotency_key(&maya_fp)).unwrap();
        let lucas_token = registry.token(&idempotency_key(&lucas_fp)).unwrap();
        info(
            "Tokens minted",
            &format!(
                "#{} (Maya), #{} (Lucas)",
                maya_token.token_id, lucas_token.token_id
            ),
        );
    }
    info("Chain height", &chain.height().to_string());
    success("Both identities hold exactly one credential token");

    // -----------------------------------------------------------------------
    // Step 5: Duplicate Protection
    // -----------------------------------------------------------------------

    section(5, "Duplicate Protection");
    subsection("The second provider re-reports Maya with formatting noise...");

    let duplicate = orchestrator
        .record_decision(
            IdentityFingerprint::derive(&maya_reformatted),
            Decision::Approved,
            maya_evidence,
        )
        .await;
    match duplicate {
        Err(LedgerError::DuplicateApproval { fingerprint }) => {
            failure_note(&format!(
                "duplicate approval for {}",
                fingerprint.to_address()
            ));
        }
        other => panic!("expected duplicate refusal, got {other:?}"),
    }
    assert_eq!(chain.registry().token_count(), 2);
    success("Registry still holds two tokens; no double mint possible");

    // -----------------------------------------------------------------------
    // Step 6: Incident Drill
    // -----------------------------------------------------------------------

    section(6, "Incident Drill: Paused Registry");
    subsection("Operator pauses the registry; an approval lands mid-incident...");

    chain.registry().pause();

    let sofia = IdentityAttributes::new(
        "Sofia Kovac",
        NaiveDate::from_ymd_opt(1993, 2, 9).unwrap(),
        DocumentKind::ResidencePermit,
        "RP-99015",
        "AT",
    );
    let sofia_fp = IdentityFingerprint::derive(&sofia);
    let sofia_evidence = store
        .put(b"provider evidence: sofia".to_vec())
        .await
        .expect("store evidence");
    orchestrator
        .record_decision(sofia_fp, Decision::Approved, sofia_evidence)
        .await
        .expect("approve sofia");

    let failed = wait_for_state(&ledger, &sofia_fp, MintState::FailedTerminal).await;
    failure_note(&format!(
        "mint went terminal: {}",
        failed.last_error.as_deref().unwrap_or("unknown")
    ));

    subsection("Incident resolved; operator unpauses and resubmits...");
    chain.registry().unpause();
    orchestrator.resubmit(sofia_fp).await.expect("resubmit");

    let recovered = wait_for_state(&ledger, &sofia_fp, MintState::Confirmed).await;
    info(
        "Sofia tx",
        &short_handle(recovered.tx_handle.as_ref().unwrap()),
    );
    assert_eq!(chain.registry().token_count(), 3);
    success("Resubmission minted token #3 after the incident");

    // -----------------------------------------------------------------------
    // Step 7: Shutdown and Summary
    // -----------------------------------------------------------------------

    section(7, "Graceful Shutdown and Summary");
    subsection("Draining workers and stopping block production...");

    orchestrator.shutdown().await;
    stop_blocks.send(true).expect("stop blocks");
    ticker.await.expect("ticker joins");

    let stats = ledger.stats();
    println!();
    println!("  {BOLD}{WHITE}Ledger Statistics:{RESET}");
    println!("  {DIM}----------------------------------------------{RESET}");
    info("Approvals recorded", &stats.approvals.to_string());
    info("Rejections recorded", &stats.rejections.to_string());
    info("Active requests", &stats.active_requests.to_string());
    info("Archived requests", &stats.archived_requests.to_string());
    println!();
    println!("  {BOLD}{WHITE}Devnet Statistics:{RESET}");
    println!("  {DIM}----------------------------------------------{RESET}");
    info("Chain height", &chain.height().to_string());
    info(
        "Transactions accepted",
        &chain.transaction_count().to_string(),
    );
    info("Credential tokens", &chain.registry().token_count().to_string());

    println!();
    println!("  {BOLD}{WHITE}Lifecycle Event Log:{RESET}");
    println!("  {DIM}----------------------------------------------{RESET}");
    loop {
        match event_rx.try_recv() {
            Ok(event) => event_line(&event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }

    println!();
    println!(
        "  {BOLD}{GREEN}Total demo time: {:.2}s{RESET}",
        demo_start.elapsed().as_secs_f64()
    );
    println!();
}
