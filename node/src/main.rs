// Copyright (c) 2026 PearID Labs. MIT License.
// See LICENSE for details.

//! # PearID Bridge Node
//!
//! Entry point for the `pearid-node` binary. Parses CLI arguments, opens the
//! verification ledger, starts the devnet registry chain and the mint
//! pipeline, and serves the HTTP/WS API plus Prometheus metrics.
//!
//! The binary supports four subcommands:
//!
//! - `run`     - start the bridge node
//! - `init`    - initialize the data directory and generate an account key
//! - `status`  - query a running node's status endpoint
//! - `version` - print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{broadcast, watch};

use pearid_bridge::chain::ChainAccount;
use pearid_bridge::mint::{MintEvent, MintOrchestrator, OrchestratorConfig};
use pearid_bridge::storage::VerificationLedger;
use pearid_bridge::store::{BlobStore, MemoryBlobStore};
use pearid_registry::devnet::DevnetChain;

use cli::{Commands, PearidNodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = PearidNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the full bridge node: ledger, devnet chain, mint pipeline, API
/// server, and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "pearid_node=info,pearid_bridge=info,tower_http=debug",
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        workers = args.workers,
        data_dir = %args.data_dir.display(),
        "starting pearid-node"
    );

    // --- Durable ledger ---
    std::fs::create_dir_all(&args.data_dir).with_context(|| {
        format!("failed to create data directory: {}", args.data_dir.display())
    })?;
    let ledger_path = args.data_dir.join("ledger");
    let ledger = Arc::new(
        VerificationLedger::open(&ledger_path)
            .with_context(|| format!("failed to open ledger at {}", ledger_path.display()))?,
    );
    tracing::info!(path = %ledger_path.display(), "ledger opened");

    // --- Signing account ---
    let account = Arc::new(load_or_create_account(&args)?);
    tracing::info!(public_key = %account.public_key_hex(), "chain account ready");

    // --- Evidence store ---
    // The devnet profile keeps evidence in memory. A deployment against a
    // real pinning service swaps this Arc and nothing else changes.
    let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());

    // --- Devnet registry chain ---
    let chain = DevnetChain::new();
    let (ticker_stop_tx, ticker_stop_rx) = watch::channel(false);
    let ticker = chain.spawn_ticker(Duration::from_millis(args.block_time_ms), ticker_stop_rx);
    tracing::info!(block_time_ms = args.block_time_ms, "devnet block ticker running");

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());

    // --- Mint pipeline ---
    let config = OrchestratorConfig {
        workers: args.workers,
        ..OrchestratorConfig::default()
    };
    let orchestrator = MintOrchestrator::start(
        Arc::clone(&ledger),
        Arc::clone(&store),
        Arc::new(chain.clone()),
        Arc::clone(&account),
        config,
    );

    // --- Crash recovery sweep ---
    let report = orchestrator.recover().await?;
    if report.total() > 0 {
        tracing::info!(
            requeued_pending = report.requeued_pending,
            requeued_retryable = report.requeued_retryable,
            resumed_submitted = report.resumed_submitted,
            restaged_approvals = report.restaged_approvals,
            "recovery sweep requeued unfinished work"
        );
    } else {
        tracing::info!("recovery sweep found nothing to resume");
    }

    // --- Metrics event pump ---
    // Counters come straight off the event stream; the gauge and the
    // attempts histogram need a ledger read, which is why this lives here
    // and not inside NodeMetrics.
    let pump_metrics = Arc::clone(&node_metrics);
    let pump_ledger = Arc::clone(&ledger);
    let mut pump_rx = orchestrator.subscribe();
    let metrics_pump = tokio::spawn(async move {
        loop {
            match pump_rx.recv().await {
                Ok(event) => {
                    pump_metrics.observe_event(&event);
                    if let MintEvent::Confirmed { fingerprint, .. } = &event {
                        if let Ok(Some(request)) = pump_ledger.get_mint_state(fingerprint) {
                            pump_metrics
                                .attempts_per_mint
                                .observe(f64::from(request.attempt_count));
                        }
                    }
                    let stats = pump_ledger.stats();
                    pump_metrics.active_requests.set(stats.active_requests as i64);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("metrics pump lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (schema {})",
            env!("CARGO_PKG_VERSION"),
            pearid_bridge::config::METADATA_SCHEMA,
        ),
        network: "devnet".to_string(),
        started_at: chrono::Utc::now(),
        chain: chain.clone(),
        ledger: Arc::clone(&ledger),
        orchestrator: Arc::clone(&orchestrator),
        store,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining the pipeline");
        }
    }

    // Workers finish their current job before the queues close, so a mint
    // that was broadcast is never abandoned mid-poll.
    orchestrator.shutdown().await;
    let _ = ticker_stop_tx.send(true);
    let _ = ticker.await;
    metrics_pump.abort();

    tracing::info!("pearid-node stopped");
    Ok(())
}

/// Resolves the signing account for this node, in priority order: the
/// `--account-key` flag, a key file in the data directory, or a freshly
/// generated key persisted for next time.
fn load_or_create_account(args: &cli::RunArgs) -> Result<ChainAccount> {
    if let Some(raw) = &args.account_key {
        return ChainAccount::from_hex(raw).context("invalid --account-key seed");
    }

    let key_path = args.data_dir.join("account.key");
    if key_path.exists() {
        let raw = std::fs::read_to_string(&key_path)
            .with_context(|| format!("failed to read account key from {}", key_path.display()))?;
        return ChainAccount::from_hex(raw.trim())
            .with_context(|| format!("corrupt account key at {}", key_path.display()));
    }

    let account = ChainAccount::generate();
    write_account_key(&key_path, &account)?;
    tracing::info!(key_path = %key_path.display(), "generated new chain account");
    Ok(account)
}

/// Writes the account seed to disk as hex, owner-readable only on Unix.
fn write_account_key(key_path: &std::path::Path, account: &ChainAccount) -> Result<()> {
    std::fs::write(key_path, account.to_hex())
        .with_context(|| format!("failed to write account key to {}", key_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(key_path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

/// Initializes a new node data directory and generates a signing account.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("pearid_node=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let key_path = data_dir.join("account.key");
    if key_path.exists() && !args.force {
        anyhow::bail!(
            "account key already exists at {}; pass --force to overwrite it",
            key_path.display()
        );
    }

    let account = ChainAccount::generate();
    write_account_key(&key_path, &account)?;

    tracing::info!(
        public_key = %account.public_key_hex(),
        key_path = %key_path.display(),
        "chain account generated"
    );

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Account key    : {}", key_path.display());
    println!("  Public key     : {}", account.public_key_hex());

    Ok(())
}

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.api_url.trim_end_matches('/'));
    let body = http_get_text(&url).await?;
    println!("{}", body);
    Ok(())
}

/// Minimal HTTP GET over a raw tokio TCP stream, so the one `status`
/// subcommand does not pull a full HTTP client into the dependency tree.
async fn http_get_text(url: &str) -> Result<String> {
    let target = parse_url(url).map_err(|e| anyhow::anyhow!("invalid URL {}: {}", url, e))?;

    let addr = format!("{}:{}", target.host, target.port);
    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        target.path, target.host,
    );

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    // Everything after the first blank line is the body.
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_else(|| response.to_string());

    Ok(body)
}

/// Host, port, and path pulled out of an `http://` URL.
struct HttpTarget {
    host: String,
    port: u16,
    path: String,
}

/// Just enough URL parsing for `query_status`. Rejects nothing beyond a
/// missing host or an unparseable port.
fn parse_url(s: &str) -> Result<HttpTarget, String> {
    let rest = s.strip_prefix("http://").unwrap_or(s);

    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };

    let (host, port) = match authority.rfind(':') {
        Some(i) => {
            let port = authority[i + 1..]
                .parse::<u16>()
                .map_err(|e| format!("bad port: {}", e))?;
            (&authority[..i], port)
        }
        None => (authority, 80),
    };

    if host.is_empty() {
        return Err("missing host".to_string());
    }

    Ok(HttpTarget {
        host: host.to_string(),
        port,
        path: path.to_string(),
    })
}

/// Prints version information to stdout.
fn print_version() {
    println!("pearid-node {}", env!("CARGO_PKG_VERSION"));
    println!("schema      {}", pearid_bridge::config::METADATA_SCHEMA);
    println!("rustc       {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_parsing_covers_the_status_targets() {
        let target = parse_url("http://127.0.0.1:9871/status").expect("parse");
        assert_eq!(target.host, "127.0.0.1");
        assert_eq!(target.port, 9871);
        assert_eq!(target.path, "/status");

        let bare = parse_url("http://localhost").expect("parse");
        assert_eq!(bare.host, "localhost");
        assert_eq!(bare.port, 80);
        assert_eq!(bare.path, "/");

        assert!(parse_url("http://:9871/status").is_err());
        assert!(parse_url("http://localhost:notaport/").is_err());
    }
}
