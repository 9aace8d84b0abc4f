//! # CLI Interface
//!
//! Defines the command-line argument structure for `pearid-node` using
//! `clap` derive. Supports four subcommands: `run`, `init`, `status`,
//! and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use pearid_bridge::config::{
    DEFAULT_API_PORT, DEFAULT_METRICS_PORT, DEFAULT_WORKER_COUNT, DEVNET_BLOCK_TIME_MS,
};

/// PearID bridge node.
///
/// Runs the verification-to-mint bridge: records identity verification
/// decisions, drives the mint pipeline against the registry chain, serves
/// the REST/WebSocket API, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "pearid-node",
    about = "PearID bridge node",
    version,
    propagate_version = true
)]
pub struct PearidNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the PearID node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the bridge node.
    Run(RunArgs),
    /// Initialize a new node: creates the data directory and generates
    /// a fresh chain account key.
    Init(InitArgs),
    /// Query the status of a running node via its API endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node data directory where the ledger and account key
    /// are stored.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "PEARID_DATA_DIR", default_value = "./pearid-data")]
    pub data_dir: PathBuf,

    /// Port for the REST and WebSocket API.
    #[arg(long, env = "PEARID_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "PEARID_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "PEARID_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Hex-encoded Ed25519 seed for the chain account.
    ///
    /// If not provided, the node reads the key from the data directory,
    /// generating one on first run. **Never pass this flag in
    /// production**; use a key file or vault instead.
    #[arg(long, env = "PEARID_ACCOUNT_KEY")]
    pub account_key: Option<String>,

    /// Number of mint workers in the pipeline.
    #[arg(long, env = "PEARID_WORKERS", default_value_t = DEFAULT_WORKER_COUNT)]
    pub workers: usize,

    /// Devnet block time in milliseconds.
    #[arg(long, env = "PEARID_BLOCK_TIME_MS", default_value_t = DEVNET_BLOCK_TIME_MS)]
    pub block_time_ms: u64,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "PEARID_DATA_DIR", default_value = "./pearid-data")]
    pub data_dir: PathBuf,

    /// Overwrite an existing account key.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// API endpoint of the running node.
    #[arg(long, default_value = "http://127.0.0.1:9871")]
    pub api_url: String,
}
