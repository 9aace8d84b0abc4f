//! # Store Module
//!
//! Content-addressed blob storage for the bridge. Two things live here:
//! the evidence blobs a verification provider pins before approving an
//! identity, and the credential metadata documents the mint pipeline
//! writes just before calling the registry.
//!
//! ## Architecture
//!
//! ```text
//! content_id.rs - BLAKE3 content identifier, hex-rendered
//! blob.rs       - BlobStore trait and error taxonomy
//! memory.rs     - DashMap-backed store with outage injection for tests
//! ```
//!
//! The trait is the seam: the bridge core only ever talks to
//! `Arc<dyn BlobStore>`. The in-memory implementation serves the devnet
//! and the test suite; a pinning-service client slots in behind the same
//! trait without touching the pipeline.

pub mod blob;
pub mod content_id;
pub mod memory;

pub use blob::{BlobStore, StoreError};
pub use content_id::ContentId;
pub use memory::MemoryBlobStore;
