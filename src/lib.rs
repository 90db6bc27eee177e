//! # gzipi
//!
//! Random-like access to large line-oriented records stored in
//! block-compressed archives (gzip and zstandard), via:
//! - block-aligned recompression ("repack") into independently
//!   decompressible members
//! - a sorted, compressed key → member index
//! - buffered binary search over the index plus targeted member reads
//!
//! ## Architecture Overview
//!
//! ```text
//!            repack                        retrieve
//!
//! ┌─────────────┐                   ┌──────────────────┐
//! │   Records   │                   │    Query keys    │
//! └──────┬──────┘                   └────────┬─────────┘
//!        │ key extraction                    │ binary search
//! ┌──────▼──────┐                   ┌────────▼─────────┐
//! │  Repacker   │                   │  IndexSearcher   │
//! │ (M-record   │                   │ (decompressed    │
//! │  members)   │                   │  scratch)        │
//! └──┬───────┬──┘                   └────────┬─────────┘
//!    │       │ raw index                     │ (offset, length)
//!    │  ┌────▼─────────┐             ┌───────▼────────┐
//!    │  │ IndexBuilder │             │   Retriever    │
//!    │  │ (sort+dedupe)│             │ (member reads) │
//!    │  └────┬─────────┘             └───────┬────────┘
//! ┌──▼───┐ ┌─▼─────┐                 ┌───────▼────────┐
//! │.gz/  │ │ index │────────────────▶│    Records     │
//! │.zst  │ │ file  │                 └────────────────┘
//! └──────┘ └───────┘
//! ```
//!
//! The archive stays byte-for-byte compatible with `gunzip` / `zstd -d`:
//! members are plain concatenated frames, no custom wrapper.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod extract;
pub mod index;
pub mod repack;
pub mod retrieve;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{GzipiError, Result};
pub use config::Config;
pub use codec::Codec;
pub use extract::RecordFormat;
pub use repack::{index_run, repack_run, Repacker};
pub use retrieve::Retriever;
pub use store::{LocalStore, Store};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of gzipi
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
