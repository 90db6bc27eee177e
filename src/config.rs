//! Configuration for gzipi
//!
//! Centralized configuration with sensible defaults.

use crate::codec::Codec;
use crate::extract::RecordFormat;

/// Main configuration for a gzipi run
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Archive Configuration
    // -------------------------------------------------------------------------
    /// Compression codec for archive and index output
    pub codec: Codec,

    /// Maximum number of records packed into a single member
    pub member_records: usize,

    // -------------------------------------------------------------------------
    // Record Format Configuration
    // -------------------------------------------------------------------------
    /// How to extract the index key from a record line
    pub format: RecordFormat,

    /// Fail the run on the first unparseable record instead of skipping it
    pub strict: bool,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Binary-search scope below which the index range is scanned from a
    /// single in-memory buffer, in bytes
    pub search_buffer: usize,

    /// Raw-index bytes held in memory before the sort spills runs to disk
    pub sort_budget: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            codec: Codec::Gzip,
            member_records: 16 * 1024,
            format: RecordFormat::Raw,
            strict: false,
            search_buffer: 64 * 1024,
            sort_budget: 256 * 1024 * 1024, // 256 MB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn codec(mut self, codec: Codec) -> Self {
        self.config.codec = codec;
        self
    }

    pub fn member_records(mut self, count: usize) -> Self {
        self.config.member_records = count;
        self
    }

    pub fn format(mut self, format: RecordFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.config.strict = strict;
        self
    }

    pub fn search_buffer(mut self, bytes: usize) -> Self {
        self.config.search_buffer = bytes;
        self
    }

    pub fn sort_budget(mut self, bytes: usize) -> Self {
        self.config.sort_budget = bytes;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
