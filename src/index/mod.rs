//! Index Module
//!
//! Sorted key → member map over a compressed line stream.
//!
//! ## Entry Format
//! ```text
//! <key> TAB <offset> TAB <length> LF
//! ```
//!
//! `offset` and `length` are decimal byte positions of the member frame in
//! the archive. The decompressed index is sorted by key ascending, bytewise;
//! a key never appears twice. TAB and LF are disallowed in keys (the
//! extractor rejects them), so the format needs no quoting.
//!
//! The same line codec serves both the raw (uncompressed, unsorted) index
//! stream the repacker spills and the final compressed index the builder
//! writes.

mod builder;
mod search;

use std::io::{BufRead, Write};

pub use builder::{DuplicatePolicy, IndexBuilder, IndexStats};
pub use search::IndexSearcher;

use crate::error::Result;
use crate::GzipiError;

// =============================================================================
// Index Entry
// =============================================================================

/// One key → member mapping.
///
/// Ordering is by key first, then member offset, which is exactly the order
/// the final index is written in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexEntry {
    /// Raw key bytes (no TAB, no newline)
    pub key: Vec<u8>,
    /// Byte offset of the member frame in the archive
    pub offset: u64,
    /// Byte length of the member frame
    pub length: u64,
}

impl IndexEntry {
    pub fn new(key: Vec<u8>, offset: u64, length: u64) -> Self {
        Self { key, offset, length }
    }

    /// Serialize as one index line (including the terminator)
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.key);
        out.push(b'\t');
        out.extend_from_slice(self.offset.to_string().as_bytes());
        out.push(b'\t');
        out.extend_from_slice(self.length.to_string().as_bytes());
        out.push(b'\n');
    }

    /// Parse one index line. A trailing newline on `line` is ignored.
    pub fn parse(line: &[u8]) -> Result<IndexEntry> {
        let line = match line.last() {
            Some(b'\n') => &line[..line.len() - 1],
            _ => line,
        };

        // Split from the right: the key may contain any byte except TAB.
        let mut fields = line.rsplitn(3, |&b| b == b'\t');
        let length = fields.next();
        let offset = fields.next();
        let key = fields.next();

        match (key, offset, length) {
            (Some(key), Some(offset), Some(length)) => Ok(IndexEntry {
                key: key.to_vec(),
                offset: parse_decimal(offset)?,
                length: parse_decimal(length)?,
            }),
            _ => Err(GzipiError::Format(format!(
                "malformed index entry: {:?}",
                String::from_utf8_lossy(line)
            ))),
        }
    }

    /// Member span `(offset, length)` this entry points at
    pub fn span(&self) -> (u64, u64) {
        (self.offset, self.length)
    }
}

fn parse_decimal(field: &[u8]) -> Result<u64> {
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| {
            GzipiError::Format(format!(
                "malformed index entry: bad integer {:?}",
                String::from_utf8_lossy(field)
            ))
        })
}

// =============================================================================
// Raw Index Stream
// =============================================================================

/// Appends raw-index entries to the repacker's spill stream
pub struct RawIndexWriter<W: Write> {
    sink: W,
    line: Vec<u8>,
}

impl<W: Write> RawIndexWriter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink, line: Vec::new() }
    }

    pub fn append(&mut self, entry: &IndexEntry) -> Result<()> {
        self.line.clear();
        entry.encode(&mut self.line);
        self.sink.write_all(&self.line)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.sink.flush()?;
        Ok(self.sink)
    }
}

/// Read the next entry from a raw-index stream; `None` at EOF
pub(crate) fn read_entry<R: BufRead>(reader: &mut R, line: &mut Vec<u8>) -> Result<Option<IndexEntry>> {
    line.clear();
    if reader.read_until(b'\n', line)? == 0 {
        return Ok(None);
    }
    IndexEntry::parse(line).map(Some)
}
