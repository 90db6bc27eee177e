//! Index Builder
//!
//! Reduces the repacker's raw-index stream (unsorted across members) into
//! the final compressed index: sorted by key, deduplicated, one entry per
//! key.
//!
//! Entries are sorted in memory while they fit inside the configured budget.
//! Beyond that, sorted runs are spilled to anonymous temporary files and
//! k-way merged through a binary heap.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};

use tracing::{debug, warn};

use crate::codec::{Codec, StreamEncoder};
use crate::error::Result;
use crate::GzipiError;

use super::{read_entry, IndexEntry, RawIndexWriter};

// =============================================================================
// Build Policy & Stats
// =============================================================================

/// What to do when one key maps to two different members
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Integrity failure: a repack run can never produce this
    Fail,
    /// Keep the entry with the lowest member offset (index-only mode, where
    /// input order is not controlled)
    FirstWins,
}

/// Outcome of an index build
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexStats {
    /// Entries written to the final index
    pub entries: u64,
    /// Exact duplicate rows removed
    pub deduped: u64,
    /// Conflicting rows collapsed under `FirstWins`
    pub collapsed: u64,
}

// =============================================================================
// Index Builder
// =============================================================================

/// Builder for the final compressed index
pub struct IndexBuilder {
    codec: Codec,
    sort_budget: usize,
    policy: DuplicatePolicy,
}

impl IndexBuilder {
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            sort_budget: 256 * 1024 * 1024,
            policy: DuplicatePolicy::Fail,
        }
    }

    /// Raw-index bytes held in memory before spilling a sorted run
    pub fn sort_budget(mut self, bytes: usize) -> Self {
        self.sort_budget = bytes.max(1);
        self
    }

    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sort, deduplicate and write the final index.
    ///
    /// `raw` is the unsorted raw-index stream; `out` receives a single
    /// compressed stream of sorted entries. An empty raw stream still
    /// produces a well-formed (empty) compressed frame.
    pub fn build<R: BufRead, W: Write>(&self, mut raw: R, out: W) -> Result<IndexStats> {
        let mut batch: Vec<IndexEntry> = Vec::new();
        let mut batch_bytes = 0usize;
        let mut runs: Vec<BufReader<std::fs::File>> = Vec::new();
        let mut line = Vec::new();

        while let Some(entry) = read_entry(&mut raw, &mut line)? {
            batch_bytes += entry.key.len() + 16;
            batch.push(entry);
            if batch_bytes >= self.sort_budget {
                runs.push(spill_run(&mut batch)?);
                batch_bytes = 0;
            }
        }
        batch.sort();

        debug!(
            runs = runs.len(),
            in_memory = batch.len(),
            "sorting raw index"
        );

        let mut writer = DedupeWriter::new(StreamEncoder::new(out, self.codec)?, self.policy);
        if runs.is_empty() {
            for entry in batch.drain(..) {
                writer.push(entry)?;
            }
        } else {
            merge_runs(runs, batch, &mut writer)?;
        }
        let (encoder, stats) = writer.finish()?;
        encoder.finish()?.flush()?;

        if stats.collapsed > 0 {
            warn!(collapsed = stats.collapsed, "collapsed conflicting index entries");
        }
        Ok(stats)
    }
}

/// Sort a batch and spill it to an anonymous temporary file, rewound for
/// reading
fn spill_run(batch: &mut Vec<IndexEntry>) -> Result<BufReader<std::fs::File>> {
    batch.sort();

    let mut writer = RawIndexWriter::new(BufWriter::new(tempfile::tempfile()?));
    for entry in batch.drain(..) {
        writer.append(&entry)?;
    }
    let mut file = writer.finish()?.into_inner().map_err(|e| {
        GzipiError::Io(e.into_error())
    })?;
    file.seek(SeekFrom::Start(0))?;
    Ok(BufReader::new(file))
}

/// K-way merge of the spilled runs plus the final in-memory batch
fn merge_runs<W: Write>(
    mut runs: Vec<BufReader<std::fs::File>>,
    batch: Vec<IndexEntry>,
    writer: &mut DedupeWriter<W>,
) -> Result<()> {
    // Min-heap over (entry, run id); the in-memory batch is fed as one more
    // run through an iterator.
    let mut batch_iter = batch.into_iter();
    let mut heap: BinaryHeap<Reverse<(IndexEntry, usize)>> = BinaryHeap::new();
    let mut line = Vec::new();

    let batch_id = runs.len();
    for (id, run) in runs.iter_mut().enumerate() {
        if let Some(entry) = read_entry(run, &mut line)? {
            heap.push(Reverse((entry, id)));
        }
    }
    if let Some(entry) = batch_iter.next() {
        heap.push(Reverse((entry, batch_id)));
    }

    while let Some(Reverse((entry, id))) = heap.pop() {
        writer.push(entry)?;
        let next = if id == batch_id {
            batch_iter.next()
        } else {
            read_entry(&mut runs[id], &mut line)?
        };
        if let Some(entry) = next {
            heap.push(Reverse((entry, id)));
        }
    }
    Ok(())
}

// =============================================================================
// Dedupe Writer
// =============================================================================

/// Accepts key-sorted entries, resolves duplicates, writes index lines
struct DedupeWriter<W: Write> {
    sink: StreamEncoder<W>,
    policy: DuplicatePolicy,
    pending: Option<IndexEntry>,
    stats: IndexStats,
    line: Vec<u8>,
}

impl<W: Write> DedupeWriter<W> {
    fn new(sink: StreamEncoder<W>, policy: DuplicatePolicy) -> Self {
        Self { sink, policy, pending: None, stats: IndexStats::default(), line: Vec::new() }
    }

    fn push(&mut self, entry: IndexEntry) -> Result<()> {
        let pending = match self.pending.take() {
            None => {
                self.pending = Some(entry);
                return Ok(());
            }
            Some(p) => p,
        };

        if pending.key != entry.key {
            self.write(&pending)?;
            self.pending = Some(entry);
            return Ok(());
        }

        // Same key: exact duplicate rows collapse silently; conflicting
        // member spans are resolved by policy.
        if pending.span() == entry.span() {
            self.stats.deduped += 1;
            self.pending = Some(pending);
            return Ok(());
        }
        match self.policy {
            DuplicatePolicy::Fail => Err(GzipiError::Integrity(format!(
                "key {:?} maps to members at {} and {}",
                String::from_utf8_lossy(&pending.key),
                pending.offset,
                entry.offset
            ))),
            DuplicatePolicy::FirstWins => {
                self.stats.collapsed += 1;
                self.pending = Some(if entry.offset < pending.offset { entry } else { pending });
                Ok(())
            }
        }
    }

    fn write(&mut self, entry: &IndexEntry) -> Result<()> {
        self.line.clear();
        entry.encode(&mut self.line);
        self.sink.write_all(&self.line)?;
        self.stats.entries += 1;
        Ok(())
    }

    fn finish(mut self) -> Result<(StreamEncoder<W>, IndexStats)> {
        if let Some(pending) = self.pending.take() {
            self.write(&pending)?;
        }
        Ok((self.sink, self.stats))
    }
}
