//! Repacker
//!
//! Streams input records into an archive of bounded, independently
//! decompressible members, emitting one raw-index entry per distinct key per
//! member as it goes.
//!
//! ## Responsibilities
//! - Buffer up to `member_records` records, extracting keys on arrival
//! - Sort each buffer by key before emission (bounds memory to one member
//!   and guarantees no cross-member key overlap within a run)
//! - Emit each buffer as one compressed frame, tracking `(offset, length)`
//! - Index-only mode: recover member boundaries of an already-chunked
//!   archive and enumerate its keys without rewriting it

use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{info, warn};

use crate::codec::{
    decompress_frames, member_records, transparent_reader, ArchiveWriter, Codec, FrameScanner,
};
use crate::config::Config;
use crate::error::Result;
use crate::extract::{strip_terminator, RecordFormat};
use crate::index::{DuplicatePolicy, IndexBuilder, IndexEntry, RawIndexWriter};
use crate::store::{temp_sibling, Store, TempGuard};
use crate::GzipiError;

/// Counters reported by a repack or index run
#[derive(Debug, Clone, Copy, Default)]
pub struct RepackStats {
    /// Records written to the archive (or enumerated, in index-only mode)
    pub records: u64,
    /// Members emitted (or discovered)
    pub members: u64,
    /// Records skipped because their key could not be extracted
    pub skipped: u64,
}

/// Streaming record-to-member transform
pub struct Repacker {
    member_records: usize,
    format: RecordFormat,
    strict: bool,
}

impl Repacker {
    pub fn new(config: &Config) -> Self {
        Self {
            member_records: config.member_records.max(1),
            format: config.format.clone(),
            strict: config.strict,
        }
    }

    /// Repack `input` into `archive`, appending raw-index entries to
    /// `raw_index`.
    ///
    /// The input may be gzip, zstd or plain; it is decompressed
    /// transparently. An empty input produces a zero-byte archive and no
    /// raw-index entries.
    pub fn repack<R, W, I>(&self, input: R, archive: W, raw_index: I, codec: Codec) -> Result<RepackStats>
    where
        R: Read + 'static,
        W: Write,
        I: Write,
    {
        let mut reader = BufReader::new(transparent_reader(input)?);
        let mut writer = ArchiveWriter::new(archive, codec);
        let mut raw = RawIndexWriter::new(raw_index);
        let mut stats = RepackStats::default();

        // (key, record) pairs of the member being assembled
        let mut buffer: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(self.member_records);
        let mut line = Vec::new();

        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            let record = strip_terminator(&line);
            if record.is_empty() {
                continue;
            }

            match self.format.extract_key(record) {
                Ok(key) => buffer.push((key, record.to_vec())),
                Err(e) if self.strict => return Err(e),
                Err(e) => {
                    warn!(error = %e, "skipping record with unextractable key");
                    stats.skipped += 1;
                    continue;
                }
            }

            if buffer.len() == self.member_records {
                self.flush_member(&mut buffer, &mut writer, &mut raw, &mut stats)?;
            }
        }
        if !buffer.is_empty() {
            self.flush_member(&mut buffer, &mut writer, &mut raw, &mut stats)?;
        }

        writer.finish()?;
        raw.finish()?;
        info!(
            records = stats.records,
            members = stats.members,
            skipped = stats.skipped,
            "repack complete"
        );
        Ok(stats)
    }

    /// Sort the buffered records, emit them as one member, and append one
    /// raw-index entry per distinct key.
    fn flush_member<W: Write, I: Write>(
        &self,
        buffer: &mut Vec<(Vec<u8>, Vec<u8>)>,
        writer: &mut ArchiveWriter<W>,
        raw: &mut RawIndexWriter<I>,
        stats: &mut RepackStats,
    ) -> Result<()> {
        // Stable sort: records sharing a key keep their input order.
        buffer.sort_by(|a, b| a.0.cmp(&b.0));

        writer.begin_member()?;
        for (_, record) in buffer.iter() {
            writer.write_record(record)?;
        }
        let span = writer.finish_member()?;

        let mut last_key: Option<&[u8]> = None;
        for (key, _) in buffer.iter() {
            if last_key == Some(key.as_slice()) {
                continue; // duplicate within the member: one entry covers all
            }
            raw.append(&IndexEntry::new(key.clone(), span.offset, span.length))?;
            last_key = Some(key.as_slice());
        }

        stats.records += buffer.len() as u64;
        stats.members += 1;
        buffer.clear();
        Ok(())
    }

    /// Index an already-chunked archive without rewriting it.
    ///
    /// Members are taken as-is (no re-sorting); each one is decompressed
    /// just long enough to enumerate its keys.
    pub fn index_archive<R: Read, I: Write>(
        &self,
        archive: R,
        raw_index: I,
        codec: Codec,
    ) -> Result<RepackStats> {
        let mut raw = RawIndexWriter::new(raw_index);
        let mut stats = RepackStats::default();

        for frame in FrameScanner::new(archive, codec) {
            let frame = frame?;
            let payload = decompress_frames(&frame.data, codec).map_err(|e| {
                GzipiError::Codec(format!(
                    "member at {} failed to decompress: {}",
                    frame.offset, e
                ))
            })?;

            let mut keys = std::collections::BTreeSet::new();
            for record in member_records(&payload) {
                match self.format.extract_key(record) {
                    Ok(key) => {
                        keys.insert(key);
                        stats.records += 1;
                    }
                    Err(e) if self.strict => return Err(e),
                    Err(e) => {
                        warn!(error = %e, "skipping record with unextractable key");
                        stats.skipped += 1;
                    }
                }
            }
            for key in keys {
                raw.append(&IndexEntry::new(key, frame.offset, frame.length()))?;
            }
            stats.members += 1;
        }

        raw.finish()?;
        info!(
            records = stats.records,
            members = stats.members,
            skipped = stats.skipped,
            "index scan complete"
        );
        Ok(stats)
    }
}

// =============================================================================
// Store-Level Runs (temp paths, promote on success)
// =============================================================================

/// Repack `input` into `archive_path` + `index_path` through a store.
///
/// Both artifacts are written to temporary siblings and promoted atomically
/// on success; any failure removes the partial outputs.
pub fn repack_run<S: Store, R: Read + 'static>(
    store: &S,
    input: R,
    archive_path: &Path,
    index_path: &Path,
    config: &Config,
) -> Result<RepackStats> {
    let archive_tmp = TempGuard::new(store, temp_sibling(archive_path));
    let index_tmp = TempGuard::new(store, temp_sibling(index_path));

    // Pass 1: archive + raw index spill.
    let mut spill = tempfile::tempfile()?;
    let stats;
    {
        let mut archive = BufWriter::new(store.open_write(archive_tmp.path())?);
        let repacker = Repacker::new(config);
        stats = repacker.repack(input, &mut archive, BufWriter::new(&mut spill), config.codec)?;
        archive.flush()?;
    }

    // Pass 2: reduce the spill into the final index.
    spill.seek(SeekFrom::Start(0))?;
    let index_out = BufWriter::new(store.open_write(index_tmp.path())?);
    IndexBuilder::new(index_codec(index_path, config.codec))
        .sort_budget(config.sort_budget)
        .build(BufReader::new(&mut spill), index_out)?;

    archive_tmp.promote(archive_path)?;
    index_tmp.promote(index_path)?;
    Ok(stats)
}

/// Index an existing archive into `index_path` through a store
pub fn index_run<S: Store, R: Read>(
    store: &S,
    archive: R,
    archive_codec: Codec,
    index_path: &Path,
    config: &Config,
) -> Result<RepackStats> {
    let index_tmp = TempGuard::new(store, temp_sibling(index_path));

    let mut spill = tempfile::tempfile()?;
    let repacker = Repacker::new(config);
    let stats = repacker.index_archive(archive, BufWriter::new(&mut spill), archive_codec)?;

    spill.seek(SeekFrom::Start(0))?;
    let index_out = BufWriter::new(store.open_write(index_tmp.path())?);
    IndexBuilder::new(index_codec(index_path, archive_codec))
        .sort_budget(config.sort_budget)
        .duplicate_policy(DuplicatePolicy::FirstWins)
        .build(BufReader::new(&mut spill), index_out)?;

    index_tmp.promote(index_path)?;
    Ok(stats)
}

/// The index stream uses the codec its filename implies, falling back to the
/// archive's codec
fn index_codec(index_path: &Path, archive_codec: Codec) -> Codec {
    Codec::from_path(index_path).unwrap_or(archive_codec)
}
