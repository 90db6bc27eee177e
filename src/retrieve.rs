//! Retriever
//!
//! Random access over an indexed archive: looks query keys up through the
//! index searcher, groups hits by member, and reads each relevant member
//! exactly once.
//!
//! ## Responsibilities
//! - Point lookups (`search`) and bulk retrieval from a key stream
//! - Visit members in ascending offset order (sequential reads)
//! - Skip corrupted members, keeping a codec-error counter, and drain the
//!   rest of the query

use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, BufReader, Read, Seek, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::codec::{decompress_range, member_records, transparent_reader, Codec};
use crate::config::Config;
use crate::error::Result;
use crate::extract::{strip_terminator, RecordFormat};
use crate::index::IndexSearcher;
use crate::store::{SeekRead, Store};
use crate::GzipiError;

/// Counters reported by a retrieval run
#[derive(Debug, Clone, Copy, Default)]
pub struct RetrieveStats {
    /// Records written to the output
    pub matched: u64,
    /// Query keys with no index entry
    pub missing: u64,
    /// Members skipped because their frame failed to decompress
    pub codec_errors: u64,
}

impl RetrieveStats {
    /// Whether the run completed without skipping any member
    pub fn is_clean(&self) -> bool {
        self.codec_errors == 0
    }
}

/// Random-access reader over an archive and its index
pub struct Retriever<A: Read + Seek> {
    archive: A,
    codec: Codec,
    searcher: IndexSearcher,
    format: RecordFormat,
}

impl Retriever<Box<dyn SeekRead>> {
    /// Open an archive + index pair through a store.
    ///
    /// Codecs are sniffed from the file contents, falling back to the
    /// configured codec (a zero-byte archive has nothing to sniff).
    pub fn open<S: Store>(
        store: &S,
        archive_path: &Path,
        index_path: &Path,
        config: &Config,
    ) -> Result<Self> {
        let mut archive = store.open_read(archive_path)?;
        let archive_codec = Codec::sniff(archive.as_mut())?.unwrap_or(config.codec);

        let mut index = store.open_read(index_path)?;
        let index_codec = Codec::sniff(index.as_mut())?.ok_or_else(|| {
            GzipiError::Codec(format!("{} is not a compressed index", index_path.display()))
        })?;
        let searcher = IndexSearcher::open(index, index_codec, config.search_buffer)?;

        Ok(Self {
            archive,
            codec: archive_codec,
            searcher,
            format: config.format.clone(),
        })
    }
}

impl<A: Read + Seek> Retriever<A> {
    pub fn new(archive: A, codec: Codec, searcher: IndexSearcher, format: RecordFormat) -> Self {
        Self { archive, codec, searcher, format }
    }

    /// Retrieve the records for every key in `keys`, one key per line.
    ///
    /// Matching records are written to `out` in member order; within a
    /// member, in archive order. Unknown keys produce no output and no
    /// error. A member that fails to decompress is skipped and counted.
    pub fn retrieve<K: Read + 'static, W: Write + ?Sized>(
        &mut self,
        keys: K,
        out: &mut W,
    ) -> Result<RetrieveStats> {
        let mut stats = RetrieveStats::default();

        // Group query keys by the member that holds them.
        let mut members: BTreeMap<(u64, u64), BTreeSet<Vec<u8>>> = BTreeMap::new();
        let mut keys = BufReader::new(transparent_reader(keys)?);
        let mut line = Vec::new();
        loop {
            line.clear();
            if keys.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            let key = strip_terminator(&line);
            if key.is_empty() {
                continue;
            }
            match self.searcher.lookup(key)? {
                Some(span) => {
                    members.entry(span).or_default().insert(key.to_vec());
                }
                None => stats.missing += 1,
            }
        }
        debug!(members = members.len(), missing = stats.missing, "grouped query keys");

        // Visit members in ascending offset order, each exactly once.
        for ((offset, length), wanted) in members {
            let payload = match decompress_range(&mut self.archive, self.codec, offset, length) {
                Ok(payload) => payload,
                Err(GzipiError::Codec(msg)) => {
                    warn!(offset, length, error = %msg, "skipping corrupted member");
                    stats.codec_errors += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            for record in member_records(&payload) {
                let key = match self.format.extract_key(record) {
                    Ok(key) => key,
                    Err(_) => continue, // foreign record; not retrievable by key
                };
                if wanted.contains(&key) {
                    out.write_all(record)?;
                    if record.last() != Some(&b'\n') {
                        out.write_all(b"\n")?;
                    }
                    stats.matched += 1;
                }
            }
        }

        out.flush()?;
        if stats.missing > 0 {
            warn!(missing = stats.missing, "query keys not present in index");
        }
        Ok(stats)
    }

    /// Look up a single key; returns the first matching record, if any.
    pub fn search(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let (offset, length) = match self.searcher.lookup(key)? {
            Some(span) => span,
            None => return Ok(None),
        };

        let payload = decompress_range(&mut self.archive, self.codec, offset, length)?;
        for record in member_records(&payload) {
            if let Ok(record_key) = self.format.extract_key(record) {
                if record_key == key {
                    let mut record = record.to_vec();
                    if record.last() != Some(&b'\n') {
                        record.push(b'\n');
                    }
                    return Ok(Some(record));
                }
            }
        }
        // The index promised this member holds the key; it does not.
        Err(GzipiError::Integrity(format!(
            "index entry for {:?} points at member {}..{} without the key",
            String::from_utf8_lossy(key),
            offset,
            offset + length
        )))
    }
}
