//! Index Searcher
//!
//! Buffered binary search over the decompressed index.
//!
//! The index is compressed line-oriented text, so entry boundaries do not
//! line up with byte offsets. On open, the searcher decompresses the index
//! into a private scratch: in memory while it stays under the buffer
//! threshold, otherwise an anonymous temporary file (removed on drop).
//!
//! A probe seeks to the middle of the `[lo, hi)` scope, skips the partial
//! line it landed in, and reads the next complete entry. Near the right edge
//! this discipline can stop converging on absent keys, so two rules bound
//! the search:
//!
//! 1. after advancing `lo` past the probe entry, `lo >= hi` means the key is
//!    absent;
//! 2. if a high probe lands back on the entry at `lo`, the scope no longer
//!    contains an unvisited entry boundary and the search switches to the
//!    buffered linear scan.
//!
//! Once the scope shrinks below the buffer threshold the remaining range is
//! scanned linearly from one read.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use tracing::trace;

use crate::codec::Codec;
use crate::error::Result;
use crate::GzipiError;

use super::IndexEntry;

/// Read granularity for probe line scans
const PROBE_CHUNK: usize = 4 * 1024;

/// Byte-addressable scratch holding the decompressed index
enum Scratch {
    Memory(Cursor<Vec<u8>>),
    File(std::fs::File),
}

impl Scratch {
    fn reader(&mut self) -> &mut dyn ReadSeek {
        match self {
            Scratch::Memory(c) => c,
            Scratch::File(f) => f,
        }
    }
}

trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Random-access lookups over a compressed index stream
pub struct IndexSearcher {
    scratch: Scratch,
    /// Total size of the decompressed index
    size: u64,
    /// Scope size below which the range is scanned from a single buffer
    buffer_threshold: u64,
}

impl IndexSearcher {
    /// Decompress `index` into scratch and prepare for lookups.
    ///
    /// The scratch stays in memory while the decompressed index is smaller
    /// than `buffer_threshold`; larger indexes spill to an anonymous
    /// temporary file.
    pub fn open<R: Read>(index: R, codec: Codec, buffer_threshold: usize) -> Result<Self> {
        let buffer_threshold = buffer_threshold.max(1);
        let mut decoder: Box<dyn Read> = match codec {
            Codec::Gzip => Box::new(flate2::read::MultiGzDecoder::new(index)),
            Codec::Zstd => Box::new(zstd::stream::read::Decoder::new(index)?),
        };

        let mut head = Vec::new();
        let mut chunk = [0u8; 64 * 1024];
        loop {
            let n = decoder
                .read(&mut chunk)
                .map_err(|e| GzipiError::Codec(format!("index failed to decompress: {}", e)))?;
            if n == 0 {
                // Fits in memory.
                let size = head.len() as u64;
                return Ok(Self {
                    scratch: Scratch::Memory(Cursor::new(head)),
                    size,
                    buffer_threshold: buffer_threshold as u64,
                });
            }
            head.extend_from_slice(&chunk[..n]);
            if head.len() > buffer_threshold {
                break;
            }
        }

        // Too big to buffer: spill what we have and stream the rest.
        let mut file = tempfile::tempfile()?;
        file.write_all(&head)?;
        let mut size = head.len() as u64;
        drop(head);
        loop {
            let n = decoder
                .read(&mut chunk)
                .map_err(|e| GzipiError::Codec(format!("index failed to decompress: {}", e)))?;
            if n == 0 {
                break;
            }
            file.write_all(&chunk[..n])?;
            size += n as u64;
        }
        Ok(Self {
            scratch: Scratch::File(file),
            size,
            buffer_threshold: buffer_threshold as u64,
        })
    }

    /// Size of the decompressed index, in bytes
    pub fn index_size(&self) -> u64 {
        self.size
    }

    /// Look up a key; returns the member span `(offset, length)` or `None`
    pub fn lookup(&mut self, key: &[u8]) -> Result<Option<(u64, u64)>> {
        if self.size == 0 {
            return Ok(None);
        }
        // A key the extractor would have rejected can never be present.
        if key.iter().any(|&b| b == b'\t' || b == b'\n') {
            return Ok(None);
        }

        let mut lo = 0u64;
        let mut hi = self.size;

        loop {
            if hi - lo <= self.buffer_threshold {
                return self.scan_range(lo, hi, key);
            }

            let mid = (lo + hi) / 2;
            let probe_start = self.probe_line_start(mid)?;
            if probe_start >= hi {
                // Probe landed inside the last entry of the scope.
                hi = mid;
                continue;
            }

            let (line, probe_end) = self.read_line_at(probe_start)?;
            let entry = IndexEntry::parse(&line)?;
            trace!(lo, mid, hi, key = ?String::from_utf8_lossy(&entry.key), "probe");

            if entry.key == key {
                return Ok(Some(entry.span()));
            } else if entry.key.as_slice() < key {
                lo = probe_end;
                if lo >= hi {
                    return Ok(None);
                }
            } else {
                if probe_start == lo {
                    // No unvisited entry boundary left between lo and hi.
                    return self.scan_range(lo, hi, key);
                }
                hi = mid;
            }
        }
    }

    /// Linearly scan all entries starting in `[lo, hi)` for the key.
    ///
    /// `lo` is always an entry start. The entry containing `hi` may extend
    /// past it, so the read continues to the end of that line.
    fn scan_range(&mut self, lo: u64, hi: u64, key: &[u8]) -> Result<Option<(u64, u64)>> {
        let reader = self.scratch.reader();
        reader.seek(SeekFrom::Start(lo))?;

        let mut buf = vec![0u8; (hi - lo) as usize];
        reader.read_exact(&mut buf)?;
        if buf.last() != Some(&b'\n') {
            // Finish the line straddling hi.
            let mut byte = [0u8; 1];
            loop {
                let n = reader.read(&mut byte)?;
                if n == 0 || byte[0] == b'\n' {
                    if n != 0 {
                        buf.push(b'\n');
                    }
                    break;
                }
                buf.push(byte[0]);
            }
        }

        let mut line_start = 0u64;
        for line in buf.split_inclusive(|&b| b == b'\n') {
            if line_start >= hi - lo {
                break;
            }
            let entry = IndexEntry::parse(line)?;
            if entry.key == key {
                return Ok(Some(entry.span()));
            }
            if entry.key.as_slice() > key {
                break; // sorted: no later entry can match
            }
            line_start += line.len() as u64;
        }
        Ok(None)
    }

    /// Start offset of the probe entry for a scope midpoint.
    ///
    /// When `mid` sits exactly on an entry boundary there is no partial
    /// entry to discard and the entry starting at `mid` is the probe;
    /// otherwise the partial line is skipped. Keeping the boundary case is
    /// what makes `hi := mid` a safe exclusion: every entry starting at or
    /// after `mid` has then been ruled out through the probe comparison.
    fn probe_line_start(&mut self, mid: u64) -> Result<u64> {
        if mid == 0 {
            return Ok(0);
        }
        let reader = self.scratch.reader();
        reader.seek(SeekFrom::Start(mid - 1))?;
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        if byte[0] == b'\n' {
            return Ok(mid);
        }
        self.next_line_start(mid)
    }

    /// Offset of the first line start strictly after the newline at or
    /// beyond `from` (may equal the index size)
    fn next_line_start(&mut self, from: u64) -> Result<u64> {
        let size = self.size;
        let reader = self.scratch.reader();
        reader.seek(SeekFrom::Start(from))?;

        let mut pos = from;
        let mut chunk = [0u8; PROBE_CHUNK];
        while pos < size {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            if let Some(i) = chunk[..n].iter().position(|&b| b == b'\n') {
                return Ok(pos + i as u64 + 1);
            }
            pos += n as u64;
        }
        Ok(size)
    }

    /// Read the complete line starting at `start`; returns the line bytes
    /// (terminator included) and the offset just past it
    fn read_line_at(&mut self, start: u64) -> Result<(Vec<u8>, u64)> {
        let reader = self.scratch.reader();
        reader.seek(SeekFrom::Start(start))?;

        let mut line = Vec::new();
        let mut chunk = [0u8; PROBE_CHUNK];
        loop {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            match chunk[..n].iter().position(|&b| b == b'\n') {
                Some(i) => {
                    line.extend_from_slice(&chunk[..=i]);
                    break;
                }
                None => line.extend_from_slice(&chunk[..n]),
            }
        }
        let end = start + line.len() as u64;
        Ok((line, end))
    }
}
