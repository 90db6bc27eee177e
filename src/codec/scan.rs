//! Frame Scanner
//!
//! Recovers member boundaries from an already-chunked archive by locating
//! frame headers in the compressed byte stream, without decompressing.
//!
//! Compressed payload bytes can coincidentally contain the magic sequence,
//! so every candidate is validated against the fixed header fields (gzip:
//! reserved flag bits and OS byte; zstd: reserved descriptor bit) before it
//! is accepted as a boundary. Candidates that fail validation are treated as
//! payload.

use std::io::Read;

use crate::error::Result;
use crate::GzipiError;

use super::{Codec, GZIP_HEADER_LEN, GZIP_MAGIC, GZIP_OS_BYTES, ZSTD_HEADER_LEN, ZSTD_MAGIC};

/// Read granularity of the scanner
const SCAN_CHUNK: usize = 256 * 1024;

/// One member frame recovered from the archive
#[derive(Debug, Clone)]
pub struct Frame {
    /// Byte offset of the frame in the archive
    pub offset: u64,
    /// The compressed frame bytes
    pub data: Vec<u8>,
}

impl Frame {
    /// Byte length of the frame in the archive
    pub fn length(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Scan an archive and return the `(offset, length)` span of every frame
pub fn scan_frames<R: Read>(source: R, codec: Codec) -> Result<Vec<(u64, u64)>> {
    FrameScanner::new(source, codec)
        .map(|frame| frame.map(|f| (f.offset, f.length())))
        .collect()
}

/// Streaming iterator over the member frames of a compressed archive.
///
/// Buffers at most one member (plus one read chunk) in memory.
pub struct FrameScanner<R: Read> {
    source: R,
    codec: Codec,
    /// Bytes of the current member, possibly followed by the start of the next
    buf: Vec<u8>,
    /// Archive offset of `buf[0]`
    offset: u64,
    /// Position in `buf` from which to resume the header search
    search_from: usize,
    head_checked: bool,
    eof: bool,
    finished: bool,
}

impl<R: Read> FrameScanner<R> {
    pub fn new(source: R, codec: Codec) -> Self {
        Self {
            source,
            codec,
            buf: Vec::new(),
            offset: 0,
            search_from: 1,
            head_checked: false,
            eof: false,
            finished: false,
        }
    }

    fn fill(&mut self) -> Result<()> {
        if self.eof {
            return Ok(());
        }
        let old_len = self.buf.len();
        self.buf.resize(old_len + SCAN_CHUNK, 0);
        let n = self.source.read(&mut self.buf[old_len..])?;
        self.buf.truncate(old_len + n);
        if n == 0 {
            self.eof = true;
        }
        Ok(())
    }

    /// Validate that the archive begins with a frame header. Runs once, as
    /// soon as enough bytes are available.
    fn check_head(&mut self) -> Option<Result<()>> {
        if self.buf.len() < header_len(self.codec) && !self.eof {
            return None; // need more input
        }
        if self.buf.is_empty() {
            // Zero-byte archive: no frames, not an error.
            return Some(Ok(()));
        }
        if !valid_header(&self.buf, self.codec) {
            return Some(Err(GzipiError::Codec(format!(
                "input does not start with a {} frame",
                self.codec
            ))));
        }
        Some(Ok(()))
    }
}

impl<R: Read> Iterator for FrameScanner<R> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if !self.head_checked {
                if let Err(e) = self.fill() {
                    self.finished = true;
                    return Some(Err(e));
                }
                match self.check_head() {
                    None => continue,
                    Some(Err(e)) => {
                        self.finished = true;
                        return Some(Err(e));
                    }
                    Some(Ok(())) => {
                        if self.buf.is_empty() {
                            self.finished = true;
                            return None;
                        }
                        self.head_checked = true;
                    }
                }
            }

            match find_boundary(&self.buf, self.search_from, self.codec) {
                Some(pos) => {
                    let data: Vec<u8> = self.buf.drain(..pos).collect();
                    let frame = Frame { offset: self.offset, data };
                    self.offset += pos as u64;
                    self.search_from = 1;
                    return Some(Ok(frame));
                }
                None if self.eof => {
                    // Everything left is the final frame.
                    self.finished = true;
                    let data = std::mem::take(&mut self.buf);
                    let frame = Frame { offset: self.offset, data };
                    self.offset += frame.length();
                    return Some(Ok(frame));
                }
                None => {
                    // Resume past the region already ruled out, keeping enough
                    // overlap that a header split across reads is still found.
                    self.search_from = self
                        .buf
                        .len()
                        .saturating_sub(header_len(self.codec) - 1)
                        .max(1);
                    if let Err(e) = self.fill() {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
            }
        }
    }
}

// =============================================================================
// Header Matching
// =============================================================================

fn header_len(codec: Codec) -> usize {
    match codec {
        Codec::Gzip => GZIP_HEADER_LEN,
        Codec::Zstd => ZSTD_HEADER_LEN,
    }
}

fn magic(codec: Codec) -> &'static [u8] {
    match codec {
        Codec::Gzip => GZIP_MAGIC,
        Codec::Zstd => ZSTD_MAGIC,
    }
}

fn valid_header(h: &[u8], codec: Codec) -> bool {
    match codec {
        Codec::Gzip => {
            h.len() >= GZIP_HEADER_LEN
                && h.starts_with(GZIP_MAGIC)
                && h[3] & 0xe0 == 0 // reserved flag bits must be clear
                && GZIP_OS_BYTES.contains(&h[9])
        }
        Codec::Zstd => {
            h.len() >= ZSTD_HEADER_LEN
                && h.starts_with(ZSTD_MAGIC)
                && h[4] & 0x08 == 0 // reserved descriptor bit must be clear
        }
    }
}

/// Find the next validated header at or after `from`.
///
/// Returns `None` when no boundary is decidable inside `buf` — either no
/// candidate remains, or the only candidate is too close to the end of the
/// buffer to validate (the caller reads more input and retries).
fn find_boundary(buf: &[u8], from: usize, codec: Codec) -> Option<usize> {
    let magic = magic(codec);
    let header_len = header_len(codec);
    let mut from = from;

    while from + magic.len() <= buf.len() {
        let rel = buf[from..].windows(magic.len()).position(|w| w == magic)?;
        let pos = from + rel;
        if pos + header_len > buf.len() {
            // Candidate runs off the end of the buffer; undecidable yet.
            return None;
        }
        if valid_header(&buf[pos..], codec) {
            return Some(pos);
        }
        from = pos + 1;
    }
    None
}
