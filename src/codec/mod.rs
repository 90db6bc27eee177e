//! Codec Module
//!
//! Frame-boundary-aware compression for gzip and zstd.
//!
//! ## Archive Layout
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Member 0: complete gzip member / zstd frame              │
//! ├──────────────────────────────────────────────────────────┤
//! │ Member 1: complete gzip member / zstd frame              │
//! ├──────────────────────────────────────────────────────────┤
//! │ ...                                                      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Members are laid out back-to-back with no padding, so the whole archive
//! is a plain multi-member stream that standard tools (`gunzip`, `zstd -d`)
//! decompress end to end. Random access works because every member is a
//! complete frame: the bytes `[offset, offset+length)` decompress in
//! isolation.

mod reader;
mod scan;
mod writer;

use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::str::FromStr;

pub use reader::{decompress_range, member_records, transparent_reader};
pub(crate) use reader::decompress_frames;
pub use scan::{scan_frames, Frame, FrameScanner};
pub use writer::{ArchiveWriter, MemberSpan, StreamEncoder};

use crate::error::Result;
use crate::GzipiError;

// =============================================================================
// Frame Magic Constants (shared by sniffing and frame scanning)
// =============================================================================

/// Gzip magic plus the deflate compression-method byte (RFC 1952)
pub(crate) const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b, 0x08];

/// Fixed-size portion of a gzip member header
pub(crate) const GZIP_HEADER_LEN: usize = 10;

/// Zstandard frame magic, little-endian 0xFD2FB528 (RFC 8878)
pub(crate) const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];

/// Magic plus the frame-header descriptor byte
pub(crate) const ZSTD_HEADER_LEN: usize = 5;

/// Valid values of the OS byte in a gzip header (FAT, Unix, Macintosh,
/// unknown) — used to reject payload bytes that merely look like a header
pub(crate) const GZIP_OS_BYTES: [u8; 4] = [0x00, 0x03, 0x07, 0xff];

// =============================================================================
// Codec Selection
// =============================================================================

/// Compression codec of an archive or index stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Gzip,
    Zstd,
}

impl Codec {
    /// Infer the codec from a file extension (`.gz` / `.zst`)
    pub fn from_path(path: &Path) -> Option<Codec> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("gz") => Some(Codec::Gzip),
            Some("zst") => Some(Codec::Zstd),
            _ => None,
        }
    }

    /// Recognize the codec from the first bytes of a stream
    pub fn sniff_bytes(header: &[u8]) -> Option<Codec> {
        if header.starts_with(GZIP_MAGIC) {
            Some(Codec::Gzip)
        } else if header.starts_with(ZSTD_MAGIC) {
            Some(Codec::Zstd)
        } else {
            None
        }
    }

    /// Recognize the codec from a seekable source, restoring the read
    /// position afterwards. Returns `None` for uncompressed (or empty) input.
    pub fn sniff<R: Read + Seek + ?Sized>(source: &mut R) -> Result<Option<Codec>> {
        let pos = source.stream_position()?;
        let mut header = [0u8; 4];
        let mut filled = 0;
        while filled < header.len() {
            let n = source.read(&mut header[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        source.seek(SeekFrom::Start(pos))?;
        Ok(Codec::sniff_bytes(&header[..filled]))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::Gzip => "gzip",
            Codec::Zstd => "zstd",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Codec {
    type Err = GzipiError;

    fn from_str(s: &str) -> Result<Codec> {
        match s {
            "gzip" => Ok(Codec::Gzip),
            "zstd" => Ok(Codec::Zstd),
            other => Err(GzipiError::Config(format!(
                "unsupported codec {:?} (expected gzip or zstd)",
                other
            ))),
        }
    }
}
