//! Ranged and transparent decompression
//!
//! The reading half of the codec layer: decompress an exact member slice of
//! an archive, and wrap arbitrary input streams so that gzip, zstd and plain
//! data all read the same way.

use std::io::{Cursor, Read, Seek, SeekFrom};

use flate2::read::MultiGzDecoder;
use zstd::stream::read::Decoder as ZstdDecoder;

use crate::error::Result;
use crate::GzipiError;

use super::Codec;

/// Decompress the archive slice `[offset, offset + length)` as one or more
/// standalone frames.
///
/// The slice must cover whole frames; that is what member alignment
/// guarantees. Decoder failures (truncated frame, bit corruption, checksum
/// mismatch) surface as [`GzipiError::Codec`] so callers can skip the member.
pub fn decompress_range<R: Read + Seek + ?Sized>(
    source: &mut R,
    codec: Codec,
    offset: u64,
    length: u64,
) -> Result<Vec<u8>> {
    source.seek(SeekFrom::Start(offset))?;
    let mut compressed = vec![0u8; length as usize];
    source.read_exact(&mut compressed)?;
    decompress_frames(&compressed, codec).map_err(|e| {
        GzipiError::Codec(format!(
            "member at {}..{} failed to decompress: {}",
            offset,
            offset + length,
            e
        ))
    })
}

/// Decompress a byte buffer holding one or more complete frames
pub(crate) fn decompress_frames(compressed: &[u8], codec: Codec) -> std::io::Result<Vec<u8>> {
    let mut payload = Vec::new();
    match codec {
        Codec::Gzip => {
            MultiGzDecoder::new(compressed).read_to_end(&mut payload)?;
        }
        Codec::Zstd => {
            ZstdDecoder::new(compressed)?.read_to_end(&mut payload)?;
        }
    }
    Ok(payload)
}

/// Iterate the records of a decompressed member payload.
///
/// Yields each line including its terminator; the final line is yielded even
/// if it lacks one.
pub fn member_records(payload: &[u8]) -> impl Iterator<Item = &[u8]> {
    payload.split_inclusive(|&b| b == b'\n')
}

/// Wrap an input stream, transparently decompressing gzip or zstd.
///
/// The codec is recognized from the first bytes, so this works on
/// non-seekable sources (stdin, pipes). Unrecognized input is passed through
/// unchanged.
pub fn transparent_reader<R: Read + 'static>(mut source: R) -> Result<Box<dyn Read>> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        let n = source.read(&mut header[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    let codec = Codec::sniff_bytes(&header[..filled]);
    let rejoined = Cursor::new(header[..filled].to_vec()).chain(source);
    Ok(match codec {
        Some(Codec::Gzip) => Box::new(MultiGzDecoder::new(rejoined)),
        Some(Codec::Zstd) => Box::new(ZstdDecoder::new(rejoined)?),
        None => Box::new(rejoined),
    })
}
