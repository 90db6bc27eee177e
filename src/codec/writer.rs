//! Archive Writer
//!
//! Writes an archive as a sequence of independently-decompressible members,
//! tracking the byte offset and length of every member as it lands in the
//! sink.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use zstd::stream::write::Encoder as ZstdEncoder;

use crate::error::Result;

use super::Codec;

// =============================================================================
// Stream Encoder (single frame over an arbitrary sink)
// =============================================================================

/// A single compressed frame being written to `W`.
///
/// Used directly for whole-stream outputs (the index file, compressed CLI
/// output) and as the per-member encoder inside [`ArchiveWriter`]. Gzip
/// members are emitted with a zero mtime so identical input produces
/// identical bytes.
pub enum StreamEncoder<W: Write> {
    Gzip(GzEncoder<W>),
    Zstd(ZstdEncoder<'static, W>),
}

impl<W: Write> StreamEncoder<W> {
    pub fn new(sink: W, codec: Codec) -> Result<Self> {
        Ok(match codec {
            Codec::Gzip => StreamEncoder::Gzip(GzEncoder::new(sink, Compression::default())),
            Codec::Zstd => {
                StreamEncoder::Zstd(ZstdEncoder::new(sink, zstd::DEFAULT_COMPRESSION_LEVEL)?)
            }
        })
    }

    /// Close the frame and hand back the sink.
    ///
    /// After this the sink holds a complete, standalone frame; a following
    /// frame written to the same sink is simply concatenated.
    pub fn finish(self) -> Result<W> {
        Ok(match self {
            StreamEncoder::Gzip(enc) => enc.finish()?,
            StreamEncoder::Zstd(enc) => enc.finish()?,
        })
    }
}

impl<W: Write> Write for StreamEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            StreamEncoder::Gzip(enc) => enc.write(buf),
            StreamEncoder::Zstd(enc) => enc.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            StreamEncoder::Gzip(enc) => enc.flush(),
            StreamEncoder::Zstd(enc) => enc.flush(),
        }
    }
}

// =============================================================================
// Archive Writer
// =============================================================================

/// Descriptor of one member as written to the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberSpan {
    /// Byte offset of the member's frame in the archive
    pub offset: u64,
    /// Byte length of the frame
    pub length: u64,
}

/// Writer producing back-to-back compressed members.
///
/// The current member's frame accumulates in memory and is flushed to the
/// sink as one contiguous write when the member is finished. Memory is
/// bounded by a single member.
pub struct ArchiveWriter<W: Write> {
    sink: W,
    codec: Codec,
    /// Archive position where the next member will start
    offset: u64,
    /// Encoder for the member currently open, if any
    member: Option<StreamEncoder<Vec<u8>>>,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(sink: W, codec: Codec) -> Self {
        Self { sink, codec, offset: 0, member: None }
    }

    /// Begin a fresh member frame. A previously opened member must have been
    /// finished first.
    pub fn begin_member(&mut self) -> Result<()> {
        debug_assert!(self.member.is_none(), "member already open");
        self.member = Some(StreamEncoder::new(Vec::new(), self.codec)?);
        Ok(())
    }

    /// Append one record to the open member, terminating it with a newline.
    pub fn write_record(&mut self, record: &[u8]) -> Result<()> {
        let member = self.member.as_mut().expect("no member open");
        member.write_all(record)?;
        member.write_all(b"\n")?;
        Ok(())
    }

    /// Close the open member: flush its complete frame to the sink and return
    /// its position in the archive.
    pub fn finish_member(&mut self) -> Result<MemberSpan> {
        let member = self.member.take().expect("no member open");
        let frame = member.finish()?;
        self.sink.write_all(&frame)?;

        let span = MemberSpan { offset: self.offset, length: frame.len() as u64 };
        self.offset += span.length;
        Ok(span)
    }

    /// Current archive position (start offset of the next member)
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Flush the sink and hand it back together with the total archive size
    pub fn finish(mut self) -> Result<(W, u64)> {
        debug_assert!(self.member.is_none(), "member still open");
        self.sink.flush()?;
        Ok((self.sink, self.offset))
    }
}
