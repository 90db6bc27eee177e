//! Tests for the codec layer
//!
//! These tests verify:
//! - Member framing: back-to-back standalone frames, exact offsets/lengths
//! - Ranged decompression of single members
//! - Compatibility with whole-stream decompression
//! - Frame boundary recovery via scanning
//! - Transparent input decompression

use std::io::{Cursor, Read};

use gzipi::codec::{
    decompress_range, scan_frames, transparent_reader, ArchiveWriter, Codec, StreamEncoder,
};
use gzipi::GzipiError;

// =============================================================================
// Helper Functions
// =============================================================================

/// Build an archive of one member per record group; returns the archive
/// bytes and each member's (offset, length)
fn build_archive(codec: Codec, members: &[Vec<&[u8]>]) -> (Vec<u8>, Vec<(u64, u64)>) {
    let mut writer = ArchiveWriter::new(Vec::new(), codec);
    let mut spans = Vec::new();
    for records in members {
        writer.begin_member().unwrap();
        for record in records {
            writer.write_record(record).unwrap();
        }
        let span = writer.finish_member().unwrap();
        spans.push((span.offset, span.length));
    }
    let (archive, total) = writer.finish().unwrap();
    assert_eq!(archive.len() as u64, total);
    (archive, spans)
}

// =============================================================================
// Member Framing Tests
// =============================================================================

#[test]
fn test_members_are_contiguous() {
    for codec in [Codec::Gzip, Codec::Zstd] {
        let (archive, spans) = build_archive(codec, &[vec![b"a".as_slice()], vec![b"b".as_slice()], vec![b"c".as_slice()]]);

        let mut expected_offset = 0;
        for (offset, length) in &spans {
            assert_eq!(*offset, expected_offset, "codec {}", codec);
            expected_offset += length;
        }
        assert_eq!(expected_offset, archive.len() as u64);
    }
}

#[test]
fn test_decompress_range_isolates_members() {
    for codec in [Codec::Gzip, Codec::Zstd] {
        let (archive, spans) =
            build_archive(codec, &[vec![b"alpha".as_slice(), b"beta".as_slice()], vec![b"gamma".as_slice()]]);

        let mut source = Cursor::new(&archive);
        let first = decompress_range(&mut source, codec, spans[0].0, spans[0].1).unwrap();
        assert_eq!(first, b"alpha\nbeta\n");

        let second = decompress_range(&mut source, codec, spans[1].0, spans[1].1).unwrap();
        assert_eq!(second, b"gamma\n");
    }
}

#[test]
fn test_archive_decompresses_end_to_end() {
    // The concatenated members must read as one plain stream, the way
    // gunzip / zstd -d would see the file.
    for codec in [Codec::Gzip, Codec::Zstd] {
        let (archive, _) = build_archive(codec, &[vec![b"one".as_slice()], vec![b"two".as_slice()], vec![b"three".as_slice()]]);

        let mut reader = transparent_reader(Cursor::new(archive)).unwrap();
        let mut payload = Vec::new();
        reader.read_to_end(&mut payload).unwrap();
        assert_eq!(payload, b"one\ntwo\nthree\n");
    }
}

#[test]
fn test_deterministic_output() {
    for codec in [Codec::Gzip, Codec::Zstd] {
        let (first, _) = build_archive(codec, &[vec![b"same".as_slice(), b"records".as_slice()]]);
        let (second, _) = build_archive(codec, &[vec![b"same".as_slice(), b"records".as_slice()]]);
        assert_eq!(first, second);
    }
}

#[test]
fn test_empty_archive_is_zero_bytes() {
    let writer = ArchiveWriter::new(Vec::new(), Codec::Gzip);
    let (archive, total) = writer.finish().unwrap();
    assert!(archive.is_empty());
    assert_eq!(total, 0);
}

#[test]
fn test_corrupted_member_reports_codec_error() {
    let (mut archive, spans) = build_archive(Codec::Gzip, &[vec![b"intact record".as_slice()]]);
    let mid = (spans[0].1 / 2) as usize;
    archive[mid] ^= 0xff;

    let mut source = Cursor::new(&archive);
    let result = decompress_range(&mut source, Codec::Gzip, spans[0].0, spans[0].1);
    assert!(matches!(result, Err(GzipiError::Codec(_))));
}

// =============================================================================
// Frame Scanning Tests
// =============================================================================

#[test]
fn test_scan_recovers_member_boundaries() {
    for codec in [Codec::Gzip, Codec::Zstd] {
        let (archive, spans) = build_archive(
            codec,
            &[
                vec![b"first member".as_slice()],
                vec![b"second member".as_slice()],
                vec![b"third member".as_slice()],
            ],
        );

        let scanned = scan_frames(Cursor::new(archive), codec).unwrap();
        assert_eq!(scanned, spans, "codec {}", codec);
    }
}

#[test]
fn test_scan_single_member() {
    let (archive, spans) = build_archive(Codec::Gzip, &[vec![b"only".as_slice()]]);
    let scanned = scan_frames(Cursor::new(archive), Codec::Gzip).unwrap();
    assert_eq!(scanned, spans);
}

#[test]
fn test_scan_empty_input() {
    let scanned = scan_frames(Cursor::new(Vec::new()), Codec::Gzip).unwrap();
    assert!(scanned.is_empty());
}

#[test]
fn test_scan_rejects_garbage() {
    let result = scan_frames(Cursor::new(b"this is not compressed".to_vec()), Codec::Gzip);
    assert!(matches!(result, Err(GzipiError::Codec(_))));
}

#[test]
fn test_scan_members_larger_than_read_chunk() {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    // Members whose frames span multiple scanner reads still come back
    // intact. Incompressible payloads keep the frames large.
    let mut rng = StdRng::seed_from_u64(7);
    let mut writer = ArchiveWriter::new(Vec::new(), Codec::Gzip);
    let mut spans = Vec::new();
    for _ in 0..3 {
        let mut big = vec![0u8; 600 * 1024];
        rng.fill(&mut big[..]);
        big.retain(|&b| b != b'\n');

        writer.begin_member().unwrap();
        writer.write_record(&big).unwrap();
        let span = writer.finish_member().unwrap();
        assert!(span.length > 256 * 1024);
        spans.push((span.offset, span.length));
    }
    let (archive, _) = writer.finish().unwrap();

    let scanned = scan_frames(Cursor::new(archive), Codec::Gzip).unwrap();
    assert_eq!(scanned, spans);
}

// =============================================================================
// Transparent Reader Tests
// =============================================================================

#[test]
fn test_transparent_reader_gzip() {
    let mut encoder = StreamEncoder::new(Vec::new(), Codec::Gzip).unwrap();
    std::io::Write::write_all(&mut encoder, b"payload\n").unwrap();
    let compressed = encoder.finish().unwrap();

    let mut reader = transparent_reader(Cursor::new(compressed)).unwrap();
    let mut payload = Vec::new();
    reader.read_to_end(&mut payload).unwrap();
    assert_eq!(payload, b"payload\n");
}

#[test]
fn test_transparent_reader_zstd() {
    let mut encoder = StreamEncoder::new(Vec::new(), Codec::Zstd).unwrap();
    std::io::Write::write_all(&mut encoder, b"payload\n").unwrap();
    let compressed = encoder.finish().unwrap();

    let mut reader = transparent_reader(Cursor::new(compressed)).unwrap();
    let mut payload = Vec::new();
    reader.read_to_end(&mut payload).unwrap();
    assert_eq!(payload, b"payload\n");
}

#[test]
fn test_transparent_reader_plain_passthrough() {
    let mut reader = transparent_reader(Cursor::new(b"plain text\n".to_vec())).unwrap();
    let mut payload = Vec::new();
    reader.read_to_end(&mut payload).unwrap();
    assert_eq!(payload, b"plain text\n");
}

#[test]
fn test_transparent_reader_short_input() {
    // Shorter than any magic sequence.
    let mut reader = transparent_reader(Cursor::new(b"ab".to_vec())).unwrap();
    let mut payload = Vec::new();
    reader.read_to_end(&mut payload).unwrap();
    assert_eq!(payload, b"ab");
}
