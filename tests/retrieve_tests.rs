//! Tests for the retriever
//!
//! These tests verify:
//! - Bulk retrieval returns exactly the requested records
//! - Unknown keys produce no output and no error
//! - Output follows member order, archive order within a member
//! - Corrupted members are skipped and counted
//! - Single-key search

use std::io::Cursor;

use gzipi::codec::Codec;
use gzipi::extract::RecordFormat;
use gzipi::index::{IndexBuilder, IndexSearcher};
use gzipi::repack::Repacker;
use gzipi::retrieve::Retriever;
use gzipi::Config;

// =============================================================================
// Helper Functions
// =============================================================================

/// Repack `input` and build its final index; returns (archive, index)
fn pack(input: &[u8], format: RecordFormat, member_records: usize) -> (Vec<u8>, Vec<u8>) {
    let config = Config::builder()
        .format(format)
        .member_records(member_records)
        .build();

    let mut archive = Vec::new();
    let mut raw = Vec::new();
    Repacker::new(&config)
        .repack(Cursor::new(input.to_vec()), &mut archive, &mut raw, config.codec)
        .unwrap();

    let mut index = Vec::new();
    IndexBuilder::new(config.codec)
        .build(Cursor::new(raw), &mut index)
        .unwrap();
    (archive, index)
}

fn retriever(archive: &[u8], index: &[u8], format: RecordFormat) -> Retriever<Cursor<Vec<u8>>> {
    let searcher = IndexSearcher::open(Cursor::new(index.to_vec()), Codec::Gzip, 64 * 1024).unwrap();
    Retriever::new(Cursor::new(archive.to_vec()), Codec::Gzip, searcher, format)
}

// =============================================================================
// Bulk Retrieval Tests
// =============================================================================

#[test]
fn test_retrieve_selected_keys() {
    let input = b"{\"id\":\"b\",\"v\":1}\n{\"id\":\"a\",\"v\":2}\n{\"id\":\"c\",\"v\":3}\n";
    let format = RecordFormat::Json { field: "id".to_string() };
    let (archive, index) = pack(input, format.clone(), 2);

    let mut out = Vec::new();
    let stats = retriever(&archive, &index, format)
        .retrieve(Cursor::new(b"a\nc\n".to_vec()), &mut out)
        .unwrap();

    assert_eq!(stats.matched, 2);
    assert_eq!(stats.missing, 0);
    assert_eq!(out, b"{\"id\":\"a\",\"v\":2}\n{\"id\":\"c\",\"v\":3}\n");
}

#[test]
fn test_retrieve_all_records_round_trip() {
    let records: Vec<String> = (0..100).map(|i| format!("row{:03}", (i * 37) % 100)).collect();
    let input: Vec<u8> = records.iter().flat_map(|r| format!("{}\n", r).into_bytes()).collect();
    let (archive, index) = pack(&input, RecordFormat::Raw, 8);

    let keys: Vec<u8> = records.iter().flat_map(|r| format!("{}\n", r).into_bytes()).collect();
    let mut out = Vec::new();
    let stats = retriever(&archive, &index, RecordFormat::Raw)
        .retrieve(Cursor::new(keys), &mut out)
        .unwrap();

    assert_eq!(stats.matched, 100);
    assert_eq!(stats.missing, 0);

    // Same multiset of records, permuted only within members.
    let mut got: Vec<&[u8]> = out.split_inclusive(|&b| b == b'\n').collect();
    let mut expected: Vec<Vec<u8>> =
        records.iter().map(|r| format!("{}\n", r).into_bytes()).collect();
    got.sort();
    expected.sort();
    assert_eq!(got, expected);
}

#[test]
fn test_retrieve_unknown_keys_is_not_an_error() {
    let (archive, index) = pack(b"a\nb\n", RecordFormat::Raw, 10);

    let mut out = Vec::new();
    let stats = retriever(&archive, &index, RecordFormat::Raw)
        .retrieve(Cursor::new(b"nope\nmissing\n".to_vec()), &mut out)
        .unwrap();

    assert!(out.is_empty());
    assert_eq!(stats.matched, 0);
    assert_eq!(stats.missing, 2);
    assert!(stats.is_clean());
}

#[test]
fn test_retrieve_output_in_member_order() {
    // Keys requested in reverse order still come back in archive order.
    let input = b"a\nb\nc\nd\ne\nf\n";
    let (archive, index) = pack(input, RecordFormat::Raw, 2);

    let mut out = Vec::new();
    retriever(&archive, &index, RecordFormat::Raw)
        .retrieve(Cursor::new(b"f\nc\na\n".to_vec()), &mut out)
        .unwrap();
    assert_eq!(out, b"a\nc\nf\n");
}

#[test]
fn test_retrieve_duplicate_key_returns_all_occurrences() {
    // Duplicate keys collapse to one index entry covering the member; every
    // matching record in that member is returned.
    let (archive, index) = pack(b"k,1\nk,2\nq,3\n", RecordFormat::Csv { column: 0, delimiter: b',' }, 10);

    let mut out = Vec::new();
    let stats = retriever(&archive, &index, RecordFormat::Csv { column: 0, delimiter: b',' })
        .retrieve(Cursor::new(b"k\n".to_vec()), &mut out)
        .unwrap();
    assert_eq!(stats.matched, 2);
    assert_eq!(out, b"k,1\nk,2\n");
}

#[test]
fn test_retrieve_reads_each_member_once() {
    // Many keys hitting one member resolve from a single member read; the
    // observable contract is the output and stats.
    let input: Vec<u8> = (0..20).flat_map(|i| format!("x{:02}\n", i).into_bytes()).collect();
    let (archive, index) = pack(&input, RecordFormat::Raw, 20);

    let keys: Vec<u8> = (0..20).flat_map(|i| format!("x{:02}\n", i).into_bytes()).collect();
    let mut out = Vec::new();
    let stats = retriever(&archive, &index, RecordFormat::Raw)
        .retrieve(Cursor::new(keys), &mut out)
        .unwrap();
    assert_eq!(stats.matched, 20);
    assert_eq!(out, input);
}

// =============================================================================
// Corruption Handling Tests
// =============================================================================

#[test]
fn test_corrupted_member_is_skipped_and_counted() {
    // Three members: a|b, c|d, e|f. Corrupt the middle one.
    let input = b"a\nb\nc\nd\ne\nf\n";
    let (mut archive, index) = pack(input, RecordFormat::Raw, 2);

    let spans = gzipi::codec::scan_frames(Cursor::new(archive.clone()), Codec::Gzip).unwrap();
    assert_eq!(spans.len(), 3);
    let (offset, length) = spans[1];
    archive[(offset + length / 2) as usize] ^= 0xff;

    let mut out = Vec::new();
    let stats = retriever(&archive, &index, RecordFormat::Raw)
        .retrieve(Cursor::new(b"a\nc\ne\n".to_vec()), &mut out)
        .unwrap();

    assert_eq!(stats.codec_errors, 1);
    assert!(!stats.is_clean());
    assert_eq!(stats.matched, 2);
    assert_eq!(out, b"a\ne\n", "good members drain around the bad one");
}

// =============================================================================
// Single-Key Search Tests
// =============================================================================

#[test]
fn test_search_present_key() {
    let input = b"{\"id\":\"b\",\"v\":1}\n{\"id\":\"a\",\"v\":2}\n";
    let format = RecordFormat::Json { field: "id".to_string() };
    let (archive, index) = pack(input, format.clone(), 10);

    let record = retriever(&archive, &index, format).search(b"a").unwrap();
    assert_eq!(record, Some(b"{\"id\":\"a\",\"v\":2}\n".to_vec()));
}

#[test]
fn test_search_absent_key() {
    let (archive, index) = pack(b"a\nb\n", RecordFormat::Raw, 10);
    let record = retriever(&archive, &index, RecordFormat::Raw).search(b"zz").unwrap();
    assert_eq!(record, None);
}

#[test]
fn test_search_on_empty_archive() {
    let (archive, index) = pack(b"", RecordFormat::Raw, 10);
    assert!(archive.is_empty());

    let record = retriever(&archive, &index, RecordFormat::Raw).search(b"a").unwrap();
    assert_eq!(record, None);
}
