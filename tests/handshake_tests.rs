//! Integration tests for the preload handshake.
//!
//! Runs the session over in-memory channels with the mock loader, covering
//! the full exchange, every fault path, and teardown behavior.

use bpf_preload::loader::{IterLoader, MockLoader};
use bpf_preload::session::{Error, Session};
use bpf_preload::wire;

/// Inbound control stream carrying the given tags.
fn tags(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

fn record_at(out: &[u8], index: usize) -> wire::LinkDesc {
    let start = index * wire::RECORD_SIZE;
    let mut record = [0u8; wire::RECORD_SIZE];
    record.copy_from_slice(&out[start..start + wire::RECORD_SIZE]);
    wire::decode(&record)
}

// =============================================================================
// Full Exchange
// =============================================================================

#[test]
fn test_happy_path_sends_both_records() {
    let input = tags(&[wire::START_MAGIC, wire::END_MAGIC]);
    let mut out = Vec::new();
    let mut loader = MockLoader::new(&[7, 8]);

    Session::new(input.as_slice(), &mut out, &mut loader).run().unwrap();

    assert_eq!(out.len(), 2 * wire::RECORD_SIZE);
    let first = record_at(&out, 0);
    let second = record_at(&out, 1);
    assert_eq!(first.name, "maps.debug");
    assert_eq!(first.link_id, 7);
    assert_eq!(second.name, "progs.debug");
    assert_eq!(second.link_id, 8);
    assert_eq!(loader.release_calls, 1);
}

#[test]
fn test_happy_path_consumes_exact_tags() {
    // Exactly two tags, nothing extra: the hardened reads take full tags
    // and nothing beyond them.
    let input = tags(&[wire::START_MAGIC, wire::END_MAGIC]);
    let mut out = Vec::new();
    let mut loader = MockLoader::new(&[1, 2]);

    let result = Session::new(input.as_slice(), &mut out, &mut loader).run();
    assert!(result.is_ok());
}

// =============================================================================
// Protocol Faults
// =============================================================================

#[test]
fn test_bad_start_tag_writes_nothing() {
    let input = tags(&[0xdead]);
    let mut out = Vec::new();
    let mut loader = MockLoader::new(&[7, 8]);

    let err = Session::new(input.as_slice(), &mut out, &mut loader).run().unwrap_err();

    assert!(matches!(err, Error::BadStartTag(0xdead)));
    assert!(out.is_empty());
    assert_eq!(loader.load_calls, 0);
}

#[test]
fn test_bad_end_tag_fails_after_records_sent() {
    let input = tags(&[wire::START_MAGIC, 0x1234]);
    let mut out = Vec::new();
    let mut loader = MockLoader::new(&[7, 8]);

    let err = Session::new(input.as_slice(), &mut out, &mut loader).run().unwrap_err();

    assert!(matches!(err, Error::BadEndTag(0x1234)));
    // Records already sent stay sent; there is no rollback.
    assert_eq!(out.len(), 2 * wire::RECORD_SIZE);
    assert_eq!(loader.release_calls, 1);
}

#[test]
fn test_short_read_on_start_is_a_fault() {
    let input = [0x55u8, 0x55];
    let mut out = Vec::new();
    let mut loader = MockLoader::new(&[7, 8]);

    let err = Session::new(&input[..], &mut out, &mut loader).run().unwrap_err();

    assert!(matches!(err, Error::ChannelRead(_)));
    assert!(out.is_empty());
    assert_eq!(loader.load_calls, 0);
}

#[test]
fn test_short_read_on_end_is_a_fault() {
    let mut input = tags(&[wire::START_MAGIC]);
    input.extend_from_slice(&[0xaa, 0xaa]);
    let mut out = Vec::new();
    let mut loader = MockLoader::new(&[7, 8]);

    let err = Session::new(input.as_slice(), &mut out, &mut loader).run().unwrap_err();

    assert!(matches!(err, Error::ChannelRead(_)));
    assert_eq!(out.len(), 2 * wire::RECORD_SIZE);
    assert_eq!(loader.release_calls, 1);
}

// =============================================================================
// Loader Faults
// =============================================================================

#[test]
fn test_load_failure_skips_attach() {
    let input = tags(&[wire::START_MAGIC, wire::END_MAGIC]);
    let mut out = Vec::new();
    let mut loader = MockLoader::failing_load();

    let err = Session::new(input.as_slice(), &mut out, &mut loader).run().unwrap_err();

    assert!(matches!(err, Error::Loader(_)));
    assert_eq!(loader.attach_calls, 0);
    assert!(out.is_empty());
    // Nothing was loaded; teardown still ran and had nothing to do.
    assert_eq!(loader.release_calls, 1);
}

#[test]
fn test_attach_failure_releases_loaded_object() {
    let input = tags(&[wire::START_MAGIC, wire::END_MAGIC]);
    let mut out = Vec::new();
    let mut loader = MockLoader::failing_attach();

    let err = Session::new(input.as_slice(), &mut out, &mut loader).run().unwrap_err();

    assert!(matches!(err, Error::Loader(_)));
    assert_eq!(loader.load_calls, 1);
    assert!(out.is_empty());
    assert_eq!(loader.release_calls, 1);
}

#[test]
fn test_wrong_link_count_sends_nothing() {
    let input = tags(&[wire::START_MAGIC, wire::END_MAGIC]);
    let mut out = Vec::new();
    let mut loader = MockLoader::new(&[7]);

    let err = Session::new(input.as_slice(), &mut out, &mut loader).run().unwrap_err();

    assert!(matches!(err, Error::BadLinkCount(1)));
    assert!(out.is_empty());
    assert_eq!(loader.release_calls, 1);
}

// =============================================================================
// Teardown
// =============================================================================

#[test]
fn test_release_is_idempotent() {
    let mut loader = MockLoader::new(&[7, 8]);

    // Release without ever loading.
    loader.release();
    assert_eq!(loader.release_calls, 1);

    loader.open_and_load().unwrap();
    loader.attach_all().unwrap();
    loader.release();
    loader.release();
    assert_eq!(loader.release_calls, 3);
    assert!(!loader.loaded);
}
