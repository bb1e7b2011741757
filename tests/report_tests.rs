//! Integration tests for the link report operation.
//!
//! Exercises the query/validate/encode/transmit path in isolation: record
//! well-formedness, the name capacity boundary, the errno view of each
//! fault, and the short-write transport fault.

use std::io::{self, Write};

use bpf_preload::loader::{IterLoader, MockLoader};
use bpf_preload::session::{Error, ReportError, Session};
use bpf_preload::wire;

/// Outbound channel that accepts one byte less than asked, emulating a
/// kernel reader that went away mid-record.
struct ShortWriter;

impl Write for ShortWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len().saturating_sub(1))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn attached_loader() -> (MockLoader, Vec<bpf_preload::loader::Link>) {
    let mut loader = MockLoader::new(&[42, 43]);
    loader.open_and_load().unwrap();
    let links = loader.attach_all().unwrap();
    (loader, links)
}

#[test]
fn test_report_writes_one_well_formed_record() {
    let (mut loader, links) = attached_loader();
    let mut out = Vec::new();
    let input: &[u8] = &[];
    let mut session = Session::new(input, &mut out, &mut loader);

    session.send_link(links[0], "maps.debug").unwrap();
    drop(session);

    assert_eq!(out.len(), wire::RECORD_SIZE);
    let mut record = [0u8; wire::RECORD_SIZE];
    record.copy_from_slice(&out);
    let desc = wire::decode(&record);
    assert_eq!(desc.link_id, 42);
    assert_eq!(desc.name, "maps.debug");
    // Terminator inside the name field.
    assert_eq!(out["maps.debug".len()], 0);
}

#[test]
fn test_oversized_name_fails_before_any_write() {
    let (mut loader, links) = attached_loader();
    let mut out = Vec::new();
    let input: &[u8] = &[];
    let mut session = Session::new(input, &mut out, &mut loader);

    let name = "x".repeat(wire::LINK_NAME_CAP);
    let err = session.send_link(links[0], &name).unwrap_err();
    drop(session);

    assert!(matches!(err, ReportError::Encode(wire::Error::NameTooLong(_))));
    assert_eq!(err.errno(), -libc::E2BIG);
    assert!(out.is_empty());
}

#[test]
fn test_name_at_capacity_minus_one_is_accepted() {
    let (mut loader, links) = attached_loader();
    let mut out = Vec::new();
    let input: &[u8] = &[];
    let mut session = Session::new(input, &mut out, &mut loader);

    let name = "y".repeat(wire::LINK_NAME_CAP - 1);
    session.send_link(links[0], &name).unwrap();
    drop(session);
    assert_eq!(out.len(), wire::RECORD_SIZE);
}

#[test]
fn test_info_query_failure_carries_loader_errno() {
    let (mut loader, links) = attached_loader();
    // Released links make the handle stale before the query.
    loader.release();
    let mut out = Vec::new();
    let input: &[u8] = &[];
    let mut session = Session::new(input, &mut out, &mut loader);

    let err = session.send_link(links[0], "maps.debug").unwrap_err();
    drop(session);

    assert!(matches!(err, ReportError::Info(_)));
    assert_eq!(err.errno(), -libc::EBADF);
    assert!(out.is_empty());
}

#[test]
fn test_short_write_is_a_pipe_fault() {
    let input: Vec<u8> = wire::START_MAGIC.to_ne_bytes().to_vec();
    let mut loader = MockLoader::new(&[7, 8]);

    let err = Session::new(input.as_slice(), ShortWriter, &mut loader).run().unwrap_err();

    match err {
        Error::Report(report) => {
            assert!(matches!(report, ReportError::Transport(_)));
            assert_eq!(report.errno(), -libc::EPIPE);
        }
        other => panic!("expected transport fault, got {other:?}"),
    }
    // Teardown ran even though the channel broke mid-report.
    assert_eq!(loader.release_calls, 1);
}
