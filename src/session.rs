//! Handshake state machine.
//!
//! One session per process lifetime: read the start tag, load and attach the
//! iterator object, report both links, read the end tag. Every channel
//! operation blocks; the alternating reads and writes are the only ordering
//! barrier between this process and the kernel. Loader teardown runs on every
//! path, success or failure.

use std::io::{self, Read, Write};

use axerrno::LinuxError;

use crate::channel;
use crate::loader::{self, IterLoader, Link};
use crate::wire::{self, LinkDesc};

/// Names the kernel pins the two links under, in mandatory send order:
/// the map-entry iterator first, the loaded-program iterator second.
/// The kernel correlates records by name and position, so the order must be
/// reproducible across runs.
pub const LINK_NAMES: [&str; 2] = ["maps.debug", "progs.debug"];

/// Phases of the preload exchange, in the order a successful run visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Blocked on the kernel's opening tag.
    AwaitingStart,
    /// Driving the loader's open-and-load.
    Loading,
    /// Activating the loaded programs.
    Attaching,
    /// Writing the link descriptor records.
    SendingLinks,
    /// Blocked until the kernel has pinned the links.
    AwaitingEnd,
    /// Exchange complete.
    Done,
}

/// Error types for a failed exchange. Every variant ends the run the same
/// way: diagnostic on the console, teardown, exit status 1.
#[derive(Debug)]
pub enum Error {
    /// First inbound tag was not the start tag.
    BadStartTag(u32),
    /// Final inbound tag was not the end tag.
    BadEndTag(u32),
    /// An inbound read failed or delivered fewer bytes than a tag.
    ChannelRead(io::Error),
    /// The loader could not construct or activate the object.
    Loader(loader::Error),
    /// The object did not yield one link per expected name.
    BadLinkCount(usize),
    /// Reporting a link to the kernel failed.
    Report(ReportError),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BadStartTag(tag) => write!(f, "bad start magic {tag:#x}"),
            Self::BadEndTag(tag) => write!(f, "bad final magic {tag:#x}"),
            Self::ChannelRead(err) => write!(f, "control channel read failed: {err}"),
            Self::Loader(err) => write!(f, "{err}"),
            Self::BadLinkCount(n) => {
                write!(f, "attach produced {n} links, expected {}", LINK_NAMES.len())
            }
            Self::Report(err) => write!(f, "{err}"),
        }
    }
}

impl core::error::Error for Error {}

/// Error types for the link report operation.
#[derive(Debug)]
pub enum ReportError {
    /// The info query on the link handle failed.
    Info(loader::Error),
    /// The name does not fit the record.
    Encode(wire::Error),
    /// The outbound channel broke or took a short write.
    Transport(io::Error),
}

impl ReportError {
    /// Negative errno identifying which precondition or call failed, the
    /// form the report operation's result is defined in.
    pub fn errno(&self) -> i32 {
        match self {
            Self::Info(err) => err.errno(),
            Self::Encode(wire::Error::NameTooLong(_)) => -(LinuxError::E2BIG as i32),
            Self::Transport(_) => -(LinuxError::EPIPE as i32),
        }
    }
}

impl core::fmt::Display for ReportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Info(err) => write!(f, "link report: {err}"),
            Self::Encode(err) => write!(f, "link report: {err}"),
            Self::Transport(err) => write!(f, "link report: {err}"),
        }
    }
}

impl core::error::Error for ReportError {}

/// One run of the preload exchange over a channel pair and a loader.
///
/// Generic over the streams so the protocol can run against in-memory pipes
/// in tests, and over the loader per the capability seam.
pub struct Session<R, W, L> {
    from_kernel: R,
    to_kernel: W,
    loader: L,
    phase: Phase,
}

impl<R: Read, W: Write, L: IterLoader> Session<R, W, L> {
    pub fn new(from_kernel: R, to_kernel: W, loader: L) -> Self {
        Self { from_kernel, to_kernel, loader, phase: Phase::AwaitingStart }
    }

    /// Drive the whole exchange.
    ///
    /// Teardown is unconditional: whatever the loader acquired is released
    /// before this returns, on failure paths included. Once the records are
    /// out they stay out; a bad end tag fails the run without any rollback.
    pub fn run(mut self) -> Result<(), Error> {
        let result = self.exchange();
        self.loader.release();
        if let Err(err) = &result {
            log::error!("preload failed in {:?}: {err}", self.phase);
        }
        result
    }

    fn exchange(&mut self) -> Result<(), Error> {
        let tag = channel::read_tag(&mut self.from_kernel).map_err(Error::ChannelRead)?;
        if tag != wire::START_MAGIC {
            // No reply on a bad opening: the kernel side owns detecting a
            // helper that never speaks.
            return Err(Error::BadStartTag(tag));
        }

        self.enter(Phase::Loading);
        if let Err(err) = self.loader.open_and_load() {
            // The object ships little-endian; on a big-endian kernel the
            // loader cannot convert and this is where that surfaces.
            log::warn!("failed load could be due to wrong endianness");
            return Err(Error::Loader(err));
        }

        self.enter(Phase::Attaching);
        let links = self.loader.attach_all().map_err(Error::Loader)?;
        if links.len() != LINK_NAMES.len() {
            return Err(Error::BadLinkCount(links.len()));
        }

        self.enter(Phase::SendingLinks);
        for (link, name) in links.into_iter().zip(LINK_NAMES) {
            self.send_link(link, name).map_err(Error::Report)?;
        }

        self.enter(Phase::AwaitingEnd);
        // The kernel pins the links before answering; this read is the
        // rendezvous that keeps the helper alive until then.
        let tag = channel::read_tag(&mut self.from_kernel).map_err(Error::ChannelRead)?;
        if tag != wire::END_MAGIC {
            return Err(Error::BadEndTag(tag));
        }

        self.enter(Phase::Done);
        Ok(())
    }

    /// Report one link: query its id, encode the record, transmit it.
    ///
    /// The name is validated against the record capacity before any byte is
    /// written, so a partial record never reaches the channel.
    pub fn send_link(&mut self, link: Link, name: &str) -> Result<(), ReportError> {
        let info = self.loader.link_info(link).map_err(ReportError::Info)?;
        let desc = LinkDesc { link_id: info.id, name: name.to_owned() };
        let record = wire::encode(&desc).map_err(ReportError::Encode)?;
        channel::write_record(&mut self.to_kernel, &record).map_err(ReportError::Transport)?;
        log::debug!("reported link {} as {name:?}", info.id);
        Ok(())
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        log::debug!("phase {phase:?}");
    }
}
