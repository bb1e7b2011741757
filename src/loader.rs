//! Loader capability seam.
//!
//! The facility that loads the iterator object into the kernel and activates
//! its programs is external to the handshake: the session only ever drives it
//! through this trait and queries link metadata back. That keeps the protocol
//! logic testable against [`MockLoader`] without any kernel object loading.

use std::io;

use axerrno::LinuxError;

/// Opaque handle to one attached link, valid for the loader that produced it.
///
/// The session never interprets the handle; it only passes it back into
/// [`IterLoader::link_info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link(pub(crate) usize);

/// Metadata reported for a link handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkInfo {
    /// Kernel-assigned link id, the value the kernel pins by.
    pub id: u32,
    /// Id of the program the link activates.
    pub prog_id: u32,
}

/// Error types for loader operations.
#[derive(Debug)]
pub enum Error {
    /// This build carries no skeleton blobs to load.
    SkeletonUnavailable,
    /// The kernel rejected the program object.
    LoadFailed(io::Error),
    /// Activating a program in the loaded object failed.
    AttachFailed(io::Error),
    /// The metadata query on a link handle failed.
    InfoQueryFailed(io::Error),
    /// A handle this loader never produced, or produced and then released.
    UnknownLink,
}

impl Error {
    /// Negative errno view of the failure.
    pub fn errno(&self) -> i32 {
        let fallback = |err: &io::Error| err.raw_os_error().unwrap_or(LinuxError::EINVAL as i32);
        let errno = match self {
            Self::SkeletonUnavailable => LinuxError::ENOENT as i32,
            Self::LoadFailed(err) | Self::AttachFailed(err) | Self::InfoQueryFailed(err) => {
                fallback(err)
            }
            Self::UnknownLink => LinuxError::EBADF as i32,
        };
        -errno
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::SkeletonUnavailable => {
                write!(f, "no embedded skeleton (build without precompiled-ebpf)")
            }
            Self::LoadFailed(err) => write!(f, "object load failed: {err}"),
            Self::AttachFailed(err) => write!(f, "program attach failed: {err}"),
            Self::InfoQueryFailed(err) => write!(f, "link info query failed: {err}"),
            Self::UnknownLink => write!(f, "unknown link handle"),
        }
    }
}

impl core::error::Error for Error {}

/// The external loader capability the session depends on.
pub trait IterLoader {
    /// Open the fixed iterator object and load it into the kernel.
    fn open_and_load(&mut self) -> Result<(), Error>;

    /// Activate every program in the loaded object, producing one link each.
    fn attach_all(&mut self) -> Result<Vec<Link>, Error>;

    /// Query a link's metadata through the generic info-by-handle facility.
    fn link_info(&self, link: Link) -> Result<LinkInfo, Error>;

    /// Release the object and all links.
    ///
    /// Runs on every exit path, so it must be idempotent and safe on a
    /// never-loaded or partially constructed object.
    fn release(&mut self);
}

impl<L: IterLoader + ?Sized> IterLoader for &mut L {
    fn open_and_load(&mut self) -> Result<(), Error> {
        (**self).open_and_load()
    }

    fn attach_all(&mut self) -> Result<Vec<Link>, Error> {
        (**self).attach_all()
    }

    fn link_info(&self, link: Link) -> Result<LinkInfo, Error> {
        (**self).link_info(link)
    }

    fn release(&mut self) {
        (**self).release()
    }
}

// =============================================================================
// Mock Implementation (protocol tests without a kernel)
// =============================================================================

/// In-memory loader with scriptable failure points and canned link ids.
#[derive(Debug, Default)]
pub struct MockLoader {
    link_ids: Vec<u32>,
    fail_load: bool,
    fail_attach: bool,
    /// Whether the object is currently loaded.
    pub loaded: bool,
    /// Whether attach has produced links.
    pub attached: bool,
    /// Number of open-and-load calls observed.
    pub load_calls: usize,
    /// Number of attach calls observed.
    pub attach_calls: usize,
    /// Number of release calls observed, for idempotence checks.
    pub release_calls: usize,
}

impl MockLoader {
    /// Healthy loader reporting the given link ids in attach order.
    pub fn new(link_ids: &[u32]) -> Self {
        Self { link_ids: link_ids.to_vec(), ..Self::default() }
    }

    /// Loader whose `open_and_load` fails.
    pub fn failing_load() -> Self {
        Self { fail_load: true, ..Self::default() }
    }

    /// Loader that loads but whose `attach_all` fails.
    pub fn failing_attach() -> Self {
        Self { fail_attach: true, ..Self::default() }
    }
}

impl IterLoader for MockLoader {
    fn open_and_load(&mut self) -> Result<(), Error> {
        self.load_calls += 1;
        if self.fail_load {
            return Err(Error::LoadFailed(io::Error::from_raw_os_error(libc::EINVAL)));
        }
        self.loaded = true;
        Ok(())
    }

    fn attach_all(&mut self) -> Result<Vec<Link>, Error> {
        self.attach_calls += 1;
        if !self.loaded || self.fail_attach {
            return Err(Error::AttachFailed(io::Error::from_raw_os_error(libc::EINVAL)));
        }
        self.attached = true;
        Ok((0..self.link_ids.len()).map(Link).collect())
    }

    fn link_info(&self, link: Link) -> Result<LinkInfo, Error> {
        if !self.attached {
            return Err(Error::UnknownLink);
        }
        let id = *self.link_ids.get(link.0).ok_or(Error::UnknownLink)?;
        Ok(LinkInfo { id, prog_id: id + 100 })
    }

    fn release(&mut self) {
        self.release_calls += 1;
        self.loaded = false;
        self.attached = false;
    }
}
