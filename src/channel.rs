//! Handshake channels and console redirection.
//!
//! The launching kernel hands over fd 0 as the inbound control channel and
//! fd 1 as the outbound one. Before anything can log, fd 1 is duplicated for
//! protocol traffic and fds 1/2 are re-pointed at `/dev/console`, so
//! diagnostics stay observable after stdout has been repurposed.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{FromRawFd, RawFd};

use crate::wire;

/// Inbound control channel, preassigned by the launcher.
pub const FROM_KERNEL_FD: RawFd = 0;

/// Conventional stdout slot the outbound channel is duplicated from.
pub const TO_KERNEL_FD: RawFd = 1;

/// The pair of unidirectional handshake streams, claimed from the launcher.
///
/// One reader and one writer role per stream; both are owned values threaded
/// through the session rather than ambient globals.
pub struct Channels {
    /// Kernel to helper: control tags.
    pub from_kernel: File,
    /// Helper to kernel: link descriptor records.
    pub to_kernel: File,
}

impl Channels {
    /// Claim the descriptors handed over by the kernel launcher.
    ///
    /// Duplicates fd 1 to keep the outbound pipe, then points fds 1 and 2 at
    /// the console. Must run exactly once, before the logger is installed.
    /// Failure here is fatal and silent toward the kernel: no handshake byte
    /// has been exchanged yet, so the launcher detects the dead helper on its
    /// own blocking read.
    pub fn from_launcher() -> io::Result<Self> {
        // SAFETY: raw fd plumbing on the launcher-provided descriptors; no
        // other code in this process has touched them yet.
        unsafe {
            let console = libc::open(
                c"/dev/console".as_ptr(),
                libc::O_WRONLY | libc::O_NOCTTY | libc::O_CLOEXEC,
            );
            if console < 0 {
                return Err(io::Error::last_os_error());
            }

            let to_kernel = libc::dup(TO_KERNEL_FD);
            if to_kernel < 0 {
                let err = io::Error::last_os_error();
                libc::close(console);
                return Err(err);
            }

            for slot in [1, 2] {
                if libc::dup2(console, slot) < 0 {
                    let err = io::Error::last_os_error();
                    libc::close(console);
                    libc::close(to_kernel);
                    return Err(err);
                }
            }
            libc::close(console);

            Ok(Self {
                from_kernel: File::from_raw_fd(FROM_KERNEL_FD),
                to_kernel: File::from_raw_fd(to_kernel),
            })
        }
    }
}

/// Read one control tag, requiring the full tag width.
///
/// The inbound channel blocks until the kernel writes; a channel that closes
/// or delivers fewer bytes than a tag surfaces as an error rather than a
/// garbage tag.
pub fn read_tag<R: Read>(from_kernel: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; wire::TAG_SIZE];
    from_kernel.read_exact(&mut buf)?;
    Ok(u32::from_ne_bytes(buf))
}

/// Transmit one encoded record with a single write call.
///
/// A transfer shorter than the record means the kernel side went away
/// mid-handshake; that is a broken channel, not a state to retry from.
pub fn write_record<W: Write>(to_kernel: &mut W, record: &[u8]) -> io::Result<()> {
    let n = to_kernel.write(record)?;
    if n != record.len() {
        return Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            format!("short write on link channel: {n} of {} bytes", record.len()),
        ));
    }
    to_kernel.flush()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_tag_exact() {
        let mut input: &[u8] = &0x5555u32.to_ne_bytes();
        assert_eq!(read_tag(&mut input).unwrap(), 0x5555);
    }

    #[test]
    fn test_read_tag_short() {
        let mut input: &[u8] = &[0x55, 0x55];
        let err = read_tag(&mut input).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_write_record_full() {
        let mut out = Vec::new();
        write_record(&mut out, &[1, 2, 3, 4]).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }
}
