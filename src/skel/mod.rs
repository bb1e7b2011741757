//! Real loader adapter over the light-skeleton convention.
//!
//! The iterator object ships as a generated skeleton: a small
//! `BPF_PROG_TYPE_SYSCALL` loader program plus an opaque data blob. Loading
//! means running that program once inside the kernel; it performs the actual
//! object loading on our behalf and deposits the resulting iterator program
//! descriptors in the skeleton context. This adapter drives that sequence
//! through the raw `bpf(2)` surface and exposes it behind
//! [`IterLoader`](crate::loader::IterLoader).

mod bytecode;
pub mod sys;

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use crate::loader::{Error, IterLoader, Link, LinkInfo};

/// Loader backed by the embedded skeleton and the `bpf(2)` syscall.
#[derive(Debug, Default)]
pub struct SysLoader {
    progs: Vec<OwnedFd>,
    links: Vec<OwnedFd>,
}

impl SysLoader {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_prog_fd(ctx: &[u8], offset: usize) -> Result<OwnedFd, Error> {
        let bytes = ctx
            .get(offset..offset + 4)
            .ok_or_else(|| Error::LoadFailed(io::Error::from_raw_os_error(libc::EINVAL)))?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        let fd = i32::from_ne_bytes(raw);
        if fd <= 0 {
            return Err(Error::LoadFailed(io::Error::from_raw_os_error(libc::EINVAL)));
        }
        // SAFETY: the loader program left this descriptor open for us; the
        // context is read exactly once per offset.
        Ok(unsafe { OwnedFd::from_raw_fd(fd as RawFd) })
    }
}

impl IterLoader for SysLoader {
    fn open_and_load(&mut self) -> Result<(), Error> {
        if bytecode::LOADER_INSNS.is_empty() {
            return Err(Error::SkeletonUnavailable);
        }

        let data_map = sys::map_create(bytecode::SKEL_DATA.len() as u32)
            .map_err(Error::LoadFailed)?;
        sys::map_update(data_map.as_raw_fd(), 0, bytecode::SKEL_DATA)
            .map_err(Error::LoadFailed)?;

        let fd_array = [data_map.as_raw_fd()];
        let loader_prog = sys::prog_load_loader(bytecode::LOADER_INSNS, &fd_array)
            .map_err(Error::LoadFailed)?;

        let mut ctx = vec![0u8; bytecode::CTX_SIZE];
        // Leading field of the loader context is its own size.
        if ctx.len() >= 4 {
            ctx[..4].copy_from_slice(&(bytecode::CTX_SIZE as u32).to_ne_bytes());
        }
        sys::prog_run(loader_prog.as_raw_fd(), &mut ctx).map_err(Error::LoadFailed)?;

        for offset in bytecode::PROG_FD_OFFSETS {
            let prog = Self::take_prog_fd(&ctx, offset)?;
            self.progs.push(prog);
        }
        log::debug!("skeleton loaded, {} iterator programs", self.progs.len());
        // data_map and loader_prog close here; the kernel-side object stays
        // alive through the iterator program descriptors.
        Ok(())
    }

    fn attach_all(&mut self) -> Result<Vec<Link>, Error> {
        if self.progs.is_empty() {
            return Err(Error::AttachFailed(io::Error::from_raw_os_error(libc::ENOENT)));
        }
        for prog in &self.progs {
            let link = sys::link_create(prog.as_raw_fd(), 0, sys::BPF_TRACE_ITER)
                .map_err(Error::AttachFailed)?;
            self.links.push(link);
        }
        Ok((0..self.links.len()).map(Link).collect())
    }

    fn link_info(&self, link: Link) -> Result<LinkInfo, Error> {
        let fd = self.links.get(link.0).ok_or(Error::UnknownLink)?;

        // struct bpf_link_info leads with type, id, prog_id.
        let mut info = [0u8; 64];
        let mut info_len = info.len() as u32;
        sys::obj_get_info_by_fd(fd.as_raw_fd(), &mut info, &mut info_len)
            .map_err(Error::InfoQueryFailed)?;

        let field = |offset: usize| {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&info[offset..offset + 4]);
            u32::from_ne_bytes(raw)
        };
        Ok(LinkInfo { id: field(4), prog_id: field(8) })
    }

    fn release(&mut self) {
        // Closing the descriptors drops the kernel's last userspace
        // references; pinned links survive on the kernel side.
        self.links.clear();
        self.progs.clear();
    }
}
