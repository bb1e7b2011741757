//! Minimal `bpf(2)` surface for the skeleton adapter.
//!
//! Each attribute struct covers only the leading fields the corresponding
//! command reads; the kernel accepts a shorter attribute than its own union
//! and treats the missing tail as zero. No libbpf-equivalent dependency is
//! involved anywhere on this path, matching the light-skeleton convention
//! the iterator object is generated for.

use std::io;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

// Command numbers from the kernel UAPI.
const BPF_MAP_CREATE: u32 = 0;
const BPF_MAP_UPDATE_ELEM: u32 = 2;
const BPF_PROG_LOAD: u32 = 5;
const BPF_PROG_RUN: u32 = 10;
const BPF_OBJ_GET_INFO_BY_FD: u32 = 15;
const BPF_LINK_CREATE: u32 = 28;

const BPF_MAP_TYPE_ARRAY: u32 = 2;
const BPF_PROG_TYPE_SYSCALL: u32 = 31;

/// Attach type activating an iterator program.
pub(crate) const BPF_TRACE_ITER: u32 = 28;

/// Loader programs must be sleepable.
const BPF_F_SLEEPABLE: u32 = 1 << 4;

fn bpf<T>(cmd: u32, attr: &mut T) -> io::Result<libc::c_long> {
    // SAFETY: attr is a zero-initialized repr(C) struct matching the head of
    // the kernel's attribute union for this command.
    let ret = unsafe {
        libc::syscall(
            libc::SYS_bpf,
            cmd as libc::c_long,
            attr as *mut T as *mut libc::c_void,
            size_of::<T>() as libc::c_ulong,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ret)
}

#[repr(C)]
#[derive(Default)]
#[allow(dead_code)]
struct MapCreateAttr {
    map_type: u32,
    key_size: u32,
    value_size: u32,
    max_entries: u32,
    map_flags: u32,
}

#[repr(C)]
#[derive(Default)]
#[allow(dead_code)]
struct MapElemAttr {
    map_fd: u32,
    _pad: u32,
    key: u64,
    value: u64,
    flags: u64,
}

#[repr(C)]
#[allow(dead_code)]
struct ProgLoadAttr {
    prog_type: u32,
    insn_cnt: u32,
    insns: u64,
    license: u64,
    log_level: u32,
    log_size: u32,
    log_buf: u64,
    kern_version: u32,
    prog_flags: u32,
    prog_name: [u8; 16],
    prog_ifindex: u32,
    expected_attach_type: u32,
    prog_btf_fd: u32,
    func_info_rec_size: u32,
    func_info: u64,
    func_info_cnt: u32,
    line_info_rec_size: u32,
    line_info: u64,
    line_info_cnt: u32,
    attach_btf_id: u32,
    attach_prog_fd: u32,
    core_relo_cnt: u32,
    fd_array: u64,
}

#[repr(C)]
#[derive(Default)]
#[allow(dead_code)]
struct ProgRunAttr {
    prog_fd: u32,
    retval: u32,
    data_size_in: u32,
    data_size_out: u32,
    data_in: u64,
    data_out: u64,
    repeat: u32,
    duration: u32,
    ctx_size_in: u32,
    ctx_size_out: u32,
    ctx_in: u64,
    ctx_out: u64,
}

#[repr(C)]
#[derive(Default)]
#[allow(dead_code)]
struct LinkCreateAttr {
    prog_fd: u32,
    target_fd: u32,
    attach_type: u32,
    flags: u32,
}

#[repr(C)]
#[derive(Default)]
struct ObjInfoAttr {
    bpf_fd: u32,
    info_len: u32,
    info: u64,
}

/// Create the single-entry array map the loader program reads its data from.
pub(crate) fn map_create(value_size: u32) -> io::Result<OwnedFd> {
    let mut attr = MapCreateAttr {
        map_type: BPF_MAP_TYPE_ARRAY,
        key_size: 4,
        value_size,
        max_entries: 1,
        map_flags: 0,
    };
    let fd = bpf(BPF_MAP_CREATE, &mut attr)?;
    // SAFETY: the kernel returned a fresh descriptor we now own.
    Ok(unsafe { OwnedFd::from_raw_fd(fd as RawFd) })
}

pub(crate) fn map_update(map: RawFd, key: u32, value: &[u8]) -> io::Result<()> {
    let mut attr = MapElemAttr {
        map_fd: map as u32,
        key: &key as *const u32 as u64,
        value: value.as_ptr() as u64,
        ..Default::default()
    };
    bpf(BPF_MAP_UPDATE_ELEM, &mut attr)?;
    Ok(())
}

/// Load the generated loader program (`BPF_PROG_TYPE_SYSCALL`), wiring the
/// skeleton data map into its fd array.
pub(crate) fn prog_load_loader(insns: &[u8], fd_array: &[RawFd]) -> io::Result<OwnedFd> {
    let license = c"Dual BSD/GPL";
    let mut name = [0u8; 16];
    name[.."__loader.prog".len()].copy_from_slice(b"__loader.prog");
    let mut attr = ProgLoadAttr {
        prog_type: BPF_PROG_TYPE_SYSCALL,
        insn_cnt: (insns.len() / 8) as u32,
        insns: insns.as_ptr() as u64,
        license: license.as_ptr() as u64,
        log_level: 0,
        log_size: 0,
        log_buf: 0,
        kern_version: 0,
        prog_flags: BPF_F_SLEEPABLE,
        prog_name: name,
        prog_ifindex: 0,
        expected_attach_type: 0,
        prog_btf_fd: 0,
        func_info_rec_size: 0,
        func_info: 0,
        func_info_cnt: 0,
        line_info_rec_size: 0,
        line_info: 0,
        line_info_cnt: 0,
        attach_btf_id: 0,
        attach_prog_fd: 0,
        core_relo_cnt: 0,
        fd_array: fd_array.as_ptr() as u64,
    };
    let fd = bpf(BPF_PROG_LOAD, &mut attr)?;
    // SAFETY: as in map_create.
    Ok(unsafe { OwnedFd::from_raw_fd(fd as RawFd) })
}

/// Execute the loader program once with the skeleton context as input.
pub(crate) fn prog_run(prog: RawFd, ctx: &mut [u8]) -> io::Result<()> {
    let mut attr = ProgRunAttr {
        prog_fd: prog as u32,
        ctx_size_in: ctx.len() as u32,
        ctx_in: ctx.as_mut_ptr() as u64,
        ..Default::default()
    };
    bpf(BPF_PROG_RUN, &mut attr)?;
    Ok(())
}

/// Activate an iterator program, producing a link descriptor.
pub(crate) fn link_create(prog: RawFd, target: RawFd, attach_type: u32) -> io::Result<OwnedFd> {
    let mut attr = LinkCreateAttr {
        prog_fd: prog as u32,
        target_fd: target as u32,
        attach_type,
        flags: 0,
    };
    let fd = bpf(BPF_LINK_CREATE, &mut attr)?;
    // SAFETY: as in map_create.
    Ok(unsafe { OwnedFd::from_raw_fd(fd as RawFd) })
}

/// Generic info-by-handle query shared across BPF object kinds.
///
/// Fills the caller's buffer and updates `info_len` in place with the number
/// of bytes the kernel actually wrote, mirroring the kernel facility's
/// in/out length convention.
pub fn obj_get_info_by_fd(fd: RawFd, info: &mut [u8], info_len: &mut u32) -> io::Result<()> {
    let mut attr = ObjInfoAttr {
        bpf_fd: fd as u32,
        info_len: (*info_len).min(info.len() as u32),
        info: info.as_mut_ptr() as u64,
    };
    bpf(BPF_OBJ_GET_INFO_BY_FD, &mut attr)?;
    *info_len = attr.info_len;
    Ok(())
}
