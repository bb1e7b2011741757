//! Generated light-skeleton artifact for the iterator object.
//!
//! These are embedded at compile time from `target/bpf/`, where the BPF
//! toolchain drops them (`bpftool gen skeleton -L` equivalent): the
//! instructions of the in-kernel loader program, the skeleton context blob it
//! consumes, and the byte offsets at which it deposits the two iterator
//! program descriptors. Without the `precompiled-ebpf` feature the arrays are
//! empty and the sys loader reports the skeleton as unavailable.

#[cfg(feature = "precompiled-ebpf")]
include!("../../target/bpf/iterators_skel.rs");

// Fallback when the generated skeleton is not available.
#[cfg(not(feature = "precompiled-ebpf"))]
pub const LOADER_INSNS: &[u8] = &[];
#[cfg(not(feature = "precompiled-ebpf"))]
pub const SKEL_DATA: &[u8] = &[];
#[cfg(not(feature = "precompiled-ebpf"))]
pub const CTX_SIZE: usize = 0;
#[cfg(not(feature = "precompiled-ebpf"))]
pub const PROG_FD_OFFSETS: [usize; 2] = [0, 0];
