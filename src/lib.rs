//! User-mode BPF preload helper.
//!
//! The kernel's BPF subsystem spawns this process to do privileged setup it
//! does not want in its own address space: load a fixed object containing two
//! introspection iterators (one dumping map entries, one dumping loaded
//! programs), attach both, and report the resulting link ids back so the
//! kernel can pin them as `maps.debug` and `progs.debug` in bpffs.
//!
//! The launcher hands over two pipe descriptors: fd 0 carries control tags
//! from the kernel, fd 1 carries link descriptor records back. The whole
//! exchange is two blocking rendezvous reads bracketing the load/attach/report
//! sequence; see [`session::Session`].
//!
//! # Quick start
//!
//! ```ignore
//! use bpf_preload::channel::Channels;
//! use bpf_preload::session::Session;
//! use bpf_preload::skel::SysLoader;
//!
//! let ch = Channels::from_launcher()?;
//! Session::new(ch.from_kernel, ch.to_kernel, SysLoader::new()).run()?;
//! ```

// =============================================================================
// Wire Format
// =============================================================================

pub mod wire;

// =============================================================================
// Channels
// =============================================================================

pub mod channel;

// =============================================================================
// Loader Capability
// =============================================================================

pub mod loader;

pub mod skel;

// =============================================================================
// Handshake Session
// =============================================================================

pub mod session;
