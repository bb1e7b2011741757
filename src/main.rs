//! Kernel-launched entry point.
//!
//! The launcher provides fd 0 (control tags in) and fd 1 (link records out)
//! and expects exit status 0 on a completed handshake, anything else on
//! failure. Diagnostics go to `/dev/console`; the logger is installed only
//! after fds 1/2 have been re-pointed there.

use std::process::ExitCode;

use bpf_preload::channel::Channels;
use bpf_preload::session::Session;
use bpf_preload::skel::SysLoader;

fn main() -> ExitCode {
    let channels = match Channels::from_launcher() {
        Ok(channels) => channels,
        // No console, nowhere to report; the launcher detects the helper
        // that exits without ever speaking.
        Err(_) => return ExitCode::from(1),
    };

    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let session = Session::new(channels.from_kernel, channels.to_kernel, SysLoader::new());
    match session.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::from(1),
    }
}
