//! Random IO utilities

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd as _;
use std::os::unix::fs::{FileExt as _, OpenOptionsExt as _};
use std::path::Path;

use nix::fcntl::{FcntlArg, OFlag, fcntl};

use crate::fs::OpenFlags;

/// Open `path` with raw open(2) `flags` and a `0o666` creation mode.
///
/// The access mode is split out of `flags` because `OpenOptions` masks it from custom flags.
pub fn open_with_flags(path: &Path, flags: OpenFlags) -> std::io::Result<File> {
    let mut opts = OpenOptions::new();
    match flags.access_mode() {
        libc::O_WRONLY => opts.write(true),
        libc::O_RDWR => opts.read(true).write(true),
        _ => opts.read(true),
    };
    opts.custom_flags(flags.status_flags()).mode(0o666).open(path)
}

/// Clear `O_NONBLOCK` on an already-open descriptor.
pub fn set_blocking(file: &File) -> std::io::Result<()> {
    let current = fcntl(file.as_raw_fd(), FcntlArg::F_GETFL)?;
    let mut flags = OFlag::from_bits_truncate(current);
    flags.remove(OFlag::O_NONBLOCK);
    fcntl(file.as_raw_fd(), FcntlArg::F_SETFL(flags))?;
    Ok(())
}

/// `read` that retries on `EINTR`.
pub fn read_retrying(mut src: &File, buf: &mut [u8]) -> std::io::Result<usize> {
    loop {
        match src.read(buf) {
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            other => return other,
        }
    }
}

/// `pread` that retries on `EINTR`.
pub fn read_at_retrying(src: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    loop {
        match src.read_at(buf, offset) {
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            other => return other,
        }
    }
}

/// A single `write` that retries on `EINTR` and may be short.
pub fn write_retrying(mut dst: &File, buf: &[u8]) -> std::io::Result<usize> {
    loop {
        match dst.write(buf) {
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            other => return other,
        }
    }
}

/// Write all of `buf`, either at the current position or at `offset`.
///
/// `write_all` already retries on `EINTR`.
pub fn write_fully(mut dst: &File, buf: &[u8], offset: Option<u64>) -> std::io::Result<()> {
    match offset {
        Some(off) => dst.write_all_at(buf, off),
        None => dst.write_all(buf),
    }
}
