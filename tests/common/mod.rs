#![allow(dead_code, missing_docs, clippy::unwrap_used)]

use std::fs::File;
use std::os::fd::OwnedFd;
use std::os::unix::fs::OpenOptionsExt as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs_proxy::{FsService, ServiceOptions};
use nix::sys::stat::Mode;

/// A service running its background work on the current test runtime.
pub fn service() -> FsService {
    FsService::new(
        ServiceOptions::default(),
        tokio::runtime::Handle::current(),
    )
}

/// Create a FIFO named `name` inside `dir`.
pub fn mkfifo(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    nix::unistd::mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR).unwrap();
    path
}

/// Caller-side read end of a FIFO. Never blocks on open; reads block.
pub fn fifo_reader(fifo: &Path) -> File {
    let file = File::options()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(fifo)
        .unwrap();
    fs_proxy::io::set_blocking(&file).unwrap();
    file
}

/// Caller-side read end of a FIFO that stays non-blocking.
pub fn fifo_reader_nonblocking(fifo: &Path) -> File {
    File::options()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(fifo)
        .unwrap()
}

/// Caller-side write end of a FIFO. Someone must already hold a read end.
pub fn fifo_writer(fifo: &Path) -> File {
    File::options().write(true).open(fifo).unwrap()
}

/// A (reader, writer) pair on a fresh FIFO, as descriptors.
pub fn fifo_pair(dir: &Path, name: &str) -> (File, OwnedFd) {
    let fifo = mkfifo(dir, name);
    let reader = fifo_reader(&fifo);
    let writer = OwnedFd::from(fifo_writer(&fifo));
    (reader, writer)
}

/// Deterministic, non-repeating-looking payload of `len` bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| u8::try_from((i * 31 + i / 251) % 256).unwrap())
        .collect()
}

/// Number of descriptors this process has open.
pub fn open_fd_count() -> usize {
    std::fs::read_dir("/proc/self/fd").unwrap().count()
}

/// Poll until no streaming copy is running, or panic after timeout.
pub async fn wait_for_streams(service: &FsService) {
    for _ in 0..1000 {
        if service.streams().active() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("streams did not finish within 5 seconds");
}

/// Poll `cond` until it returns true, or panic with `what` after timeout.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{what} did not happen within 2 seconds");
}
