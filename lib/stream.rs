//! Fire-and-forget whole-file copies between a path and a caller-supplied conduit.

use std::fs::File;
use std::os::fd::OwnedFd;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::runtime::Handle as RuntimeHandle;
use tracing::{debug, warn};

use crate::error::{FsError, FsResult};
use crate::fs::{OpenFile, OpenFlags, PIPE_CAPACITY};
use crate::io;

/// Decrements the active-worker count however the worker exits, panics included.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Release);
    }
}

/// Runs streaming copies on the runtime's blocking pool.
///
/// The blocking pool grows on demand and is separate from whatever threads dispatch calls, so a
/// stalled conduit ties up one pool thread and nothing else. Once a copy starts nobody waits on
/// it: faults end the copy, get logged, and release both descriptors.
pub struct StreamWorkers {
    runtime: RuntimeHandle,
    active: Arc<AtomicUsize>,
}

impl StreamWorkers {
    /// Spawn workers onto `runtime`'s blocking pool.
    #[must_use]
    pub fn new(runtime: RuntimeHandle) -> Self {
        Self {
            runtime,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Copy the file at `path` into `sink` until end of file.
    ///
    /// Returns once the file is open and the worker is queued; fails only if `path` cannot be
    /// opened, in which case `sink` is closed before returning.
    pub fn open_read_stream(&self, path: &Path, sink: OwnedFd) -> FsResult<()> {
        let fd = File::open(path).map_err(|e| FsError::path(path, &e))?;
        let file = OpenFile::with_sink(fd, File::from(sink));
        self.spawn(path, "read", move || {
            while file.pread(PIPE_CAPACITY, -1)? > 0 {}
            Ok(())
        });
        Ok(())
    }

    /// Copy everything readable from `source` into the file at `path`.
    ///
    /// The file is created if missing, then either appended to or truncated.
    pub fn open_write_stream(&self, path: &Path, source: OwnedFd, append: bool) -> FsResult<()> {
        let mode = OpenFlags::CREAT
            | OpenFlags::WRONLY
            | if append {
                OpenFlags::APPEND
            } else {
                OpenFlags::TRUNC
            };
        let fd = io::open_with_flags(path, mode).map_err(|e| FsError::path(path, &e))?;
        let file = OpenFile::with_source(fd, File::from(source));
        self.spawn(path, "write", move || {
            while file.pwrite(PIPE_CAPACITY, -1, false)? > 0 {}
            Ok(())
        });
        Ok(())
    }

    /// Number of copies still running.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    fn spawn<F>(&self, path: &Path, direction: &'static str, copy: F)
    where
        F: FnOnce() -> FsResult<()> + Send + 'static,
    {
        self.active.fetch_add(1, Ordering::AcqRel);
        let guard = ActiveGuard(Arc::clone(&self.active));
        let path = path.display().to_string();
        // Detached.
        drop(self.runtime.spawn_blocking(move || {
            let _guard = guard;
            // `copy` owns the OpenFile, so both descriptors close when it returns.
            match copy() {
                Ok(()) => debug!(%path, direction, "stream finished"),
                Err(e) => {
                    let fault = FsError::Transfer { errno: e.errno() };
                    warn!(%path, direction, error = %fault, cause = %e, "stream aborted");
                }
            }
        }));
    }
}
