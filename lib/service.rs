//! The executor-side service: one method per boundary operation.

use std::os::fd::OwnedFd;
use std::path::Path;
use std::sync::Arc;

use tokio::runtime::Handle as RuntimeHandle;
use tracing::debug;

use crate::cache::PathCache;
use crate::error::FsResult;
use crate::fs::{Handle, OpenFile, OpenFiles, OpenFlags, OwnerId, Whence};
use crate::link::{ClientLink, LinkError};
use crate::stream::StreamWorkers;

/// Construction options for [`FsService`].
#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
    /// Maximum number of entries in the path cache.
    pub path_cache_capacity: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            path_cache_capacity: crate::cache::DEFAULT_CAPACITY,
        }
    }
}

/// Executes file-system operations on behalf of remote callers.
///
/// Owns all shared state explicitly: the path cache, the handle table, and the streaming worker
/// pool. Every method is safe to call concurrently from any number of dispatch threads.
pub struct FsService {
    paths: PathCache,
    files: Arc<OpenFiles>,
    streams: StreamWorkers,
    runtime: RuntimeHandle,
}

impl FsService {
    /// Build a service whose background work runs on `runtime`.
    #[must_use]
    pub fn new(options: ServiceOptions, runtime: RuntimeHandle) -> Self {
        Self {
            paths: PathCache::new(options.path_cache_capacity),
            files: Arc::new(OpenFiles::new()),
            streams: StreamWorkers::new(runtime.clone()),
            runtime,
        }
    }

    /// The path cache.
    #[must_use]
    pub fn path_cache(&self) -> &PathCache {
        &self.paths
    }

    /// The handle table.
    #[must_use]
    pub fn open_files(&self) -> &OpenFiles {
        &self.files
    }

    /// The streaming worker pool.
    #[must_use]
    pub fn streams(&self) -> &StreamWorkers {
        &self.streams
    }

    // Metadata

    /// See [`crate::path::FsPath::canonical_path`].
    pub fn canonical_path(&self, path: &str) -> FsResult<String> {
        self.paths.get(path).canonical_path()
    }

    /// See [`crate::path::FsPath::is_directory`].
    #[must_use]
    pub fn is_directory(&self, path: &str) -> bool {
        self.paths.get(path).is_directory()
    }

    /// See [`crate::path::FsPath::is_file`].
    #[must_use]
    pub fn is_file(&self, path: &str) -> bool {
        self.paths.get(path).is_file()
    }

    /// See [`crate::path::FsPath::is_hidden`].
    #[must_use]
    pub fn is_hidden(&self, path: &str) -> bool {
        self.paths.get(path).is_hidden()
    }

    /// See [`crate::path::FsPath::last_modified`].
    pub fn last_modified(&self, path: &str) -> FsResult<i64> {
        self.paths.get(path).last_modified()
    }

    /// See [`crate::path::FsPath::length`].
    pub fn length(&self, path: &str) -> FsResult<u64> {
        self.paths.get(path).length()
    }

    /// See [`crate::path::FsPath::create_new_file`].
    pub fn create_new_file(&self, path: &str) -> FsResult<bool> {
        self.paths.get(path).create_new_file()
    }

    /// See [`crate::path::FsPath::delete`].
    pub fn delete(&self, path: &str) -> FsResult<()> {
        self.paths.get(path).delete()
    }

    /// See [`crate::path::FsPath::list`].
    pub fn list(&self, path: &str) -> FsResult<Vec<String>> {
        self.paths.get(path).list()
    }

    /// See [`crate::path::FsPath::mkdir`].
    pub fn mkdir(&self, path: &str) -> FsResult<()> {
        self.paths.get(path).mkdir()
    }

    /// See [`crate::path::FsPath::mkdirs`].
    pub fn mkdirs(&self, path: &str) -> FsResult<()> {
        self.paths.get(path).mkdirs()
    }

    /// Rename `path` to `dest`. Both sides go through the cache.
    pub fn rename_to(&self, path: &str, dest: &str) -> FsResult<()> {
        let dest = self.paths.get(dest);
        self.paths.get(path).rename_to(&dest)
    }

    /// See [`crate::path::FsPath::set_last_modified`].
    pub fn set_last_modified(&self, path: &str, millis: i64) -> FsResult<()> {
        self.paths.get(path).set_last_modified(millis)
    }

    /// See [`crate::path::FsPath::set_read_only`].
    pub fn set_read_only(&self, path: &str) -> FsResult<()> {
        self.paths.get(path).set_read_only()
    }

    /// See [`crate::path::FsPath::set_writable`].
    pub fn set_writable(&self, path: &str, writable: bool, owner_only: bool) -> FsResult<()> {
        self.paths.get(path).set_writable(writable, owner_only)
    }

    /// See [`crate::path::FsPath::set_readable`].
    pub fn set_readable(&self, path: &str, readable: bool, owner_only: bool) -> FsResult<()> {
        self.paths.get(path).set_readable(readable, owner_only)
    }

    /// See [`crate::path::FsPath::set_executable`].
    pub fn set_executable(&self, path: &str, executable: bool, owner_only: bool) -> FsResult<()> {
        self.paths.get(path).set_executable(executable, owner_only)
    }

    /// See [`crate::path::FsPath::check_access`].
    #[must_use]
    pub fn check_access(&self, path: &str, mode: i32) -> bool {
        self.paths.get(path).check_access(mode)
    }

    /// See [`crate::path::FsPath::total_space`].
    pub fn total_space(&self, path: &str) -> FsResult<u64> {
        self.paths.get(path).total_space()
    }

    /// See [`crate::path::FsPath::free_space`].
    pub fn free_space(&self, path: &str) -> FsResult<u64> {
        self.paths.get(path).free_space()
    }

    /// See [`crate::path::FsPath::usable_space`].
    pub fn usable_space(&self, path: &str) -> FsResult<u64> {
        self.paths.get(path).usable_space()
    }

    /// See [`crate::path::FsPath::mode`].
    pub fn mode(&self, path: &str) -> FsResult<u32> {
        self.paths.get(path).mode()
    }

    /// Create `link` pointing at `target`. `Ok(false)` if `link` already exists.
    pub fn create_link(&self, link: &str, target: &str, soft: bool) -> FsResult<bool> {
        self.paths.get(link).create_link(target, soft)
    }

    // Session

    /// Release every handle `owner` holds once `link` reports the peer gone.
    ///
    /// The release is queued onto the blocking pool, so the notifying thread only pays for the
    /// spawn.
    pub fn register(&self, owner: OwnerId, link: &dyn ClientLink) -> Result<(), LinkError> {
        let files = Arc::clone(&self.files);
        let runtime = self.runtime.clone();
        link.link_to_death(Box::new(move || {
            debug!(%owner, "caller disconnected");
            drop(runtime.spawn_blocking(move || files.release_owner(owner)));
        }))
    }

    // Channel

    /// Open `path` with open(2) `flags` plus both ends of the FIFO at `conduit`.
    pub fn open_channel(
        &self,
        owner: OwnerId,
        path: &str,
        flags: OpenFlags,
        conduit: &str,
    ) -> FsResult<Handle> {
        let file = OpenFile::open_channel(Path::new(path), flags, Path::new(conduit))?;
        Ok(self.files.put(owner, file))
    }

    /// See [`OpenFile::pread`].
    pub fn pread(&self, owner: OwnerId, handle: Handle, len: usize, offset: i64) -> FsResult<usize> {
        self.files.get(owner, handle)?.pread(len, offset)
    }

    /// Write exactly `len` bytes the caller already pushed into the relay.
    ///
    /// Fails with `EPIPE` when the relay holds fewer bytes. Whatever was moved before that point
    /// has already reached the target and is not rolled back.
    pub fn pwrite(
        &self,
        owner: OwnerId,
        handle: Handle,
        len: usize,
        offset: i64,
    ) -> FsResult<usize> {
        self.files.get(owner, handle)?.pwrite(len, offset, true)
    }

    /// Reposition; `whence` uses the `SEEK_SET`/`SEEK_CUR`/`SEEK_END` values.
    pub fn lseek(&self, owner: OwnerId, handle: Handle, offset: i64, whence: i32) -> FsResult<u64> {
        let file = self.files.get(owner, handle)?;
        file.lseek(offset, Whence::try_from(whence)?)
    }

    /// See [`OpenFile::size`].
    pub fn size(&self, owner: OwnerId, handle: Handle) -> FsResult<u64> {
        self.files.get(owner, handle)?.size()
    }

    /// See [`OpenFile::ftruncate`].
    pub fn ftruncate(&self, owner: OwnerId, handle: Handle, length: u64) -> FsResult<()> {
        self.files.get(owner, handle)?.ftruncate(length)
    }

    /// See [`OpenFile::sync`].
    pub fn sync(&self, owner: OwnerId, handle: Handle, metadata: bool) -> FsResult<()> {
        self.files.get(owner, handle)?.sync(metadata)
    }

    /// Close `handle`. Always succeeds.
    pub fn close(&self, owner: OwnerId, handle: Handle) {
        self.files.remove(owner, handle);
    }

    // Stream

    /// See [`StreamWorkers::open_read_stream`].
    pub fn open_read_stream(&self, path: &str, sink: OwnedFd) -> FsResult<()> {
        self.streams.open_read_stream(Path::new(path), sink)
    }

    /// See [`StreamWorkers::open_write_stream`].
    pub fn open_write_stream(&self, path: &str, source: OwnedFd, append: bool) -> FsResult<()> {
        self.streams
            .open_write_stream(Path::new(path), source, append)
    }
}
