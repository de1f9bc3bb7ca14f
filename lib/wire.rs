//! Boundary requests and their dispatch onto [`FsService`].
//!
//! Requests are a closed set of tagged variants, one per boundary operation, matched explicitly.
//! Every reply is an [`Envelope`]; a panic inside an operation is caught and reported as `EIO`
//! rather than tearing down the dispatch thread.

use std::fs::File;
use std::os::fd::OwnedFd;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{Envelope, FsError, FsResult};
use crate::fs::{Handle, OpenFlags, OwnerId};
use crate::io;
use crate::service::FsService;

/// One boundary operation and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Resolve to an absolute, symlink-free path.
    CanonicalPath { path: String },
    /// Whether `path` is a directory.
    IsDirectory { path: String },
    /// Whether `path` is a regular file.
    IsFile { path: String },
    /// Whether `path` is a dotfile.
    IsHidden { path: String },
    /// Modification time, ms since the epoch.
    LastModified { path: String },
    /// Size in bytes.
    Length { path: String },
    /// Create an empty file if nothing exists there.
    CreateNewFile { path: String },
    /// Remove a file or an empty directory.
    Delete { path: String },
    /// Directory entry names.
    List { path: String },
    /// Create one directory.
    Mkdir { path: String },
    /// Create a directory and its parents.
    Mkdirs { path: String },
    /// Rename `path` to `dest`.
    RenameTo { path: String, dest: String },
    /// Set modification time, ms since the epoch.
    SetLastModified { path: String, time: i64 },
    /// Clear every write bit.
    SetReadOnly { path: String },
    /// Toggle write permission.
    SetWritable {
        path: String,
        enable: bool,
        owner_only: bool,
    },
    /// Toggle read permission.
    SetReadable {
        path: String,
        enable: bool,
        owner_only: bool,
    },
    /// Toggle execute permission.
    SetExecutable {
        path: String,
        enable: bool,
        owner_only: bool,
    },
    /// access(2) with POSIX mode bits.
    CheckAccess { path: String, access: i32 },
    /// File system size in bytes.
    GetTotalSpace { path: String },
    /// Free bytes.
    GetFreeSpace { path: String },
    /// Bytes available to unprivileged users.
    GetUsableSpace { path: String },
    /// Raw lstat `st_mode`.
    GetMode { path: String },
    /// Create a hard or symbolic link at `link`.
    CreateLink {
        link: String,
        target: String,
        soft: bool,
    },

    /// Open `path` with open(2) `mode` flags and bind the relay FIFO at `fifo`.
    OpenChannel { path: String, mode: i32, fifo: String },
    /// Move bytes from the file into the relay.
    Pread { handle: Handle, len: usize, offset: i64 },
    /// Move bytes from the relay into the file.
    Pwrite { handle: Handle, len: usize, offset: i64 },
    /// Reposition the file.
    Lseek {
        handle: Handle,
        offset: i64,
        whence: i32,
    },
    /// Current file length.
    Size { handle: Handle },
    /// Set file length.
    Ftruncate { handle: Handle, length: u64 },
    /// Flush to storage.
    Sync { handle: Handle, metadata: bool },
    /// Release a handle.
    Close { handle: Handle },

    /// Stream `path` into the FIFO at `conduit`. The caller must already hold the read end.
    OpenReadStream { path: String, conduit: String },
    /// Stream the FIFO at `conduit` into `path`. The caller must already hold the write end.
    OpenWriteStream {
        path: String,
        conduit: String,
        append: bool,
    },
}

/// Success payload of a boundary operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Operations with nothing to return.
    Unit,
    /// Predicates.
    Bool(bool),
    /// Signed quantities such as timestamps.
    Signed(i64),
    /// Sizes, offsets, counts and handles.
    Unsigned(u64),
    /// Paths.
    Text(String),
    /// Directory listings.
    Names(Vec<String>),
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Self::Unit
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Signed(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Unsigned(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Unsigned(u64::from(v))
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Self::Unsigned(v as u64)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Self::Names(v)
    }
}

/// A request as it travels over a transport, tagged with a caller-chosen correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    /// Echoed back in the matching [`Reply`].
    pub id: u64,
    /// The operation.
    #[serde(flatten)]
    pub request: Request,
}

/// The answer to one [`Call`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    /// The [`Call::id`] this answers.
    pub id: u64,
    /// The outcome.
    #[serde(flatten)]
    pub envelope: Envelope<Value>,
}

fn ok<T: Into<Value>>(result: FsResult<T>) -> Envelope<Value> {
    Envelope::from(result.map(Into::into))
}

/// Open a caller conduit by path and switch it to blocking mode for a streaming worker.
///
/// The open itself is non-blocking so that a FIFO with no peer fails fast (`ENXIO`) instead of
/// parking the dispatch thread.
fn open_conduit(conduit: &str, flags: OpenFlags) -> FsResult<OwnedFd> {
    let path = Path::new(conduit);
    let file: File = io::open_with_flags(path, flags | OpenFlags::NONBLOCK)
        .map_err(|e| FsError::path(path, &e))?;
    io::set_blocking(&file).map_err(|e| FsError::path(path, &e))?;
    Ok(OwnedFd::from(file))
}

impl FsService {
    /// Execute `request` on behalf of `owner`.
    pub fn dispatch(&self, owner: OwnerId, request: Request) -> Envelope<Value> {
        match catch_unwind(AssertUnwindSafe(|| self.dispatch_inner(owner, request))) {
            Ok(envelope) => envelope,
            Err(_) => {
                error!(%owner, "operation panicked");
                Envelope::from(Err::<Value, _>(FsError::io("dispatch", libc::EIO)))
            }
        }
    }

    fn dispatch_inner(&self, owner: OwnerId, request: Request) -> Envelope<Value> {
        match request {
            Request::CanonicalPath { path } => ok(self.canonical_path(&path)),
            Request::IsDirectory { path } => ok(Ok(self.is_directory(&path))),
            Request::IsFile { path } => ok(Ok(self.is_file(&path))),
            Request::IsHidden { path } => ok(Ok(self.is_hidden(&path))),
            Request::LastModified { path } => ok(self.last_modified(&path)),
            Request::Length { path } => ok(self.length(&path)),
            Request::CreateNewFile { path } => ok(self.create_new_file(&path)),
            Request::Delete { path } => ok(self.delete(&path)),
            Request::List { path } => ok(self.list(&path)),
            Request::Mkdir { path } => ok(self.mkdir(&path)),
            Request::Mkdirs { path } => ok(self.mkdirs(&path)),
            Request::RenameTo { path, dest } => ok(self.rename_to(&path, &dest)),
            Request::SetLastModified { path, time } => ok(self.set_last_modified(&path, time)),
            Request::SetReadOnly { path } => ok(self.set_read_only(&path)),
            Request::SetWritable {
                path,
                enable,
                owner_only,
            } => ok(self.set_writable(&path, enable, owner_only)),
            Request::SetReadable {
                path,
                enable,
                owner_only,
            } => ok(self.set_readable(&path, enable, owner_only)),
            Request::SetExecutable {
                path,
                enable,
                owner_only,
            } => ok(self.set_executable(&path, enable, owner_only)),
            Request::CheckAccess { path, access } => ok(Ok(self.check_access(&path, access))),
            Request::GetTotalSpace { path } => ok(self.total_space(&path)),
            Request::GetFreeSpace { path } => ok(self.free_space(&path)),
            Request::GetUsableSpace { path } => ok(self.usable_space(&path)),
            Request::GetMode { path } => ok(self.mode(&path)),
            Request::CreateLink { link, target, soft } => {
                ok(self.create_link(&link, &target, soft))
            }

            Request::OpenChannel { path, mode, fifo } => ok(self.open_channel(
                owner,
                &path,
                OpenFlags::from_bits_retain(mode),
                &fifo,
            )),
            Request::Pread {
                handle,
                len,
                offset,
            } => ok(self.pread(owner, handle, len, offset)),
            Request::Pwrite {
                handle,
                len,
                offset,
            } => ok(self.pwrite(owner, handle, len, offset)),
            Request::Lseek {
                handle,
                offset,
                whence,
            } => ok(self.lseek(owner, handle, offset, whence)),
            Request::Size { handle } => ok(self.size(owner, handle)),
            Request::Ftruncate { handle, length } => ok(self.ftruncate(owner, handle, length)),
            Request::Sync { handle, metadata } => ok(self.sync(owner, handle, metadata)),
            Request::Close { handle } => {
                self.close(owner, handle);
                ok(Ok(()))
            }

            Request::OpenReadStream { path, conduit } => ok(open_conduit(
                &conduit,
                OpenFlags::WRONLY,
            )
            .and_then(|sink| self.open_read_stream(&path, sink))),
            Request::OpenWriteStream {
                path,
                conduit,
                append,
            } => ok(open_conduit(&conduit, OpenFlags::RDONLY)
                .and_then(|source| self.open_write_stream(&path, source, append))),
        }
    }
}
