//! Descriptor-level building blocks: open-file resources and the handle table.
/// Handle table and owner index.
pub mod handle_table;
/// A single open file plus its relay conduit.
pub mod open_file;

pub use handle_table::OpenFiles;
pub use open_file::OpenFile;

use std::io::SeekFrom;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{FsError, FsResult};

/// Type representing a channel handle handed out to callers.
pub type Handle = u64;

/// Identity of a connected caller. Assigned by the transport, one per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(pub u64);

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "owner-{}", self.0)
    }
}

/// Capacity of a single relay transfer, in bytes.
pub const PIPE_CAPACITY: usize = 16 * 4096;

bitflags! {
    /// Permission bits of a `st_mode`, similar to Unix file permissions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModeBits: u32 {
        /// Other: execute permission.
        const OTHER_EXECUTE = 1 << 0;
        /// Other: write permission.
        const OTHER_WRITE   = 1 << 1;
        /// Other: read permission.
        const OTHER_READ    = 1 << 2;

        /// Group: execute permission.
        const GROUP_EXECUTE = 1 << 3;
        /// Group: write permission.
        const GROUP_WRITE   = 1 << 4;
        /// Group: read permission.
        const GROUP_READ    = 1 << 5;

        /// Owner: execute permission.
        const OWNER_EXECUTE = 1 << 6;
        /// Owner: write permission.
        const OWNER_WRITE   = 1 << 7;
        /// Owner: read permission.
        const OWNER_READ    = 1 << 8;

        /// Sticky bit.
        const STICKY        = 1 << 9;
        /// Set-group-ID bit.
        const SETGID        = 1 << 10;
        /// Set-user-ID bit.
        const SETUID        = 1 << 11;

        /// Read permission for owner, group and other.
        const ALL_READ = Self::OWNER_READ.bits()
            | Self::GROUP_READ.bits()
            | Self::OTHER_READ.bits();
        /// Write permission for owner, group and other.
        const ALL_WRITE = Self::OWNER_WRITE.bits()
            | Self::GROUP_WRITE.bits()
            | Self::OTHER_WRITE.bits();
        /// Execute permission for owner, group and other.
        const ALL_EXECUTE = Self::OWNER_EXECUTE.bits()
            | Self::GROUP_EXECUTE.bits()
            | Self::OTHER_EXECUTE.bits();
    }
}

bitflags! {
    /// Flags for opening a file, following open(2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: i32 {
        /// Open for reading only.
        const RDONLY = libc::O_RDONLY;
        /// Open for writing only.
        const WRONLY = libc::O_WRONLY;
        /// Open for reading and writing.
        const RDWR = libc::O_RDWR;

        /// Append on each write.
        const APPEND = libc::O_APPEND;
        /// Truncate to zero length.
        const TRUNC = libc::O_TRUNC;
        /// Create file if it does not exist.
        const CREAT = libc::O_CREAT;
        /// Error if file already exists (with `CREAT`).
        const EXCL = libc::O_EXCL;

        /// Non-blocking mode.
        const NONBLOCK = libc::O_NONBLOCK;
        /// Synchronous writes.
        const SYNC = libc::O_SYNC;
        /// Synchronous data integrity writes.
        const DSYNC = libc::O_DSYNC;
        /// Do not follow symlinks.
        const NOFOLLOW = libc::O_NOFOLLOW;
        /// Set close-on-exec.
        const CLOEXEC = libc::O_CLOEXEC;
    }
}

impl OpenFlags {
    /// The access-mode portion (`O_RDONLY`, `O_WRONLY` or `O_RDWR`).
    #[must_use]
    pub fn access_mode(self) -> i32 {
        self.bits() & libc::O_ACCMODE
    }

    /// Everything except the access mode.
    #[must_use]
    pub fn status_flags(self) -> i32 {
        self.bits() & !libc::O_ACCMODE
    }
}

/// Seek origin, using the numeric values of lseek(2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Whence {
    /// `SEEK_SET`
    Start,
    /// `SEEK_CUR`
    Current,
    /// `SEEK_END`
    End,
}

impl TryFrom<i32> for Whence {
    type Error = FsError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            libc::SEEK_SET => Ok(Self::Start),
            libc::SEEK_CUR => Ok(Self::Current),
            libc::SEEK_END => Ok(Self::End),
            _ => Err(FsError::io("lseek", libc::EINVAL)),
        }
    }
}

impl Whence {
    /// Combine with an offset into a [`SeekFrom`].
    pub fn seek_from(self, offset: i64) -> FsResult<SeekFrom> {
        match self {
            Self::Start => u64::try_from(offset)
                .map(SeekFrom::Start)
                .map_err(|_| FsError::io("lseek", libc::EINVAL)),
            Self::Current => Ok(SeekFrom::Current(offset)),
            Self::End => Ok(SeekFrom::End(offset)),
        }
    }
}

/// The type of a file, decoded from the `S_IFMT` bits of a `st_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FileKind {
    /// A regular file.
    Regular,
    /// A directory.
    Directory,
    /// A symbolic link.
    Symlink,
    /// A block device.
    BlockDevice,
    /// A character device.
    CharDevice,
    /// A named pipe.
    Fifo,
    /// A Unix domain socket.
    Socket,
    /// Anything else, including a zero mode.
    Unknown,
}

impl FileKind {
    /// Decode the file type out of a raw `st_mode`.
    #[must_use]
    pub fn from_mode(mode: u32) -> Self {
        match mode & libc::S_IFMT {
            libc::S_IFREG => Self::Regular,
            libc::S_IFDIR => Self::Directory,
            libc::S_IFLNK => Self::Symlink,
            libc::S_IFBLK => Self::BlockDevice,
            libc::S_IFCHR => Self::CharDevice,
            libc::S_IFIFO => Self::Fifo,
            libc::S_IFSOCK => Self::Socket,
            _ => Self::Unknown,
        }
    }
}
