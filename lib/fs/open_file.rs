use std::fs::File;
use std::io::{ErrorKind, Seek as _, SeekFrom};
use std::path::Path;

use tracing::{debug, trace};

use crate::error::{FsError, FsResult};
use crate::fs::{OpenFlags, PIPE_CAPACITY, Whence};
use crate::io;

/// A target descriptor plus the two ends of the relay conduit that carries its payload bytes.
///
/// Every descriptor is owned by this struct and closed exactly once when it is dropped. The
/// handle table shares it behind an `Arc`, so a close racing an in-flight call only releases the
/// descriptors after that call returns.
#[derive(Debug)]
pub struct OpenFile {
    fd: File,
    /// Service-side end the payload of a `pwrite` is read from.
    relay_read: Option<File>,
    /// Service-side end the payload of a `pread` is written to.
    relay_write: Option<File>,
}

impl OpenFile {
    /// Open `path` and both ends of the conduit at `conduit`, all non-blocking.
    ///
    /// The read end is opened first, since a non-blocking write open of a FIFO fails with `ENXIO`
    /// while it has no reader. Descriptors opened before a failure are closed on return.
    pub fn open_channel(path: &Path, flags: OpenFlags, conduit: &Path) -> FsResult<Self> {
        let fd = io::open_with_flags(path, flags | OpenFlags::NONBLOCK)
            .map_err(|e| FsError::path(path, &e))?;
        let relay_read = io::open_with_flags(conduit, OpenFlags::RDONLY | OpenFlags::NONBLOCK)
            .map_err(|e| FsError::path(conduit, &e))?;
        let relay_write = io::open_with_flags(conduit, OpenFlags::WRONLY | OpenFlags::NONBLOCK)
            .map_err(|e| FsError::path(conduit, &e))?;
        Ok(Self {
            fd,
            relay_read: Some(relay_read),
            relay_write: Some(relay_write),
        })
    }

    /// A resource that streams `fd` into `sink`.
    #[must_use]
    pub fn with_sink(fd: File, sink: File) -> Self {
        Self {
            fd,
            relay_read: None,
            relay_write: Some(sink),
        }
    }

    /// A resource that streams `source` into `fd`.
    #[must_use]
    pub fn with_source(fd: File, source: File) -> Self {
        Self {
            fd,
            relay_read: Some(source),
            relay_write: None,
        }
    }

    /// Move up to `len` bytes (capped at [`PIPE_CAPACITY`]) from the target into the relay.
    ///
    /// A negative `offset` reads from, and advances, the current position. Otherwise this is a
    /// positioned read that leaves the file position untouched. Returns the number of bytes
    /// that reached the relay, which is short when the relay had less room than was read; the
    /// position then only advances by that count. Zero means end of file or a full relay.
    pub fn pread(&self, len: usize, offset: i64) -> FsResult<usize> {
        let relay = self
            .relay_write
            .as_ref()
            .ok_or_else(|| FsError::io("pread", libc::EBADF))?;

        let mut buf = vec![0u8; len.min(PIPE_CAPACITY)];
        let n = match u64::try_from(offset) {
            Ok(off) => io::read_at_retrying(&self.fd, &mut buf, off),
            Err(_) => io::read_retrying(&self.fd, &mut buf),
        }
        .map_err(|e| FsError::io_from("pread", &e))?;

        if n == 0 {
            trace!(len, offset, "pread at end of file");
            return Ok(0);
        }

        let delivered = match io::write_retrying(relay, &buf[..n]) {
            Ok(w) => w,
            Err(e) if e.kind() == ErrorKind::WouldBlock => 0,
            Err(e) => return Err(FsError::io_from("pread", &e)),
        };
        if offset < 0 && delivered < n {
            // Give back what the relay had no room for.
            let undelivered = i64::try_from(n - delivered)
                .map_err(|_| FsError::io("pread", libc::EOVERFLOW))?;
            (&self.fd)
                .seek(SeekFrom::Current(-undelivered))
                .map_err(|e| FsError::io_from("pread", &e))?;
        }
        trace!(len, offset, n, delivered, "pread");
        Ok(delivered)
    }

    /// Move up to `len` bytes out of the relay and into the target.
    ///
    /// The relay is drained in chunks of at most [`PIPE_CAPACITY`] bytes. When `exact` is set,
    /// running dry before `len` bytes were moved is an error; otherwise the count moved so far is
    /// returned and zero means the relay reached end of file.
    ///
    /// The `EPIPE` of an exact shortfall does not undo the chunks already written, so the target
    /// holds a prefix of the payload whose length is only visible in the debug log.
    pub fn pwrite(&self, len: usize, offset: i64, exact: bool) -> FsResult<usize> {
        let relay = self
            .relay_read
            .as_ref()
            .ok_or_else(|| FsError::io("pwrite", libc::EBADF))?;
        let base = u64::try_from(offset).ok();

        let mut buf = vec![0u8; len.min(PIPE_CAPACITY)];
        let mut written = 0usize;
        while written < len {
            let want = (len - written).min(buf.len());
            let n = match io::read_retrying(relay, &mut buf[..want]) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => 0,
                Err(e) => return Err(FsError::io_from("pwrite", &e)),
            };
            if n == 0 {
                if exact {
                    debug!(len, offset, written, "pwrite relay ran dry");
                    return Err(FsError::io("pwrite", libc::EPIPE));
                }
                break;
            }
            let at = base.map(|b| b + written as u64);
            io::write_fully(&self.fd, &buf[..n], at).map_err(|e| FsError::io_from("pwrite", &e))?;
            written += n;
        }
        trace!(len, offset, written, "pwrite");
        Ok(written)
    }

    /// Reposition the target and return the resulting absolute offset.
    pub fn lseek(&self, offset: i64, whence: Whence) -> FsResult<u64> {
        let pos = whence.seek_from(offset)?;
        (&self.fd)
            .seek(pos)
            .map_err(|e| FsError::io_from("lseek", &e))
    }

    /// Current length of the target.
    pub fn size(&self) -> FsResult<u64> {
        self.fd
            .metadata()
            .map(|m| m.len())
            .map_err(|e| FsError::io_from("fstat", &e))
    }

    /// Grow or shrink the target to exactly `length` bytes.
    pub fn ftruncate(&self, length: u64) -> FsResult<()> {
        self.fd
            .set_len(length)
            .map_err(|e| FsError::io_from("ftruncate", &e))
    }

    /// Flush to durable storage; data only unless `metadata` is set.
    pub fn sync(&self, metadata: bool) -> FsResult<()> {
        if metadata {
            self.fd.sync_all().map_err(|e| FsError::io_from("fsync", &e))
        } else {
            self.fd
                .sync_data()
                .map_err(|e| FsError::io_from("fdatasync", &e))
        }
    }
}
