//! A path bound to the OS primitives that query and mutate it.

use std::fs::{self, OpenOptions, Permissions};
use std::io::ErrorKind;
use std::os::unix::fs::{MetadataExt as _, PermissionsExt as _};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use nix::sys::stat::{UtimensatFlags, utimensat};
use nix::sys::statvfs::{Statvfs, statvfs};
use nix::sys::time::TimeSpec;
use nix::unistd::{AccessFlags, access};

use crate::error::{FsError, FsResult};
use crate::fs::ModeBits;

/// Which permission class a `set_*` call toggles.
#[derive(Debug, Clone, Copy)]
enum PermClass {
    Read,
    Write,
    Execute,
}

impl PermClass {
    fn bits(self, owner_only: bool) -> ModeBits {
        match (self, owner_only) {
            (Self::Read, true) => ModeBits::OWNER_READ,
            (Self::Read, false) => ModeBits::ALL_READ,
            (Self::Write, true) => ModeBits::OWNER_WRITE,
            (Self::Write, false) => ModeBits::ALL_WRITE,
            (Self::Execute, true) => ModeBits::OWNER_EXECUTE,
            (Self::Execute, false) => ModeBits::ALL_EXECUTE,
        }
    }
}

/// Resolved path object handed out by the path cache.
///
/// Holds nothing but the path itself. Failures surface only when a method is called.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FsPath {
    path: PathBuf,
}

impl FsPath {
    /// Bind to `path` without touching the file system.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The bound path.
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    fn err(&self, e: &std::io::Error) -> FsError {
        FsError::path(&self.path, e)
    }

    /// Absolute path with every symlink resolved.
    ///
    /// The path need not exist: the longest existing ancestor is resolved and the missing
    /// components are appended to it, folding `.` and `..` lexically.
    pub fn canonical_path(&self) -> FsResult<String> {
        let mut existing = self.path.clone();
        let mut missing = Vec::new();
        let mut resolved = loop {
            match fs::canonicalize(&existing) {
                Ok(resolved) => break resolved,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    let last = existing
                        .components()
                        .next_back()
                        .map(|c| c.as_os_str().to_owned());
                    let Some(last) = last.filter(|_| existing != Path::new(".")) else {
                        return Err(self.err(&e));
                    };
                    if !existing.pop() {
                        return Err(self.err(&e));
                    }
                    if existing.as_os_str().is_empty() {
                        existing.push(".");
                    }
                    missing.push(last);
                }
                Err(e) => return Err(self.err(&e)),
            }
        };

        for part in missing.iter().rev() {
            if part == ".." {
                resolved.pop();
            } else if part != "." {
                resolved.push(part);
            }
        }
        Ok(resolved.to_string_lossy().into_owned())
    }

    /// Whether the path names a directory. Missing paths are not directories.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.path.is_dir()
    }

    /// Whether the path names a regular file.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.path.is_file()
    }

    /// Dotfile convention: the final component starts with `.`.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.path
            .file_name()
            .is_some_and(|name| name.as_encoded_bytes().first() == Some(&b'.'))
    }

    /// Modification time in milliseconds since the Unix epoch.
    pub fn last_modified(&self) -> FsResult<i64> {
        let modified = fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|e| self.err(&e))?;
        Ok(match modified.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_millis()).unwrap_or(i64::MAX),
            Err(before) => -i64::try_from(before.duration().as_millis()).unwrap_or(i64::MAX),
        })
    }

    /// Size in bytes.
    pub fn length(&self) -> FsResult<u64> {
        fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|e| self.err(&e))
    }

    /// Create an empty file. `Ok(false)` if something already exists at the path.
    pub fn create_new_file(&self) -> FsResult<bool> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(self.err(&e)),
        }
    }

    /// Remove a file, a symlink, or an empty directory.
    pub fn delete(&self) -> FsResult<()> {
        let meta = fs::symlink_metadata(&self.path).map_err(|e| self.err(&e))?;
        if meta.is_dir() {
            fs::remove_dir(&self.path)
        } else {
            fs::remove_file(&self.path)
        }
        .map_err(|e| self.err(&e))
    }

    /// Entry names of a directory, in no particular order.
    pub fn list(&self) -> FsResult<Vec<String>> {
        fs::read_dir(&self.path)
            .map_err(|e| self.err(&e))?
            .map(|entry| {
                entry
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .map_err(|e| self.err(&e))
            })
            .collect()
    }

    /// Create this directory. The parent must exist.
    pub fn mkdir(&self) -> FsResult<()> {
        fs::create_dir(&self.path).map_err(|e| self.err(&e))
    }

    /// Create this directory and any missing parents.
    pub fn mkdirs(&self) -> FsResult<()> {
        fs::create_dir_all(&self.path).map_err(|e| self.err(&e))
    }

    /// Rename to `dest`.
    pub fn rename_to(&self, dest: &FsPath) -> FsResult<()> {
        fs::rename(&self.path, &dest.path).map_err(|e| self.err(&e))
    }

    /// Set the modification time, in milliseconds since the Unix epoch.
    ///
    /// Goes through `utimensat` on the path, so FIFOs and files the caller cannot open work too.
    /// The access time is left as it was.
    pub fn set_last_modified(&self, millis: i64) -> FsResult<()> {
        let mtime = TimeSpec::new(millis.div_euclid(1000), millis.rem_euclid(1000) * 1_000_000);
        utimensat(
            None,
            &self.path,
            &TimeSpec::UTIME_OMIT,
            &mtime,
            UtimensatFlags::FollowSymlink,
        )
        .map_err(|e| FsError::path_errno(&self.path, e))
    }

    fn update_mode(&self, update: impl FnOnce(ModeBits) -> ModeBits) -> FsResult<()> {
        let meta = fs::metadata(&self.path).map_err(|e| self.err(&e))?;
        let mode = meta.permissions().mode();
        let perms = update(ModeBits::from_bits_truncate(mode));
        fs::set_permissions(&self.path, Permissions::from_mode(perms.bits()))
            .map_err(|e| self.err(&e))
    }

    fn set_class(&self, class: PermClass, enable: bool, owner_only: bool) -> FsResult<()> {
        let bits = class.bits(owner_only);
        self.update_mode(|perms| {
            if enable {
                perms | bits
            } else {
                perms - bits
            }
        })
    }

    /// Clear every write bit.
    pub fn set_read_only(&self) -> FsResult<()> {
        self.update_mode(|perms| perms - ModeBits::ALL_WRITE)
    }

    /// Toggle write permission for the owner, or for everyone unless `owner_only`.
    pub fn set_writable(&self, writable: bool, owner_only: bool) -> FsResult<()> {
        self.set_class(PermClass::Write, writable, owner_only)
    }

    /// Toggle read permission for the owner, or for everyone unless `owner_only`.
    pub fn set_readable(&self, readable: bool, owner_only: bool) -> FsResult<()> {
        self.set_class(PermClass::Read, readable, owner_only)
    }

    /// Toggle execute permission for the owner, or for everyone unless `owner_only`.
    pub fn set_executable(&self, executable: bool, owner_only: bool) -> FsResult<()> {
        self.set_class(PermClass::Execute, executable, owner_only)
    }

    /// access(2) with POSIX `R_OK`/`W_OK`/`X_OK`/`F_OK` bits. Any failure reads as `false`.
    #[must_use]
    pub fn check_access(&self, mode: i32) -> bool {
        access(&self.path, AccessFlags::from_bits_truncate(mode)).is_ok()
    }

    fn statvfs(&self) -> FsResult<Statvfs> {
        statvfs(&self.path).map_err(|e| FsError::path_errno(&self.path, e))
    }

    /// Size of the file system holding this path, in bytes.
    #[allow(clippy::useless_conversion)]
    pub fn total_space(&self) -> FsResult<u64> {
        let st = self.statvfs()?;
        Ok(u64::from(st.blocks()) * u64::from(st.fragment_size()))
    }

    /// Free bytes, including those reserved for the superuser.
    #[allow(clippy::useless_conversion)]
    pub fn free_space(&self) -> FsResult<u64> {
        let st = self.statvfs()?;
        Ok(u64::from(st.blocks_free()) * u64::from(st.fragment_size()))
    }

    /// Bytes available to an unprivileged caller.
    #[allow(clippy::useless_conversion)]
    pub fn usable_space(&self) -> FsResult<u64> {
        let st = self.statvfs()?;
        Ok(u64::from(st.blocks_available()) * u64::from(st.fragment_size()))
    }

    /// Raw `st_mode` from lstat(2).
    pub fn mode(&self) -> FsResult<u32> {
        fs::symlink_metadata(&self.path)
            .map(|m| m.mode())
            .map_err(|e| self.err(&e))
    }

    /// Create this path as a link to `target`. `Ok(false)` if the link path already exists.
    pub fn create_link(&self, target: &str, soft: bool) -> FsResult<bool> {
        let result = if soft {
            std::os::unix::fs::symlink(target, &self.path)
        } else {
            fs::hard_link(target, &self.path)
        };
        match result {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(self.err(&e)),
        }
    }
}
