//! Error taxonomy and the result envelope returned across the call boundary.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fs::Handle;

/// Errors produced by the executor-side service.
#[derive(Debug, Error)]
pub enum FsError {
    /// The OS rejected an operation on a path.
    #[error("{path}: {}", describe(.errno))]
    PathResolution {
        /// Raw OS error code.
        errno: i32,
        /// The path the operation targeted.
        path: String,
    },

    /// The handle is unknown, already closed, or belongs to another caller.
    #[error("stale handle {0}")]
    StaleHandle(Handle),

    /// A syscall failed against an otherwise valid descriptor.
    #[error("{op}: {}", describe(.errno))]
    Io {
        /// Raw OS error code.
        errno: i32,
        /// The operation that failed.
        op: &'static str,
    },

    /// A background copy failed mid-flight. Never reaches a caller.
    #[error("transfer aborted: {}", describe(.errno))]
    Transfer {
        /// Raw OS error code.
        errno: i32,
    },
}

/// Shorthand for results produced inside the service.
pub type FsResult<T> = Result<T, FsError>;

fn describe(errno: &i32) -> &'static str {
    nix::errno::Errno::from_raw(*errno).desc()
}

fn raw_errno(e: &std::io::Error) -> i32 {
    e.raw_os_error().unwrap_or(libc::EIO)
}

impl FsError {
    /// A path-level failure from an `std::io::Error`.
    pub fn path(path: impl AsRef<Path>, e: &std::io::Error) -> Self {
        Self::PathResolution {
            errno: raw_errno(e),
            path: path.as_ref().display().to_string(),
        }
    }

    /// A path-level failure from a nix errno.
    pub fn path_errno(path: impl AsRef<Path>, errno: nix::errno::Errno) -> Self {
        Self::PathResolution {
            errno: errno as i32,
            path: path.as_ref().display().to_string(),
        }
    }

    /// A descriptor-level failure with an explicit errno.
    #[must_use]
    pub fn io(op: &'static str, errno: i32) -> Self {
        Self::Io { errno, op }
    }

    /// A descriptor-level failure from an `std::io::Error`.
    #[must_use]
    pub fn io_from(op: &'static str, e: &std::io::Error) -> Self {
        Self::Io {
            errno: raw_errno(e),
            op,
        }
    }

    /// The POSIX errno this error maps to.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::PathResolution { errno, .. }
            | Self::Io { errno, .. }
            | Self::Transfer { errno } => *errno,
            Self::StaleHandle(_) => libc::EBADF,
        }
    }

    /// The taxonomy bucket this error belongs to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PathResolution { .. } => ErrorKind::PathResolution,
            Self::StaleHandle(_) => ErrorKind::StaleHandle,
            Self::Io { .. } => ErrorKind::Io,
            Self::Transfer { .. } => ErrorKind::Transfer,
        }
    }
}

/// Coarse error classification exposed to callers so they can branch without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`FsError::PathResolution`].
    PathResolution,
    /// See [`FsError::StaleHandle`]. Never retryable.
    StaleHandle,
    /// See [`FsError::Io`].
    Io,
    /// See [`FsError::Transfer`].
    Transfer,
}

/// The uniform success-or-error wrapper returned by every boundary operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Envelope<T> {
    /// The operation succeeded.
    Ok {
        /// The operation's result.
        value: T,
    },
    /// The operation failed.
    Err {
        /// Which taxonomy bucket the failure belongs to.
        kind: ErrorKind,
        /// POSIX errno.
        code: i32,
        /// Human-readable description.
        message: String,
    },
}

impl<T> Envelope<T> {
    /// Whether this envelope carries a success value.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// The error kind, if this envelope is an error.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Ok { .. } => None,
            Self::Err { kind, .. } => Some(*kind),
        }
    }

    /// Transform the success payload.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        match self {
            Self::Ok { value } => Envelope::Ok { value: f(value) },
            Self::Err {
                kind,
                code,
                message,
            } => Envelope::Err {
                kind,
                code,
                message,
            },
        }
    }
}

impl<T> From<FsResult<T>> for Envelope<T> {
    fn from(result: FsResult<T>) -> Self {
        match result {
            Ok(value) => Self::Ok { value },
            Err(e) => Self::Err {
                kind: e.kind(),
                code: e.errno(),
                message: e.to_string(),
            },
        }
    }
}
