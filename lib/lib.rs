//! fs-proxy shared library.
//!
//! The executor side of a delegated file-system service: callers that cannot open a file ask this
//! process to do it for them. Metadata calls go through a bounded [`cache::PathCache`]; channel
//! calls go through the [`fs::OpenFiles`] handle table and move their payload over a relay FIFO;
//! whole-file streams run on background [`stream::StreamWorkers`].

/// Bounded path-resolution cache.
pub mod cache;
pub mod error;
/// Open-file resources and the handle table.
pub mod fs;
pub mod io;
pub mod link;
pub mod path;
pub mod service;
pub mod stream;
pub mod wire;

pub use error::{Envelope, ErrorKind, FsError, FsResult};
pub use fs::{Handle, OwnerId};
pub use service::{FsService, ServiceOptions};
