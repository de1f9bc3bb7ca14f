//! Bounded path-resolution cache.

use std::sync::Arc;

use hashlink::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use crate::path::FsPath;

/// Number of resolved paths kept by default.
pub const DEFAULT_CAPACITY: usize = 100;

/// Collapse repeated separators and drop a trailing one, keeping a leading `/`.
///
/// `.` and `..` components are kept verbatim; resolving them is the OS's job.
#[must_use]
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let joined = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    match (absolute, joined.is_empty()) {
        (true, true) => "/".to_owned(),
        (true, false) => format!("/{joined}"),
        (false, _) => joined,
    }
}

/// Least-recently-used map from a normalized path string to its [`FsPath`].
///
/// A miss builds a fresh [`FsPath`] without touching the file system, so [`PathCache::get`]
/// never fails. Entries are never invalidated by writes: an `FsPath` carries no file data, only
/// the path, so every query through it reaches the OS.
pub struct PathCache {
    entries: Mutex<LruCache<String, Arc<FsPath>>>,
}

impl Default for PathCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PathCache {
    /// Create a cache holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Resolve `path`, inserting it (and evicting the least recently used entry if full) on a
    /// miss.
    pub fn get(&self, path: &str) -> Arc<FsPath> {
        let key = normalize(path);
        let mut entries = self.entries.lock();
        if let Some(hit) = entries.get(&key) {
            return Arc::clone(hit);
        }
        trace!(path = %key, "path cache miss");
        let resolved = Arc::new(FsPath::new(&key));
        entries.insert(key, Arc::clone(&resolved));
        resolved
    }

    /// Whether `path` is cached. Does not count as an access.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.entries.lock().contains_key(&normalize(path))
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.lock().capacity()
    }
}
