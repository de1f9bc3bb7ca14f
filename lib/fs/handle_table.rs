use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::fs::{Handle, OpenFile, OwnerId};

struct Slot {
    owner: OwnerId,
    file: Arc<OpenFile>,
}

struct Inner {
    files: FxHashMap<Handle, Slot>,
    /// Reverse index used only to release everything an owner held when it goes away.
    owners: FxHashMap<OwnerId, FxHashSet<Handle>>,
    next_handle: Handle,
}

/// Table of open channel handles, keyed by handle and indexed by owner.
///
/// A single coarse lock guards both maps so that they never disagree. The lock is held only for
/// map bookkeeping: lookups hand out an `Arc<OpenFile>` and all I/O happens after it is released.
pub struct OpenFiles {
    inner: Mutex<Inner>,
}

impl Default for OpenFiles {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenFiles {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                files: FxHashMap::default(),
                owners: FxHashMap::default(),
                next_handle: 0,
            }),
        }
    }

    /// Store `file` on behalf of `owner` and return its new handle.
    ///
    /// Handles come from a monotonic counter, so an id is never reissued while the old one may
    /// still be referenced by a caller.
    pub fn put(&self, owner: OwnerId, file: OpenFile) -> Handle {
        let mut inner = self.inner.lock();
        let handle = inner.next_handle;
        inner.next_handle += 1;
        inner.files.insert(
            handle,
            Slot {
                owner,
                file: Arc::new(file),
            },
        );
        inner.owners.entry(owner).or_default().insert(handle);
        debug!(%owner, handle, "opened handle");
        handle
    }

    /// Look up `handle` as seen by `owner`.
    ///
    /// Fails with [`FsError::StaleHandle`] if the handle is unknown or belongs to someone else.
    pub fn get(&self, owner: OwnerId, handle: Handle) -> FsResult<Arc<OpenFile>> {
        let inner = self.inner.lock();
        match inner.files.get(&handle) {
            Some(slot) if slot.owner == owner => Ok(Arc::clone(&slot.file)),
            _ => Err(FsError::StaleHandle(handle)),
        }
    }

    /// Drop `handle` if `owner` holds it. Unknown handles are a no-op.
    pub fn remove(&self, owner: OwnerId, handle: Handle) {
        let released = {
            let mut inner = self.inner.lock();
            if !inner.files.get(&handle).is_some_and(|s| s.owner == owner) {
                return;
            }
            let slot = inner.files.remove(&handle);
            if let Some(set) = inner.owners.get_mut(&owner) {
                set.remove(&handle);
                if set.is_empty() {
                    inner.owners.remove(&owner);
                }
            }
            slot
        };
        // Descriptors close outside the lock.
        drop(released);
        debug!(%owner, handle, "closed handle");
    }

    /// Release every handle `owner` still holds. Returns how many were released.
    pub fn release_owner(&self, owner: OwnerId) -> usize {
        let handles = self.inner.lock().owners.remove(&owner).unwrap_or_default();
        let count = handles.len();
        for handle in handles {
            // Owner entry is gone already; only the slot is left.
            let slot = {
                let mut inner = self.inner.lock();
                if inner.files.get(&handle).is_some_and(|s| s.owner == owner) {
                    inner.files.remove(&handle)
                } else {
                    None
                }
            };
            drop(slot);
        }
        debug!(%owner, count, "released handles of departed owner");
        count
    }

    /// Number of handles currently open across all owners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().files.len()
    }

    /// Whether no handle is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of handles `owner` currently holds.
    #[must_use]
    pub fn owned_by(&self, owner: OwnerId) -> usize {
        self.inner
            .lock()
            .owners
            .get(&owner)
            .map_or(0, FxHashSet::len)
    }
}
