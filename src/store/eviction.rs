//! Releasing memory under pressure.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::block_store::BlockStore;

impl BlockStore {
    /// Drop every unlocked block that is clean or can be written out.
    ///
    /// Returns whether any block was released. Does nothing without a backing
    /// file.
    pub fn evict_unlocked(&mut self) -> bool {
        if self.file.is_none() {
            return false;
        }

        let mut candidates = self.index.handles_mru();
        let mut released = false;
        let mut i = 0;
        while i < candidates.len() {
            let handle = candidates[i];
            let Some(flags) = self.blocks.get(handle).map(|b| b.flags) else {
                candidates.remove(i);
                continue;
            };

            if !flags.locked && (!flags.dirty || self.write_block(handle).is_ok()) {
                if let Some(block) = self.blocks.remove(handle) {
                    self.index.remove(block.nr);
                    debug!(nr = block.nr, "evicted block");
                }
                // Stay at `i`: the next candidate has moved into this position.
                candidates.remove(i);
                released = true;
            } else {
                i += 1;
            }
        }
        released
    }
}

/// Release as much memory as possible across `stores`.
///
/// Each item pairs a store with the path of a swap file to create for it when
/// it is still memory-only; creating that file is best-effort. Returns whether
/// any block was released, so a failing allocation knows whether retrying can
/// help.
pub fn release_all<'a, I>(stores: I) -> bool
where
    I: IntoIterator<Item = (&'a mut BlockStore, Option<&'a Path>)>,
{
    let mut released = false;
    for (store, swap_path) in stores {
        if !store.has_backing_file()
            && let Some(path) = swap_path
            && let Err(e) = store.open_file(path)
        {
            warn!(path = %path.display(), error = %e, "cannot create swap file to release memory");
        }

        if store.evict_unlocked() {
            released = true;
        }
    }
    released
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(usize);

struct RegisteredStore {
    store: BlockStore,
    swap_path: Option<PathBuf>,
}

/// Every open store, for [`StoreRegistry::release_all`] to walk
#[derive(Default)]
pub struct StoreRegistry {
    stores: BTreeMap<StoreId, RegisteredStore>,
    next_id: usize,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `store`. `swap_path` is where a swap file may be
    /// created for it under memory pressure.
    pub fn register(&mut self, store: BlockStore, swap_path: Option<PathBuf>) -> StoreId {
        let id = StoreId(self.next_id);
        self.next_id += 1;
        self.stores.insert(id, RegisteredStore { store, swap_path });
        id
    }

    /// Hand a store back, e.g. to close it
    pub fn deregister(&mut self, id: StoreId) -> Option<BlockStore> {
        self.stores.remove(&id).map(|entry| entry.store)
    }

    pub fn get(&self, id: StoreId) -> Option<&BlockStore> {
        self.stores.get(&id).map(|entry| &entry.store)
    }

    pub fn get_mut(&mut self, id: StoreId) -> Option<&mut BlockStore> {
        self.stores.get_mut(&id).map(|entry| &mut entry.store)
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// [`release_all`] over every registered store
    pub fn release_all(&mut self) -> bool {
        release_all(
            self.stores
                .values_mut()
                .map(|RegisteredStore { store, swap_path }| (store, swap_path.as_deref())),
        )
    }
}
