use lru::LruCache;

use super::BlockNr;
use super::block::BlockHandle;

/// Block id -> live block, iterated most recently touched first.
pub(crate) struct BlockIndex {
    cache: LruCache<BlockNr, BlockHandle>,
}

impl BlockIndex {
    pub(crate) fn new() -> Self {
        Self {
            cache: LruCache::unbounded(),
        }
    }

    /// Insert (or re-key onto) `nr` as the most recently used entry
    pub(crate) fn insert(&mut self, nr: BlockNr, handle: BlockHandle) {
        self.cache.put(nr, handle);
    }

    /// Look up `nr` and move it to the front
    pub(crate) fn touch(&mut self, nr: BlockNr) -> Option<BlockHandle> {
        self.cache.get(&nr).copied()
    }

    /// Look up `nr` without refreshing its recency
    pub(crate) fn peek(&self, nr: BlockNr) -> Option<BlockHandle> {
        self.cache.peek(&nr).copied()
    }

    pub(crate) fn remove(&mut self, nr: BlockNr) -> Option<BlockHandle> {
        self.cache.pop(&nr)
    }

    pub(crate) fn len(&self) -> usize {
        self.cache.len()
    }

    /// Snapshot of all handles, most recently used first.
    ///
    /// Write-back may re-key entries while walking, so callers iterate the
    /// snapshot rather than the live cache.
    pub(crate) fn handles_mru(&self) -> Vec<BlockHandle> {
        self.cache.iter().map(|(_, handle)| *handle).collect()
    }

    pub(crate) fn clear(&mut self) {
        self.cache.clear();
    }
}
