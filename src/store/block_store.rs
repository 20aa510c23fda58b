use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, trace, warn};

use super::backing_file::{BackingFile, OpenMode};
use super::block::{Block, BlockArena, BlockFlags, BlockHandle};
use super::block_index::BlockIndex;
use super::error::{StoreError, StoreResult};
use super::free_list::{FreeBlock, FreeList};
use super::translation::TranslationTable;
use super::BlockNr;
use crate::config::StoreConfig;

/// Whether a store has diverged from its backing file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DirtyState {
    /// Everything in the file is up to date.
    Clean,
    /// Blocks need writing and the next sync may fsync.
    Dirty,
    /// Blocks need writing, but an fsync is not wanted yet. Releasing dirty
    /// blocks keeps this state; only a complete sync leaves it.
    DirtyDeferred,
}

/// Snapshot of a store's counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub path: Option<PathBuf>,
    pub page_size: usize,
    pub blocknr_max: BlockNr,
    pub blocknr_min: BlockNr,
    pub neg_count: usize,
    pub infile_count: BlockNr,
    pub dirty_state: DirtyState,
    pub cached_blocks: usize,
    pub locked_blocks: usize,
    pub dirty_blocks: usize,
    pub free_list_len: usize,
    pub pending_translations: usize,
    pub pages_read: u64,
    pub pages_written: u64,
}

/// Paged block store spilling to an optional backing file.
///
/// Blocks with an id `>= 0` own a fixed place in the file: the id is the page
/// offset. Blocks with a negative id live in memory only until they are
/// translated to a durable id, which happens when they are written or when
/// the caller asks for it.
pub struct BlockStore {
    pub(crate) file: Option<BackingFile>,
    pub(crate) page_size: usize,
    /// Next durable id
    pub(crate) blocknr_max: BlockNr,
    /// Next volatile id, counting down from -1
    pub(crate) blocknr_min: BlockNr,
    /// Volatile ids handed out and not yet resolved or freed
    pub(crate) neg_count: usize,
    /// Pages known to exist in the file
    pub(crate) infile_count: BlockNr,
    pub(crate) dirty: DirtyState,
    pub(crate) blocks: BlockArena,
    pub(crate) index: BlockIndex,
    pub(crate) translations: TranslationTable,
    pub(crate) free_list: FreeList,
    /// A write failure was already logged and has not been cleared by a
    /// successful write or new input since
    pub(crate) write_error_reported: bool,
    pub(crate) pages_read: u64,
    pub(crate) pages_written: u64,
}

impl BlockStore {
    /// Open a store with the default configuration.
    ///
    /// Without a path the store runs memory-only.
    pub fn open(path: Option<&Path>, mode: OpenMode) -> StoreResult<Self> {
        Self::open_with_config(path, mode, &StoreConfig::default())
    }

    /// Open a store, adopting the device block size as page size when the
    /// configuration accepts it.
    ///
    /// With `OpenMode::Existing` the number of known pages is derived from the
    /// file length, rounded up to whole pages.
    pub fn open_with_config(
        path: Option<&Path>,
        mode: OpenMode,
        config: &StoreConfig,
    ) -> StoreResult<Self> {
        config.validate()?;

        let file = match path {
            None => None,
            Some(path) => match BackingFile::open(path, mode) {
                Ok(file) => Some(file),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot open swap file");
                    return Err(e);
                }
            },
        };

        let mut page_size = config.default_page_size;
        if config.probe_block_size
            && let Some(file) = &file
            && let Some(block_size) = file.device_block_size()
            && config.accepts_page_size(block_size)
        {
            page_size = block_size as usize;
        }

        let mut blocknr_max = 0;
        if mode == OpenMode::Existing
            && let Some(file) = &file
        {
            let size = file.len()?;
            blocknr_max = size.div_ceil(page_size as u64) as BlockNr;
        }

        debug!(page_size, blocknr_max, memory_only = file.is_none(), "opened block store");
        Ok(Self {
            file,
            page_size,
            blocknr_max,
            blocknr_min: -1,
            neg_count: 0,
            infile_count: blocknr_max,
            dirty: DirtyState::Clean,
            blocks: BlockArena::new(),
            index: BlockIndex::new(),
            translations: TranslationTable::new(),
            free_list: FreeList::new(),
            write_error_reported: false,
            pages_read: 0,
            pages_written: 0,
        })
    }

    /// Attach a newly created backing file to a memory-only store.
    ///
    /// The file must not exist yet. Every cached block with a durable id is
    /// marked dirty so the next sync writes all of it into the new file.
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> StoreResult<()> {
        if let Some(file) = &self.file {
            return Err(StoreError::AlreadyAttached(file.path().display().to_string()));
        }

        self.file = Some(BackingFile::open(path, OpenMode::CreateNew)?);
        self.infile_count = 0;
        self.mark_all_dirty();
        Ok(())
    }

    /// Detach and delete the backing file, continuing memory-only.
    ///
    /// Blocks not cached in memory are lost; get the ones still needed first.
    pub fn close_file(&mut self) -> StoreResult<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };

        self.infile_count = 0;
        let path = file.path().to_path_buf();
        let closed = file.close();
        if let Err(e) = &closed {
            error!(path = %path.display(), error = %e, "error closing swap file");
        }
        if let Err(e) = BackingFile::remove(&path) {
            warn!(path = %path.display(), error = %e, "cannot delete swap file");
        }
        closed
    }

    /// Close the store, optionally deleting its backing file.
    ///
    /// Every step runs even if closing the handle fails; the first failure is
    /// returned afterwards.
    pub fn close(mut self, delete_file: bool) -> StoreResult<()> {
        let mut result = Ok(());

        if let Some(file) = self.file.take() {
            let path = file.path().to_path_buf();
            if let Err(e) = file.close() {
                error!(path = %path.display(), error = %e, "error closing swap file");
                result = Err(e);
            }
            if delete_file && let Err(e) = BackingFile::remove(&path) {
                warn!(path = %path.display(), error = %e, "cannot delete swap file");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        debug!(
            blocks = self.blocks.len(),
            free = self.free_list.len(),
            "releasing block store"
        );
        self.index.clear();
        self.blocks.clear();
        self.free_list.clear();
        self.translations.clear();
        result
    }

    /// Create a new block of `page_count` pages, locked, dirty and zero-filled.
    ///
    /// A durable request reuses the head of the free list when it is large
    /// enough; a volatile request always gets a fresh negative id.
    pub fn allocate(&mut self, negative: bool, page_count: usize) -> StoreResult<BlockHandle> {
        if page_count == 0 {
            return Err(StoreError::InvalidPageCount(page_count));
        }

        let nr = if negative {
            let nr = self.blocknr_min;
            self.blocknr_min -= 1;
            self.neg_count += 1;
            nr
        } else {
            self.claim_durable_nr(page_count)
        };

        let mut block = Block::new_zeroed(nr, page_count, self.page_size);
        block.flags = BlockFlags::LOCKED_DIRTY;
        self.dirty = DirtyState::Dirty;

        let handle = self.blocks.insert(block);
        self.index.insert(nr, handle);
        trace!(nr, page_count, "allocated block");
        Ok(handle)
    }

    /// Lock the block with id `nr`, reading it from the file if it is not
    /// cached.
    ///
    /// Ids outside `(blocknr_min, blocknr_max)` are rejected without touching
    /// the disk. A stale volatile id must be passed through [`Self::resolve`]
    /// first.
    pub fn get(&mut self, nr: BlockNr, page_count: usize) -> StoreResult<BlockHandle> {
        if nr >= self.blocknr_max || nr <= self.blocknr_min {
            return Err(StoreError::BlockNotFound(nr));
        }

        if let Some(handle) = self.index.touch(nr)
            && let Some(block) = self.blocks.get_mut(handle)
        {
            block.flags.locked = true;
            return Ok(handle);
        }

        if nr < 0 || nr >= self.infile_count {
            return Err(StoreError::BlockNotFound(nr));
        }
        if page_count == 0 {
            return Err(StoreError::InvalidPageCount(page_count));
        }

        let mut block = Block::new_zeroed(nr, page_count, self.page_size);
        self.read_block(&mut block)?;
        block.flags.locked = true;

        let handle = self.blocks.insert(block);
        self.index.insert(nr, handle);
        Ok(handle)
    }

    /// Unlock a block.
    ///
    /// `dirty` schedules it for write-back. `want_infile` translates a
    /// volatile id right away so that recovery can find the block at a stable
    /// file position.
    ///
    /// Releasing a block that is not locked is a protocol violation: it is
    /// logged, the flag changes are still applied, and `NotLocked` is
    /// returned.
    pub fn put(&mut self, handle: BlockHandle, dirty: bool, want_infile: bool) -> StoreResult<()> {
        let block = self
            .blocks
            .get_mut(handle)
            .ok_or(StoreError::InvalidHandle(handle.as_usize()))?;

        let nr = block.nr;
        let was_locked = block.flags.locked;
        if !was_locked {
            error!(nr, "block was not locked");
        }
        block.flags.locked = false;
        if dirty {
            block.flags.dirty = true;
            if self.dirty != DirtyState::DirtyDeferred {
                self.dirty = DirtyState::Dirty;
            }
        }

        if want_infile {
            self.translate(handle)?;
        }

        if was_locked {
            Ok(())
        } else {
            Err(StoreError::NotLocked(nr))
        }
    }

    /// Drop a block.
    ///
    /// Durable ids go to the free list for reuse; volatile ids are never
    /// recycled.
    pub fn free(&mut self, handle: BlockHandle) -> StoreResult<()> {
        let block = self
            .blocks
            .remove(handle)
            .ok_or(StoreError::InvalidHandle(handle.as_usize()))?;
        self.index.remove(block.nr);

        if block.nr < 0 {
            self.neg_count = self.neg_count.saturating_sub(1);
        } else {
            self.free_list.push(FreeBlock {
                nr: block.nr,
                page_count: block.page_count,
            });
        }
        trace!(nr = block.nr, "freed block");
        Ok(())
    }

    /// Give a volatile block a durable id and remember the old one.
    ///
    /// Returns the block's (possibly unchanged) id.
    pub fn translate(&mut self, handle: BlockHandle) -> StoreResult<BlockNr> {
        let block = self
            .blocks
            .get(handle)
            .ok_or(StoreError::InvalidHandle(handle.as_usize()))?;
        let (old_nr, page_count) = (block.nr, block.page_count);
        if old_nr >= 0 {
            return Ok(old_nr);
        }

        let new_nr = self.claim_durable_nr(page_count);
        self.index.remove(old_nr);
        if let Some(block) = self.blocks.get_mut(handle) {
            block.nr = new_nr;
        }
        self.index.insert(new_nr, handle);
        self.translations.record(old_nr, new_nr);
        debug!(old_nr, new_nr, "translated block id");
        Ok(new_nr)
    }

    /// Look up and forget the durable id a volatile id was rewritten to.
    ///
    /// Returns `old_nr` unchanged if it was never translated or was already
    /// resolved.
    pub fn resolve(&mut self, old_nr: BlockNr) -> BlockNr {
        match self.translations.take(old_nr) {
            Some(new_nr) => {
                self.neg_count = self.neg_count.saturating_sub(1);
                new_nr
            }
            None => old_nr,
        }
    }

    /// Whether volatile ids are still waiting to be translated into a file
    pub fn needs_translation(&self) -> bool {
        self.file.is_some() && self.neg_count > 0
    }

    /// Move a dirty store to `DirtyDeferred`
    pub fn defer_sync(&mut self) {
        if self.dirty != DirtyState::Clean {
            self.dirty = DirtyState::DirtyDeferred;
        }
    }

    /// Adopt a page size learned after opening, e.g. from block 0
    pub fn set_page_size(&mut self, page_size: usize) -> StoreResult<()> {
        if page_size == 0 {
            return Err(StoreError::InvalidPageSize(page_size));
        }
        self.page_size = page_size;
        Ok(())
    }

    /// Make the backing-file path absolute, so that a later change of working
    /// directory does not break deleting it
    pub fn make_path_absolute(&mut self) -> StoreResult<()> {
        if let Some(file) = &mut self.file {
            let absolute = std::path::absolute(file.path())?;
            file.set_path(absolute);
        }
        Ok(())
    }

    /// Prefer the head of the free list, else extend past `blocknr_max`
    fn claim_durable_nr(&mut self, page_count: usize) -> BlockNr {
        match self.free_list.take_from_head(page_count) {
            Some(nr) => nr,
            None => {
                let nr = self.blocknr_max;
                self.blocknr_max += page_count as BlockNr;
                nr
            }
        }
    }

    /// Contents of a block, locked or not
    pub fn data(&self, handle: BlockHandle) -> StoreResult<&[u8]> {
        self.blocks
            .get(handle)
            .map(|b| b.data.as_slice())
            .ok_or(StoreError::InvalidHandle(handle.as_usize()))
    }

    /// Mutable contents of a locked block
    pub fn data_mut(&mut self, handle: BlockHandle) -> StoreResult<&mut [u8]> {
        let block = self
            .blocks
            .get_mut(handle)
            .ok_or(StoreError::InvalidHandle(handle.as_usize()))?;
        if !block.flags.locked {
            return Err(StoreError::NotLocked(block.nr));
        }
        Ok(&mut block.data)
    }

    /// Current id of a block; changes when the block is translated
    pub fn block_nr(&self, handle: BlockHandle) -> StoreResult<BlockNr> {
        self.block(handle).map(|b| b.nr)
    }

    /// Number of pages in a block
    pub fn page_count(&self, handle: BlockHandle) -> StoreResult<usize> {
        self.block(handle).map(|b| b.page_count)
    }

    /// Lock and dirty flags of a block
    pub fn flags(&self, handle: BlockHandle) -> StoreResult<BlockFlags> {
        self.block(handle).map(|b| b.flags)
    }

    /// Whether the block is locked; false for a stale handle
    pub fn is_locked(&self, handle: BlockHandle) -> bool {
        self.blocks.get(handle).is_some_and(|b| b.flags.locked)
    }

    /// Whether the block waits for write-back; false for a stale handle
    pub fn is_dirty(&self, handle: BlockHandle) -> bool {
        self.blocks.get(handle).is_some_and(|b| b.flags.dirty)
    }

    /// Cached block with id `nr`, without locking it or refreshing its recency
    pub fn lookup(&self, nr: BlockNr) -> Option<BlockHandle> {
        self.index.peek(nr)
    }

    fn block(&self, handle: BlockHandle) -> StoreResult<&Block> {
        self.blocks
            .get(handle)
            .ok_or(StoreError::InvalidHandle(handle.as_usize()))
    }

    /// Path of the backing file, if one is attached
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(BackingFile::path)
    }

    /// Whether the store spills to a file
    pub fn has_backing_file(&self) -> bool {
        self.file.is_some()
    }

    /// Size of one page in bytes
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Next durable id to hand out
    pub fn blocknr_max(&self) -> BlockNr {
        self.blocknr_max
    }

    /// Next volatile id to hand out
    pub fn blocknr_min(&self) -> BlockNr {
        self.blocknr_min
    }

    /// Volatile ids not yet resolved or freed
    pub fn neg_count(&self) -> usize {
        self.neg_count
    }

    /// Pages known to exist in the backing file
    pub fn infile_count(&self) -> BlockNr {
        self.infile_count
    }

    /// Whether the store has unwritten changes
    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    /// Number of blocks cached in memory
    pub fn block_count(&self) -> usize {
        self.index.len()
    }

    /// Number of entries on the free list
    pub fn free_list_len(&self) -> usize {
        self.free_list.len()
    }

    /// Snapshot of the store counters, e.g. for the CLI
    pub fn stats(&self) -> StoreStats {
        let (locked_blocks, dirty_blocks) =
            self.blocks.iter().fold((0, 0), |(locked, dirty), b| {
                (
                    locked + usize::from(b.flags.locked),
                    dirty + usize::from(b.flags.dirty),
                )
            });

        StoreStats {
            path: self.path().map(Path::to_path_buf),
            page_size: self.page_size,
            blocknr_max: self.blocknr_max,
            blocknr_min: self.blocknr_min,
            neg_count: self.neg_count,
            infile_count: self.infile_count,
            dirty_state: self.dirty,
            cached_blocks: self.index.len(),
            locked_blocks,
            dirty_blocks,
            free_list_len: self.free_list.len(),
            pending_translations: self.translations.len(),
            pages_read: self.pages_read,
            pages_written: self.pages_written,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DEFAULT_PAGE_SIZE, SyncFlags};
    use tempfile::TempDir;

    fn memory_store() -> BlockStore {
        BlockStore::open(None, OpenMode::CreateNew).unwrap()
    }

    fn setup_file_store() -> (TempDir, BlockStore) {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("test.swp");
        let store = BlockStore::open(Some(path.as_path()), OpenMode::CreateNew).unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_open_memory_only() {
        let store = memory_store();
        assert!(!store.has_backing_file());
        assert_eq!(store.page_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(store.blocknr_max(), 0);
        assert_eq!(store.blocknr_min(), -1);
        assert_eq!(store.infile_count(), 0);
        assert_eq!(store.dirty_state(), DirtyState::Clean);
    }

    #[test]
    fn test_open_file_store() {
        let (_temp_dir, store) = setup_file_store();
        let config = StoreConfig::default();
        assert!(store.has_backing_file());
        assert!(
            store.page_size() == config.default_page_size
                || config.accepts_page_size(store.page_size() as u64)
        );
        assert_eq!(store.blocknr_max(), 0);
    }

    #[test]
    fn test_open_existing_rounds_up() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("test.swp");
        std::fs::write(&path, vec![0u8; 2500]).unwrap();

        let config = StoreConfig {
            default_page_size: 1024,
            probe_block_size: false,
            ..StoreConfig::default()
        };
        let store = BlockStore::open_with_config(Some(path.as_path()), OpenMode::Existing, &config).unwrap();
        assert_eq!(store.page_size(), 1024);
        assert_eq!(store.blocknr_max(), 3);
        assert_eq!(store.infile_count(), 3);
    }

    #[test]
    fn test_open_truncate_ignores_length() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("test.swp");
        std::fs::write(&path, vec![0u8; 8192]).unwrap();

        let store = BlockStore::open(Some(path.as_path()), OpenMode::Truncate).unwrap();
        assert_eq!(store.blocknr_max(), 0);
    }

    #[test]
    fn test_open_missing_existing_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("missing.swp");
        assert!(BlockStore::open(Some(path.as_path()), OpenMode::Existing).is_err());
    }

    #[test]
    fn test_allocate_negative_ids_count_down() {
        let mut store = memory_store();
        let a = store.allocate(true, 1).unwrap();
        let b = store.allocate(true, 1).unwrap();
        assert_eq!(store.block_nr(a).unwrap(), -1);
        assert_eq!(store.block_nr(b).unwrap(), -2);
        assert_eq!(store.neg_count(), 2);
        assert_eq!(store.blocknr_min(), -3);
    }

    #[test]
    fn test_allocate_positive_advances_max() {
        let mut store = memory_store();
        let a = store.allocate(false, 3).unwrap();
        let b = store.allocate(false, 1).unwrap();
        assert_eq!(store.block_nr(a).unwrap(), 0);
        assert_eq!(store.block_nr(b).unwrap(), 3);
        assert_eq!(store.blocknr_max(), 4);
    }

    #[test]
    fn test_allocate_is_zeroed_locked_dirty() {
        let mut store = memory_store();
        let handle = store.allocate(false, 2).unwrap();
        let data = store.data(handle).unwrap();
        assert_eq!(data.len(), 2 * store.page_size());
        assert!(data.iter().all(|&b| b == 0));
        assert_eq!(store.flags(handle).unwrap(), BlockFlags::LOCKED_DIRTY);
        assert_eq!(store.dirty_state(), DirtyState::Dirty);
    }

    #[test]
    fn test_allocate_zero_pages() {
        let mut store = memory_store();
        assert!(matches!(
            store.allocate(false, 0),
            Err(StoreError::InvalidPageCount(0))
        ));
    }

    #[test]
    fn test_reused_block_is_zeroed() {
        let mut store = memory_store();
        let handle = store.allocate(false, 1).unwrap();
        store.data_mut(handle).unwrap().fill(0xAB);
        store.free(handle).unwrap();

        let handle = store.allocate(false, 1).unwrap();
        assert_eq!(store.block_nr(handle).unwrap(), 0);
        assert!(store.data(handle).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_free_list_split() {
        let mut store = memory_store();
        let big = store.allocate(false, 4).unwrap();
        store.free(big).unwrap();

        let a = store.allocate(false, 1).unwrap();
        let b = store.allocate(false, 3).unwrap();
        assert_eq!(store.block_nr(a).unwrap(), 0);
        assert_eq!(store.block_nr(b).unwrap(), 1);
        assert_eq!(store.free_list_len(), 0);
        assert_eq!(store.blocknr_max(), 4);
    }

    #[test]
    fn test_negative_request_skips_free_list() {
        let mut store = memory_store();
        let handle = store.allocate(false, 1).unwrap();
        store.free(handle).unwrap();

        let handle = store.allocate(true, 1).unwrap();
        assert_eq!(store.block_nr(handle).unwrap(), -1);
        assert_eq!(store.free_list_len(), 1);
    }

    #[test]
    fn test_free_negative_not_recycled() {
        let mut store = memory_store();
        let handle = store.allocate(true, 1).unwrap();
        store.free(handle).unwrap();

        assert_eq!(store.free_list_len(), 0);
        assert_eq!(store.neg_count(), 0);
        assert_eq!(store.block_count(), 0);
        assert!(matches!(store.free(handle), Err(StoreError::InvalidHandle(_))));
    }

    #[test]
    fn test_get_cached_relocks() {
        let mut store = memory_store();
        let handle = store.allocate(false, 1).unwrap();
        store.put(handle, true, false).unwrap();
        assert!(!store.is_locked(handle));

        let again = store.get(0, 1).unwrap();
        assert_eq!(again, handle);
        assert!(store.is_locked(handle));
    }

    #[test]
    fn test_get_out_of_range() {
        let mut store = memory_store();
        store.allocate(false, 1).unwrap();
        store.allocate(true, 1).unwrap();

        assert!(matches!(store.get(1, 1), Err(StoreError::BlockNotFound(1))));
        assert!(matches!(store.get(-2, 1), Err(StoreError::BlockNotFound(-2))));
    }

    #[test]
    fn test_get_uncached_negative_not_found() {
        let mut store = memory_store();
        let handle = store.allocate(true, 1).unwrap();
        store.allocate(true, 1).unwrap();
        store.free(handle).unwrap();

        assert!(matches!(store.get(-1, 1), Err(StoreError::BlockNotFound(-1))));
    }

    #[test]
    fn test_put_twice_is_protocol_violation() {
        let mut store = memory_store();
        let handle = store.allocate(true, 1).unwrap();

        store.put(handle, false, false).unwrap();
        let result = store.put(handle, true, false);
        assert!(matches!(result, Err(StoreError::NotLocked(-1))));
        // The flag change is applied anyway.
        assert!(store.is_dirty(handle));
        assert!(!store.is_locked(handle));
    }

    #[test]
    fn test_data_mut_requires_lock() {
        let mut store = memory_store();
        let handle = store.allocate(true, 1).unwrap();
        store.put(handle, true, false).unwrap();
        assert!(matches!(store.data_mut(handle), Err(StoreError::NotLocked(-1))));
    }

    #[test]
    fn test_put_keeps_deferred_state() {
        let mut store = memory_store();
        let handle = store.allocate(true, 1).unwrap();
        store.defer_sync();
        assert_eq!(store.dirty_state(), DirtyState::DirtyDeferred);

        store.put(handle, true, false).unwrap();
        assert_eq!(store.dirty_state(), DirtyState::DirtyDeferred);
    }

    #[test]
    fn test_defer_sync_on_clean_store() {
        let mut store = memory_store();
        store.defer_sync();
        assert_eq!(store.dirty_state(), DirtyState::Clean);
    }

    #[test]
    fn test_translate_and_resolve() {
        let mut store = memory_store();
        let handle = store.allocate(true, 2).unwrap();

        let new_nr = store.translate(handle).unwrap();
        assert_eq!(new_nr, 0);
        assert_eq!(store.block_nr(handle).unwrap(), 0);
        assert_eq!(store.lookup(0), Some(handle));
        assert_eq!(store.lookup(-1), None);
        assert_eq!(store.blocknr_max(), 2);

        assert_eq!(store.resolve(-1), 0);
        assert_eq!(store.neg_count(), 0);
        assert_eq!(store.resolve(-1), -1);
    }

    #[test]
    fn test_translate_positive_is_noop() {
        let mut store = memory_store();
        let handle = store.allocate(false, 1).unwrap();
        assert_eq!(store.translate(handle).unwrap(), 0);
        assert_eq!(store.resolve(0), 0);
    }

    #[test]
    fn test_translate_uses_free_list() {
        let mut store = memory_store();
        let durable = store.allocate(false, 2).unwrap();
        store.free(durable).unwrap();

        let handle = store.allocate(true, 1).unwrap();
        store.put(handle, true, true).unwrap();
        assert_eq!(store.block_nr(handle).unwrap(), 0);
        assert_eq!(store.free_list_len(), 1);
        assert_eq!(store.blocknr_max(), 2);
    }

    #[test]
    fn test_needs_translation() {
        let (_temp_dir, mut store) = setup_file_store();
        assert!(!store.needs_translation());

        let handle = store.allocate(true, 1).unwrap();
        assert!(store.needs_translation());

        store.put(handle, true, true).unwrap();
        assert!(store.needs_translation());
        store.resolve(-1);
        assert!(!store.needs_translation());
    }

    #[test]
    fn test_open_file_on_attached_store() {
        let (temp_dir, mut store) = setup_file_store();
        let result = store.open_file(temp_dir.path().join("other.swp"));
        assert!(matches!(result, Err(StoreError::AlreadyAttached(_))));
    }

    #[test]
    fn test_close_file_returns_to_memory_only() {
        let (temp_dir, mut store) = setup_file_store();
        let path = temp_dir.path().join("test.swp");
        let handle = store.allocate(true, 1).unwrap();

        store.close_file().unwrap();
        assert!(!store.has_backing_file());
        assert!(!path.exists());
        assert!(store.data(handle).is_ok());
    }

    #[test]
    fn test_reattach_writes_cached_content() {
        let temp_dir = tempfile::tempdir().unwrap();
        let first = temp_dir.path().join("first.swp");
        let second = temp_dir.path().join("second.swp");
        let config = StoreConfig {
            default_page_size: 2048,
            probe_block_size: false,
            ..StoreConfig::default()
        };
        let mut store = BlockStore::open_with_config(Some(first.as_path()), OpenMode::CreateNew, &config).unwrap();
        let kept = store.allocate(false, 1).unwrap();
        store.data_mut(kept).unwrap().fill(0x77);
        store.put(kept, true, false).unwrap();
        store.sync(SyncFlags::ALL).unwrap();
        assert!(!store.is_dirty(kept));

        store.close_file().unwrap();
        assert_eq!(store.infile_count(), 0);

        store.open_file(&second).unwrap();
        assert!(store.is_dirty(kept));
        let added = store.allocate(false, 1).unwrap();
        store.data_mut(added).unwrap().fill(0x11);
        store.put(added, true, false).unwrap();
        store.sync(SyncFlags::ALL).unwrap();

        assert_eq!(store.infile_count(), 2);
        assert!(!store.is_dirty(kept));
        assert_eq!(store.dirty_state(), DirtyState::Clean);
        let bytes = std::fs::read(&second).unwrap();
        assert_eq!(bytes.len(), 2 * 2048);
        assert!(bytes[..2048].iter().all(|&b| b == 0x77));
        assert!(bytes[2048..].iter().all(|&b| b == 0x11));
    }

    #[test]
    fn test_close_deletes_file() {
        let (temp_dir, store) = setup_file_store();
        let path = temp_dir.path().join("test.swp");
        store.close(true).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_close_keeps_file() {
        let (temp_dir, store) = setup_file_store();
        let path = temp_dir.path().join("test.swp");
        store.close(false).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_make_path_absolute() {
        let (_temp_dir, mut store) = setup_file_store();
        store.make_path_absolute().unwrap();
        assert!(store.path().unwrap().is_absolute());
    }

    #[test]
    fn test_set_page_size() {
        let mut store = memory_store();
        store.set_page_size(1024).unwrap();
        assert_eq!(store.page_size(), 1024);
        assert!(matches!(
            store.set_page_size(0),
            Err(StoreError::InvalidPageSize(0))
        ));
    }

    #[test]
    fn test_stats() {
        let mut store = memory_store();
        let a = store.allocate(true, 1).unwrap();
        store.allocate(false, 1).unwrap();
        store.put(a, true, false).unwrap();

        let stats = store.stats();
        assert_eq!(stats.cached_blocks, 2);
        assert_eq!(stats.locked_blocks, 1);
        assert_eq!(stats.dirty_blocks, 2);
        assert_eq!(stats.neg_count, 1);
        assert_eq!(stats.path, None);
    }
}
