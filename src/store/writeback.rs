//! Moving block contents between memory and the backing file.

use std::ops::BitOr;

use tracing::{debug, error, trace, warn};

use super::BlockNr;
use super::block::{Block, BlockHandle};
use super::block_store::{BlockStore, DirtyState};
use super::error::{StoreError, StoreResult};

/// Options for [`BlockStore::sync`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncFlags(u8);

impl SyncFlags {
    pub const NONE: Self = Self(0);
    /// Also write blocks that still have a volatile id.
    pub const ALL: Self = Self(1);
    /// Stop once input is available, after at least one block.
    pub const STOP: Self = Self(1 << 1);
    /// fsync the file after writing.
    pub const FLUSH: Self = Self(1 << 2);
    /// Only write block 0.
    pub const ZERO: Self = Self(1 << 3);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SyncFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Non-blocking check for pending user input
pub trait InputPoll {
    fn input_available(&mut self) -> bool;
}

impl<F: FnMut() -> bool> InputPoll for F {
    fn input_available(&mut self) -> bool {
        self()
    }
}

impl BlockStore {
    /// Fill `block` from its pages in the backing file
    pub(crate) fn read_block(&mut self, block: &mut Block) -> StoreResult<()> {
        let file = self.file.as_mut().ok_or(StoreError::NoBackingFile)?;
        let offset = self.page_size as u64 * block.nr as u64;
        file.read_at(offset, &mut block.data)?;
        self.pages_read += block.page_count as u64;
        Ok(())
    }

    /// Write a block to its place in the backing file.
    ///
    /// A volatile block is translated first. The file never gets a hole: when
    /// the block lies beyond the pages already in the file, every position in
    /// between is written first, from the block cached there or, failing that,
    /// with the first page of this block as filler. A locked block is never
    /// used for a gap; its position gets filler too and the block itself stays
    /// dirty.
    pub(crate) fn write_block(&mut self, handle: BlockHandle) -> StoreResult<()> {
        if self.file.is_none() {
            return Err(StoreError::NoBackingFile);
        }

        let target_nr = self.translate(handle)?;
        loop {
            let (nr, source) = if target_nr > self.infile_count {
                let nr = self.infile_count;
                let cached = self
                    .index
                    .peek(nr)
                    .filter(|h| self.blocks.get(*h).is_some_and(|b| !b.flags.locked));
                (nr, cached)
            } else {
                (target_nr, Some(handle))
            };

            let written = self.write_pages(nr, handle, source);
            let page_count = match written {
                Ok(page_count) => page_count,
                Err(e) => {
                    // Mostly a full disk: report once and keep on trying.
                    if self.write_error_reported {
                        debug!(nr, error = %e, "write error in swap file");
                    } else {
                        error!(nr, error = %e, "write error in swap file");
                    }
                    self.write_error_reported = true;
                    return Err(e);
                }
            };
            self.write_error_reported = false;
            self.pages_written += page_count as u64;

            if let Some(source) = source
                && let Some(block) = self.blocks.get_mut(source)
            {
                block.flags.dirty = false;
            }
            if nr + page_count as BlockNr > self.infile_count {
                self.infile_count = nr + page_count as BlockNr;
            }
            if nr == target_nr {
                return Ok(());
            }
        }
    }

    /// Write the pages at position `nr` from `source`, or one filler page from
    /// `filler` when nothing usable is cached there. Returns the page count.
    fn write_pages(
        &mut self,
        nr: BlockNr,
        filler: BlockHandle,
        source: Option<BlockHandle>,
    ) -> StoreResult<usize> {
        let file = self.file.as_mut().ok_or(StoreError::NoBackingFile)?;
        let (data, page_count) = match source.and_then(|h| self.blocks.get(h)) {
            Some(block) => (&block.data[..], block.page_count),
            None => {
                let block = self
                    .blocks
                    .get(filler)
                    .ok_or(StoreError::InvalidHandle(filler.as_usize()))?;
                trace!(nr, filler = block.nr, "filling gap in swap file");
                let end = self.page_size.min(block.data.len());
                (&block.data[..end], 1)
            }
        };

        let offset = self.page_size as u64 * nr as u64;
        file.write_at(offset, data)?;
        Ok(page_count)
    }

    /// Write dirty blocks to the backing file, most recently used first.
    ///
    /// Without [`SyncFlags::ALL`] volatile blocks are left alone. Locked blocks
    /// are never written. After a failed write, only blocks within the
    /// existing file are still attempted; the pass stops at the first block
    /// beyond it or at a second failure. The store becomes clean only when the
    /// whole index was walked without failure.
    pub fn sync(&mut self, flags: SyncFlags) -> StoreResult<()> {
        self.sync_with_poll(flags, &mut || false)
    }

    /// [`Self::sync`], polling `input` after each written block when
    /// [`SyncFlags::STOP`] is set
    pub fn sync_with_poll(
        &mut self,
        flags: SyncFlags,
        input: &mut impl InputPoll,
    ) -> StoreResult<()> {
        if self.file.is_none() {
            return Err(StoreError::NoBackingFile);
        }

        let mut failure: Option<StoreError> = None;
        let mut complete = true;
        for handle in self.index.handles_mru() {
            let Some(block) = self.blocks.get(handle) else {
                continue;
            };
            let nr = block.nr;
            if !block.flags.dirty || !(flags.contains(SyncFlags::ALL) || nr >= 0) {
                continue;
            }
            if flags.contains(SyncFlags::ZERO) && nr != 0 {
                continue;
            }
            if block.flags.locked {
                complete = false;
                continue;
            }
            if failure.is_some() && !(nr >= 0 && nr < self.infile_count) {
                complete = false;
                break;
            }

            if let Err(e) = self.write_block(handle) {
                if failure.is_some() {
                    complete = false;
                    break;
                }
                failure = Some(e);
            }

            if flags.contains(SyncFlags::STOP) && input.input_available() {
                debug!("input available, stopping sync");
                complete = false;
                break;
            }
        }

        if complete && failure.is_none() {
            self.dirty = DirtyState::Clean;
        }

        if flags.contains(SyncFlags::FLUSH)
            && let Some(file) = &mut self.file
            && let Err(e) = file.sync_all()
        {
            warn!(error = %e, "fsync of swap file failed");
            if failure.is_none() {
                failure = Some(e);
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Mark every block with a durable id dirty, so that the next sync writes
    /// all of them, e.g. into a freshly attached file
    pub fn mark_all_dirty(&mut self) {
        for block in self.blocks.iter_mut().filter(|b| b.nr >= 0) {
            block.flags.dirty = true;
        }
        self.dirty = DirtyState::Dirty;
    }

    /// New input arrived: report the next write error again
    pub fn note_user_input(&mut self) {
        self.write_error_reported = false;
    }
}
