use super::BlockNr;

/// Handle to a live block descriptor.
///
/// Stays valid across id translation; becomes stale once the block is freed,
/// evicted, or its store is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHandle {
    slot: usize,
    generation: u32,
}

impl BlockHandle {
    pub fn as_usize(&self) -> usize {
        self.slot
    }
}

/// State bits of a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockFlags {
    /// Held by the caller; never written out nor evicted.
    pub locked: bool,
    /// Diverged from the backing file.
    pub dirty: bool,
}

impl BlockFlags {
    pub const LOCKED_DIRTY: Self = Self {
        locked: true,
        dirty: true,
    };
}

/// In-memory block descriptor
#[derive(Debug)]
pub(crate) struct Block {
    pub(crate) nr: BlockNr,
    pub(crate) page_count: usize,
    pub(crate) flags: BlockFlags,
    pub(crate) data: Vec<u8>,
}

impl Block {
    /// Create a block with a zero-filled buffer of `page_count` pages
    pub(crate) fn new_zeroed(nr: BlockNr, page_count: usize, page_size: usize) -> Self {
        Self {
            nr,
            page_count,
            flags: BlockFlags::default(),
            data: vec![0u8; page_count * page_size],
        }
    }
}

struct Slot {
    generation: u32,
    block: Option<Block>,
}

/// Owns every live block; handed out slots are recycled with a bumped generation.
#[derive(Default)]
pub(crate) struct BlockArena {
    slots: Vec<Slot>,
    vacant: Vec<usize>,
    live: usize,
}

impl BlockArena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, block: Block) -> BlockHandle {
        self.live += 1;
        if let Some(slot) = self.vacant.pop() {
            let entry = &mut self.slots[slot];
            entry.block = Some(block);
            return BlockHandle {
                slot,
                generation: entry.generation,
            };
        }

        self.slots.push(Slot {
            generation: 0,
            block: Some(block),
        });
        BlockHandle {
            slot: self.slots.len() - 1,
            generation: 0,
        }
    }

    pub(crate) fn get(&self, handle: BlockHandle) -> Option<&Block> {
        self.slots
            .get(handle.slot)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.block.as_ref())
    }

    pub(crate) fn get_mut(&mut self, handle: BlockHandle) -> Option<&mut Block> {
        self.slots
            .get_mut(handle.slot)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.block.as_mut())
    }

    pub(crate) fn remove(&mut self, handle: BlockHandle) -> Option<Block> {
        let slot = self
            .slots
            .get_mut(handle.slot)
            .filter(|s| s.generation == handle.generation)?;
        let block = slot.block.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.vacant.push(handle.slot);
        self.live -= 1;
        Some(block)
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Block> {
        self.slots.iter_mut().filter_map(|s| s.block.as_mut())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Block> {
        self.slots.iter().filter_map(|s| s.block.as_ref())
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.vacant.clear();
        self.live = 0;
    }
}
