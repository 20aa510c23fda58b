use super::BlockNr;

/// A released run of pages, kept for reuse of its id and shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FreeBlock {
    pub(crate) nr: BlockNr,
    pub(crate) page_count: usize,
}

/// LIFO pool of released block descriptors. The head is the last element.
#[derive(Debug, Default)]
pub(crate) struct FreeList {
    entries: Vec<FreeBlock>,
}

impl FreeList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, entry: FreeBlock) {
        self.entries.push(entry);
    }

    #[cfg(test)]
    pub(crate) fn head(&self) -> Option<&FreeBlock> {
        self.entries.last()
    }

    /// Take `page_count` pages from the head entry if it is large enough.
    ///
    /// A larger head is split: the taken pages come from its front and the
    /// remainder stays in the list with its id advanced. An exact match
    /// consumes the entry.
    pub(crate) fn take_from_head(&mut self, page_count: usize) -> Option<BlockNr> {
        let head = self.entries.last_mut()?;
        if head.page_count < page_count {
            return None;
        }

        if head.page_count > page_count {
            let nr = head.nr;
            head.nr += page_count as BlockNr;
            head.page_count -= page_count;
            Some(nr)
        } else {
            self.entries.pop().map(|entry| entry.nr)
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
