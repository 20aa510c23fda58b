use std::collections::HashMap;

use ahash::RandomState;

use super::BlockNr;

/// Old volatile id -> durable id it was rewritten to.
#[derive(Debug, Default)]
pub(crate) struct TranslationTable {
    map: HashMap<BlockNr, BlockNr, RandomState>,
}

impl TranslationTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, old_nr: BlockNr, new_nr: BlockNr) {
        self.map.insert(old_nr, new_nr);
    }

    /// Look up and drop the mapping for `old_nr`.
    pub(crate) fn take(&mut self, old_nr: BlockNr) -> Option<BlockNr> {
        self.map.remove(&old_nr)
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn clear(&mut self) {
        self.map.clear();
    }
}
