//! Paged block storage with spill-over to a swap file
//!
//! A store hands out blocks of one or more pages under signed ids. Ids `>= 0`
//! are page offsets in the backing file; negative ids are in-memory only until
//! translated. Unlocked blocks can be written back and evicted at any time.

mod backing_file;
mod block;
mod block_index;
mod block_store;
mod error;
mod eviction;
mod free_list;
mod translation;
mod writeback;

pub use backing_file::OpenMode;
pub use block::{BlockFlags, BlockHandle};
pub use block_store::{BlockStore, DirtyState, StoreStats};
pub use error::{StoreError, StoreResult};
pub use eviction::{StoreId, StoreRegistry, release_all};
pub use writeback::{InputPoll, SyncFlags};

/// Page size used when the device block size is unknown or unsuitable
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Smallest device block size adopted as page size
pub const MIN_PAGE_SIZE: usize = 1048;

/// Largest device block size adopted as page size
pub const MAX_PAGE_SIZE: usize = 50000;

/// Block id; equals the page offset in the file when non-negative
pub type BlockNr = i64;
