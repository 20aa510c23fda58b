pub mod config;
pub mod store;

pub use config::StoreConfig;
pub use store::{
    BlockFlags, BlockHandle, BlockNr, BlockStore, DEFAULT_PAGE_SIZE, DirtyState, InputPoll,
    OpenMode, StoreError, StoreId, StoreRegistry, StoreResult, StoreStats, SyncFlags, release_all,
};
