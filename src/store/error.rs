use std::io;
use thiserror::Error;

use super::BlockNr;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("No backing file attached")]
    NoBackingFile,

    #[error("Backing file already attached: {0}")]
    AlreadyAttached(String),

    #[error("Swap file already exists (symlink attack?): {0}")]
    SymlinkRejected(String),

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("Block not found: nr={0}")]
    BlockNotFound(BlockNr),

    #[error("Invalid block handle: slot={0}")]
    InvalidHandle(usize),

    #[error("Block was not locked: nr={0}")]
    NotLocked(BlockNr),

    #[error("Short read in swap file at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid page size: {0}")]
    InvalidPageSize(usize),

    #[error("Invalid page count: {0}")]
    InvalidPageCount(usize),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
