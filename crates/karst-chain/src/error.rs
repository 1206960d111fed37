//! Error types for the chain crates.

use thiserror::Error;

/// Storage backend failures. These are fatal to the owning manager.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("block file error: {0}")]
    BlockFile(#[from] std::io::Error),
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
}

/// Invalid chainstate manager option combinations, rejected at build time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    #[error("wiping the block tree requires wiping the chainstate as well")]
    WipeMismatch,
}

/// Top-level kernel error.
#[derive(Error, Debug)]
pub enum KernelError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Options(#[from] OptionsError),
    #[error("manager is unusable after a fatal storage error")]
    Poisoned,
    #[error("codec error: {0}")]
    Codec(#[from] karst_core::error::CodecError),
    #[error("internal error: {0}")]
    Internal(String),
}
