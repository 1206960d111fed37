//! # karst-chain — Block index, chainstate, and persistent stores.
//!
//! The stateful half of the kernel:
//! - [`chainstate::ChainstateManager`] — validates and connects blocks
//! - [`block_index::BlockIndex`] — in-memory index over the connected chain
//! - [`block_file::FlatFileStore`] — framed on-disk block and undo files
//! - [`store`] — block-tree and coin databases, RocksDB or in-memory
//! - [`context::Context`] — chain parameters plus notification sinks

pub mod block_file;
pub mod block_index;
pub mod chainstate;
pub mod context;
pub mod error;
pub mod notifications;
pub mod options;
pub mod store;
pub mod undo;
pub mod validation;

pub use block_index::{BlockIndex, IndexEntry};
pub use chainstate::ChainstateManager;
pub use context::{Context, ContextBuilder};
pub use error::{KernelError, OptionsError, StoreError};
pub use notifications::{
    BlockValidationResult, BlockValidationState, KernelWarning, Notifications, SynchronizationState,
    ValidationInterface, ValidationMode,
};
pub use options::ChainstateManagerOptions;
pub use undo::{BlockUndo, SpentOutput, TxUndo};
