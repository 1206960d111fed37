//! Notification and validation sinks.
//!
//! Embedders subscribe to kernel events by implementing these traits and
//! registering them on the [`crate::context::Context`]. Every method has a
//! no-op default, so a sink only overrides what it cares about. Callbacks
//! run synchronously on the validating thread and should return quickly.

use karst_core::types::Block;

/// Where the node is in its life cycle when a tip notification fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SynchronizationState {
    /// Re-deriving state from local block files.
    InitReindex,
    /// Initial sync from an empty or stale chainstate.
    InitDownload,
    /// Steady state.
    PostInit,
}

/// Warning conditions that can be raised and later cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelWarning {
    UnknownNewRulesActivated,
    LargeWorkInvalidChain,
}

/// General kernel events.
pub trait Notifications: Send + Sync {
    /// The connected header chain advanced.
    fn header_tip(
        &self,
        _state: SynchronizationState,
        _height: u32,
        _timestamp: u32,
        _presync: bool,
    ) {
    }

    /// A warning condition was raised.
    fn warning_set(&self, _warning: KernelWarning, _message: &str) {}

    /// A previously raised warning cleared.
    fn warning_unset(&self, _warning: KernelWarning) {}

    /// A store flush failed. The manager will refuse further work.
    fn flush_error(&self, _message: &str) {}

    /// An unrecoverable internal error occurred.
    fn fatal_error(&self, _message: &str) {}
}

/// Sink that ignores every event.
pub struct NullNotifications;

impl Notifications for NullNotifications {}

/// How validation of a block concluded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationMode {
    Valid,
    Invalid,
    InternalError,
}

/// Why a block was rejected, when it was.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockValidationResult {
    /// Not yet determined, or the block was valid.
    Unset,
    /// Header proof of work is below the required target.
    HeaderLowWork,
    /// A consensus rule was violated.
    Consensus,
    /// The block was already marked invalid.
    CachedInvalid,
    /// The header itself is invalid.
    InvalidHeader,
    /// The block's transaction commitment does not match its header.
    Mutated,
    /// The predecessor is not known.
    MissingPrev,
    /// The predecessor is invalid.
    InvalidPrev,
    /// The timestamp is too far in the future.
    TimeFuture,
}

/// Outcome of checking one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockValidationState {
    pub mode: ValidationMode,
    pub result: BlockValidationResult,
}

impl BlockValidationState {
    pub fn valid() -> Self {
        Self {
            mode: ValidationMode::Valid,
            result: BlockValidationResult::Unset,
        }
    }

    pub fn invalid(result: BlockValidationResult) -> Self {
        Self {
            mode: ValidationMode::Invalid,
            result,
        }
    }

    pub fn internal_error() -> Self {
        Self {
            mode: ValidationMode::InternalError,
            result: BlockValidationResult::Unset,
        }
    }
}

/// Per-block validation events.
pub trait ValidationInterface: Send + Sync {
    /// Fired after every block check, accepted or not.
    fn block_checked(&self, _block: &Block, _state: &BlockValidationState) {}
}

/// Validation sink that ignores every event.
pub struct NullValidationInterface;

impl ValidationInterface for NullValidationInterface {}
