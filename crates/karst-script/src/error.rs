//! Script verification call errors.
//!
//! These cover misuse of the verification interface. A script that merely
//! fails its rules is reported as `Ok(false)` by the verifier, never as one
//! of these.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptVerifyError {
    #[error("unknown verification flag bits")]
    InvalidFlags,
    #[error("inconsistent verification flag combination")]
    InvalidFlagsCombination,
    #[error("input index out of range for the spending transaction")]
    TxInputIndex,
    #[error("spent outputs are required for version-2 program verification")]
    SpentOutputsRequired,
    #[error("spent outputs count does not match the transaction input count")]
    SpentOutputsMismatch,
}
