//! Script verification rule flags.
//!
//! Bit positions are part of the stable kernel interface; gaps are reserved
//! for retired or not-yet-adopted rules.

use crate::error::ScriptVerifyError;

/// No rules beyond basic script evaluation.
pub const VERIFY_NONE: u32 = 0;
/// Evaluate pay-to-script-hash redeem scripts.
pub const VERIFY_P2SH: u32 = 1 << 0;
/// Require the strict 65-byte signature encoding with hash type `0x01`.
pub const VERIFY_STRICTSIG: u32 = 1 << 2;
/// Require the multisig dummy element to be empty.
pub const VERIFY_NULLDUMMY: u32 = 1 << 4;
/// Enforce OP_CHECKLOCKTIMEVERIFY.
pub const VERIFY_CLTV: u32 = 1 << 9;
/// Enforce OP_CHECKSEQUENCEVERIFY.
pub const VERIFY_CSV: u32 = 1 << 10;
/// Enforce version-1 key programs (amount-committing signatures).
pub const VERIFY_WITNESS: u32 = 1 << 11;
/// Enforce version-2 key programs (signatures over all spent outputs).
pub const VERIFY_TAPROOT: u32 = 1 << 17;

/// Rules in force before version-1 programs.
pub const VERIFY_ALL_PRE_SEGWIT: u32 =
    VERIFY_P2SH | VERIFY_STRICTSIG | VERIFY_NULLDUMMY | VERIFY_CLTV | VERIFY_CSV;
/// Rules in force before version-2 programs.
pub const VERIFY_ALL_PRE_TAPROOT: u32 = VERIFY_ALL_PRE_SEGWIT | VERIFY_WITNESS;
/// Every supported rule.
pub const VERIFY_ALL: u32 = VERIFY_ALL_PRE_TAPROOT | VERIFY_TAPROOT;

/// Reject unknown bits and inconsistent combinations.
///
/// Version-1 programs build on script-hash evaluation and version-2 programs
/// build on version-1 sighashing, so each flag requires its base.
pub fn validate(flags: u32) -> Result<(), ScriptVerifyError> {
    if flags & !VERIFY_ALL != 0 {
        return Err(ScriptVerifyError::InvalidFlags);
    }
    if flags & VERIFY_WITNESS != 0 && flags & VERIFY_P2SH == 0 {
        return Err(ScriptVerifyError::InvalidFlagsCombination);
    }
    if flags & VERIFY_TAPROOT != 0 && flags & VERIFY_WITNESS == 0 {
        return Err(ScriptVerifyError::InvalidFlagsCombination);
    }
    Ok(())
}
