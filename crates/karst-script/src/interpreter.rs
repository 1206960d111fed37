//! Script execution and the verification entry point.
//!
//! Classic scripts run through a byte-opcode stack machine. Version-1 and
//! version-2 key programs bypass the machine entirely when their rule flag is
//! active: the locking script names an Ed25519 key and the unlocking script
//! is a single push of the signature. With the rule flag off, a program
//! evaluates as an ordinary script (a small-integer push plus a key push),
//! which accepts unconditionally. That fallback is what makes acceptance
//! monotone as flags are removed.

use ed25519_dalek::{Signature, VerifyingKey};

use karst_core::constants::MAX_SCRIPT_SIZE;
use karst_core::types::{Hash256, Transaction, TxOutput};

use crate::error::ScriptVerifyError;
use crate::flags::{self, VERIFY_CLTV, VERIFY_CSV, VERIFY_NULLDUMMY, VERIFY_P2SH, VERIFY_STRICTSIG, VERIFY_TAPROOT, VERIFY_WITNESS};
use crate::sighash;

// Opcodes. Values 0x01..=0x4B push that many immediate bytes.
pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4C;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_NOP: u8 = 0x61;
pub const OP_VERIFY: u8 = 0x69;
pub const OP_RETURN: u8 = 0x6A;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH256: u8 = 0xAA;
pub const OP_CHECKSIG: u8 = 0xAC;
pub const OP_CHECKSIGVERIFY: u8 = 0xAD;
pub const OP_CHECKMULTISIG: u8 = 0xAE;
pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xB1;
pub const OP_CHECKSEQUENCEVERIFY: u8 = 0xB2;

const MAX_DIRECT_PUSH: u8 = 0x4B;
const MAX_STACK_DEPTH: usize = 1_000;
const MAX_MULTISIG_KEYS: u32 = 20;

/// Version-1 program: `OP_1 <32-byte key>`.
const PROGRAM_V1: u8 = OP_1;
/// Version-2 program: `OP_2 <32-byte key>`.
const PROGRAM_V2: u8 = 0x52;

/// Verify one input of `tx` against the locking script of the coin it spends.
///
/// `amount` is the value of the spent coin. `spent_outputs` carries every
/// coin the transaction spends, in input order; it may be empty unless
/// version-2 rules are active. Returns `Ok(false)` for any script-content
/// rejection and reserves `Err` for interface misuse.
pub fn verify_script(
    script_pubkey: &[u8],
    amount: u64,
    tx: &Transaction,
    spent_outputs: &[TxOutput],
    input_index: usize,
    flags: u32,
) -> Result<bool, ScriptVerifyError> {
    flags::validate(flags)?;
    if input_index >= tx.inputs.len() {
        return Err(ScriptVerifyError::TxInputIndex);
    }
    if flags & VERIFY_TAPROOT != 0 && spent_outputs.is_empty() {
        return Err(ScriptVerifyError::SpentOutputsRequired);
    }
    if !spent_outputs.is_empty() && spent_outputs.len() != tx.inputs.len() {
        return Err(ScriptVerifyError::SpentOutputsMismatch);
    }

    Ok(execute(
        script_pubkey,
        amount,
        tx,
        spent_outputs,
        input_index,
        flags,
    ))
}

fn execute(
    script_pubkey: &[u8],
    amount: u64,
    tx: &Transaction,
    spent_outputs: &[TxOutput],
    input_index: usize,
    flags: u32,
) -> bool {
    let script_sig = tx.inputs[input_index].script_sig.as_slice();

    if flags & VERIFY_WITNESS != 0 {
        if let Some(key) = program_key(script_pubkey, PROGRAM_V1) {
            return check_program_spend(script_sig, key, flags, |hash_type| {
                sighash::v1_sighash(tx, input_index, amount, hash_type)
            });
        }
    }
    if flags & VERIFY_TAPROOT != 0 {
        if let Some(key) = program_key(script_pubkey, PROGRAM_V2) {
            return check_program_spend(script_sig, key, flags, |hash_type| {
                sighash::v2_sighash(tx, input_index, spent_outputs, hash_type)
            });
        }
    }

    let machine = Machine {
        tx,
        input_index,
        flags,
    };
    let mut stack: Vec<Vec<u8>> = Vec::new();
    if !machine.eval(script_sig, &mut stack) {
        return false;
    }
    // The unlocking-script stack survives for redeem-script evaluation.
    let sig_stack = stack.clone();
    if !machine.eval(script_pubkey, &mut stack) {
        return false;
    }
    if !top_is_true(&stack) {
        return false;
    }

    if flags & VERIFY_P2SH != 0 && is_script_hash(script_pubkey) {
        if !is_push_only(script_sig) {
            return false;
        }
        let mut stack = sig_stack;
        let Some(redeem) = stack.pop() else {
            return false;
        };
        if !machine.eval(&redeem, &mut stack) {
            return false;
        }
        return top_is_true(&stack);
    }
    true
}

/// Extract the key from a version program with the given version opcode.
fn program_key(script: &[u8], version: u8) -> Option<&[u8]> {
    if script.len() == 34 && script[0] == version && script[1] == 0x20 {
        Some(&script[2..])
    } else {
        None
    }
}

/// `OP_HASH256 <32-byte hash> OP_EQUAL`.
fn is_script_hash(script: &[u8]) -> bool {
    script.len() == 35 && script[0] == OP_HASH256 && script[1] == 0x20 && script[34] == OP_EQUAL
}

fn check_program_spend(
    script_sig: &[u8],
    key_bytes: &[u8],
    flags: u32,
    sighash: impl Fn(u8) -> Hash256,
) -> bool {
    let Some(sig_data) = single_push(script_sig) else {
        return false;
    };
    let Some((signature, hash_type)) = parse_signature(&sig_data, flags & VERIFY_STRICTSIG != 0)
    else {
        return false;
    };
    let Ok(key_array) = <[u8; 32]>::try_from(key_bytes) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key_array) else {
        return false;
    };
    let digest = sighash(hash_type);
    key.verify_strict(digest.as_bytes(), &signature).is_ok()
}

/// Split a signature blob into the Ed25519 signature and its hash type.
///
/// A bare 64-byte signature implies hash type `0x01`. Strict mode demands
/// the explicit 65-byte form with type `0x01`.
fn parse_signature(bytes: &[u8], strict: bool) -> Option<(Signature, u8)> {
    let (sig_bytes, hash_type) = match bytes.len() {
        64 if !strict => (&bytes[..64], sighash::SIGHASH_ALL),
        65 => {
            let hash_type = bytes[64];
            if strict && hash_type != sighash::SIGHASH_ALL {
                return None;
            }
            (&bytes[..64], hash_type)
        }
        _ => return None,
    };
    let array: [u8; 64] = sig_bytes.try_into().ok()?;
    Some((Signature::from_bytes(&array), hash_type))
}

/// If `script` is exactly one data push, return the pushed bytes.
fn single_push(script: &[u8]) -> Option<Vec<u8>> {
    let mut pushes = parse_pushes(script)?;
    if pushes.len() == 1 {
        pushes.pop()
    } else {
        None
    }
}

fn is_push_only(script: &[u8]) -> bool {
    parse_pushes(script).is_some()
}

/// Parse a script consisting only of data pushes. `None` if any other
/// opcode appears or a push runs past the end.
fn parse_pushes(script: &[u8]) -> Option<Vec<Vec<u8>>> {
    let mut pushes = Vec::new();
    let mut i = 0;
    while i < script.len() {
        let op = script[i];
        i += 1;
        match op {
            OP_0 => pushes.push(Vec::new()),
            1..=MAX_DIRECT_PUSH => {
                let len = op as usize;
                let data = script.get(i..i + len)?;
                pushes.push(data.to_vec());
                i += len;
            }
            OP_PUSHDATA1 => {
                let len = *script.get(i)? as usize;
                i += 1;
                let data = script.get(i..i + len)?;
                pushes.push(data.to_vec());
                i += len;
            }
            OP_1..=OP_16 => pushes.push(vec![op - OP_1 + 1]),
            _ => return None,
        }
    }
    Some(pushes)
}

fn top_is_true(stack: &[Vec<u8>]) -> bool {
    stack.last().is_some_and(|item| item.iter().any(|&b| b != 0))
}

/// Decode a stack item as an unsigned little-endian integer of at most
/// 4 bytes. Empty means zero.
fn item_as_u32(item: &[u8]) -> Option<u32> {
    if item.len() > 4 {
        return None;
    }
    let mut buf = [0u8; 4];
    buf[..item.len()].copy_from_slice(item);
    Some(u32::from_le_bytes(buf))
}

struct Machine<'a> {
    tx: &'a Transaction,
    input_index: usize,
    flags: u32,
}

impl Machine<'_> {
    /// Run `script` against `stack`. Returns false on any rule violation;
    /// the stack contents are unspecified after a failure.
    fn eval(&self, script: &[u8], stack: &mut Vec<Vec<u8>>) -> bool {
        if script.len() > MAX_SCRIPT_SIZE {
            return false;
        }

        let mut i = 0;
        while i < script.len() {
            if stack.len() > MAX_STACK_DEPTH {
                return false;
            }
            let op = script[i];
            i += 1;
            match op {
                OP_0 => stack.push(Vec::new()),
                1..=MAX_DIRECT_PUSH => {
                    let len = op as usize;
                    let Some(data) = script.get(i..i + len) else {
                        return false;
                    };
                    stack.push(data.to_vec());
                    i += len;
                }
                OP_PUSHDATA1 => {
                    let Some(&len) = script.get(i) else {
                        return false;
                    };
                    i += 1;
                    let Some(data) = script.get(i..i + len as usize) else {
                        return false;
                    };
                    stack.push(data.to_vec());
                    i += len as usize;
                }
                OP_1..=OP_16 => stack.push(vec![op - OP_1 + 1]),
                OP_NOP => {}
                OP_VERIFY => {
                    if !top_is_true(stack) {
                        return false;
                    }
                    stack.pop();
                }
                OP_RETURN => return false,
                OP_DROP => {
                    if stack.pop().is_none() {
                        return false;
                    }
                }
                OP_DUP => {
                    let Some(top) = stack.last().cloned() else {
                        return false;
                    };
                    stack.push(top);
                }
                OP_EQUAL | OP_EQUALVERIFY => {
                    let (Some(a), Some(b)) = (stack.pop(), stack.pop()) else {
                        return false;
                    };
                    let equal = a == b;
                    if op == OP_EQUALVERIFY {
                        if !equal {
                            return false;
                        }
                    } else {
                        stack.push(vec![u8::from(equal)]);
                    }
                }
                OP_HASH256 => {
                    let Some(top) = stack.pop() else {
                        return false;
                    };
                    stack.push(karst_core::types::sha256d(&top).as_bytes().to_vec());
                }
                OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                    let (Some(key), Some(sig)) = (stack.pop(), stack.pop()) else {
                        return false;
                    };
                    let ok = self.check_signature(&sig, &key);
                    if op == OP_CHECKSIGVERIFY {
                        if !ok {
                            return false;
                        }
                    } else {
                        stack.push(vec![u8::from(ok)]);
                    }
                }
                OP_CHECKMULTISIG => {
                    if !self.check_multisig(stack) {
                        return false;
                    }
                }
                OP_CHECKLOCKTIMEVERIFY => {
                    if self.flags & VERIFY_CLTV != 0 && !self.check_locktime(stack) {
                        return false;
                    }
                }
                OP_CHECKSEQUENCEVERIFY => {
                    if self.flags & VERIFY_CSV != 0 && !self.check_sequence(stack) {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        true
    }

    fn check_signature(&self, sig_bytes: &[u8], key_bytes: &[u8]) -> bool {
        let Some((signature, hash_type)) =
            parse_signature(sig_bytes, self.flags & VERIFY_STRICTSIG != 0)
        else {
            return false;
        };
        let Ok(key_array) = <[u8; 32]>::try_from(key_bytes) else {
            return false;
        };
        let Ok(key) = VerifyingKey::from_bytes(&key_array) else {
            return false;
        };
        let digest = sighash::base_sighash(self.tx, self.input_index, hash_type);
        key.verify_strict(digest.as_bytes(), &signature).is_ok()
    }

    /// `<dummy> <sig..k> <k> <key..n> <n> OP_CHECKMULTISIG`. Signatures must
    /// appear in key order.
    fn check_multisig(&self, stack: &mut Vec<Vec<u8>>) -> bool {
        let Some(n) = stack.pop().as_deref().and_then(item_as_u32) else {
            return false;
        };
        if n > MAX_MULTISIG_KEYS || stack.len() < n as usize {
            return false;
        }
        // split_off preserves push order, which is script order.
        let keys: Vec<Vec<u8>> = stack.split_off(stack.len() - n as usize);

        let Some(k) = stack.pop().as_deref().and_then(item_as_u32) else {
            return false;
        };
        if k > n || stack.len() < k as usize {
            return false;
        }
        let sigs: Vec<Vec<u8>> = stack.split_off(stack.len() - k as usize);

        let Some(dummy) = stack.pop() else {
            return false;
        };
        if self.flags & VERIFY_NULLDUMMY != 0 && !dummy.is_empty() {
            return false;
        }

        let mut ikey = 0;
        let mut isig = 0;
        let mut ok = true;
        while isig < sigs.len() {
            if ikey >= keys.len() {
                ok = false;
                break;
            }
            if self.check_signature(&sigs[isig], &keys[ikey]) {
                isig += 1;
            }
            ikey += 1;
            if sigs.len() - isig > keys.len() - ikey {
                ok = false;
                break;
            }
        }

        stack.push(vec![u8::from(ok)]);
        true
    }

    fn check_locktime(&self, stack: &[Vec<u8>]) -> bool {
        let Some(required) = stack.last().and_then(|item| item_as_u32(item)) else {
            return false;
        };
        if required > self.tx.lock_time {
            return false;
        }
        // A final sequence disables locktime semantics entirely.
        self.tx.inputs[self.input_index].sequence != u32::MAX
    }

    fn check_sequence(&self, stack: &[Vec<u8>]) -> bool {
        let Some(required) = stack.last().and_then(|item| item_as_u32(item)) else {
            return false;
        };
        let sequence = self.tx.inputs[self.input_index].sequence;
        if sequence == u32::MAX {
            return false;
        }
        required <= sequence
    }
}
