//! Signature hash construction.
//!
//! Three generations, each committing to more of the spending context:
//!
//! - base: the transaction with every unlocking script blanked, plus the
//!   input index and hash type.
//! - v1 (version-1 programs): base commitment plus the value of the coin
//!   being spent.
//! - v2 (version-2 programs): base commitment plus every spent output
//!   (values and locking scripts), in input order.
//!
//! Each generation is domain-tagged, so a signature is only ever valid for
//! the generation it was produced for.

use karst_core::encoding::{self, Encodable};
use karst_core::types::{sha256d, Hash256, Transaction, TxOutput};

/// The only hash type currently defined.
pub const SIGHASH_ALL: u8 = 0x01;

const TAG_BASE: &[u8] = b"karst/sighash/base";
const TAG_V1: &[u8] = b"karst/sighash/v1";
const TAG_V2: &[u8] = b"karst/sighash/v2";

/// Encode `tx` with every input's unlocking script blanked.
fn blanked_tx(out: &mut Vec<u8>, tx: &Transaction) {
    let mut stripped = tx.clone();
    for input in &mut stripped.inputs {
        input.script_sig.clear();
    }
    stripped.encode_into(out);
}

fn common_prefix(tag: &[u8], tx: &Transaction, input_index: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(tag.len() + 64);
    buf.extend_from_slice(tag);
    blanked_tx(&mut buf, tx);
    encoding::write_u32(&mut buf, input_index as u32);
    buf
}

/// Base-generation sighash.
pub fn base_sighash(tx: &Transaction, input_index: usize, hash_type: u8) -> Hash256 {
    let mut buf = common_prefix(TAG_BASE, tx, input_index);
    buf.push(hash_type);
    sha256d(&buf)
}

/// Version-1 sighash: also commits to the spent coin's value.
pub fn v1_sighash(tx: &Transaction, input_index: usize, amount: u64, hash_type: u8) -> Hash256 {
    let mut buf = common_prefix(TAG_V1, tx, input_index);
    encoding::write_u64(&mut buf, amount);
    buf.push(hash_type);
    sha256d(&buf)
}

/// Version-2 sighash: also commits to every spent output.
pub fn v2_sighash(
    tx: &Transaction,
    input_index: usize,
    spent_outputs: &[TxOutput],
    hash_type: u8,
) -> Hash256 {
    let mut buf = common_prefix(TAG_V2, tx, input_index);
    encoding::write_u32(&mut buf, spent_outputs.len() as u32);
    for output in spent_outputs {
        output.encode_into(&mut buf);
    }
    buf.push(hash_type);
    sha256d(&buf)
}
