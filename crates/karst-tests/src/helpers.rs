//! Shared builders for the kernel integration tests.

use ed25519_dalek::{Signer, SigningKey};

use karst_chain::ChainstateManager;
use karst_core::constants::block_subsidy;
use karst_core::genesis::GENESIS_TIMESTAMP;
use karst_core::merkle;
use karst_core::params::EXPECTED_BITS;
use karst_core::types::*;
use karst_script::sighash::{self, SIGHASH_ALL};

/// Deterministic signing key from a seed byte.
pub fn keypair(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

/// Version-1 key program: `0x51 0x20 <key>`.
pub fn v1_program(key: &SigningKey) -> ScriptPubkey {
    let mut script = vec![0x51, 0x20];
    script.extend_from_slice(key.verifying_key().as_bytes());
    ScriptPubkey(script)
}

/// Version-2 key program: `0x52 0x20 <key>`.
pub fn v2_program(key: &SigningKey) -> ScriptPubkey {
    let mut script = vec![0x52, 0x20];
    script.extend_from_slice(key.verifying_key().as_bytes());
    ScriptPubkey(script)
}

/// `OP_1`: anyone can spend.
pub fn anyone_can_spend() -> ScriptPubkey {
    ScriptPubkey(vec![0x51])
}

/// Coinbase with a height marker so every block's txid is distinct.
pub fn make_coinbase(height: u32, value: u64, script_pubkey: ScriptPubkey) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxInput {
            previous_output: OutPoint::null(),
            script_sig: height.to_le_bytes().to_vec(),
            sequence: 0xFFFF_FFFF,
        }],
        outputs: vec![TxOutput {
            value,
            script_pubkey,
        }],
        lock_time: 0,
    }
}

/// Single-input spend with an empty unlocking script.
pub fn make_spend(outpoint: OutPoint, value: u64, script_pubkey: ScriptPubkey) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxInput {
            previous_output: outpoint,
            script_sig: vec![],
            sequence: 0xFFFF_FFFF,
        }],
        outputs: vec![TxOutput {
            value,
            script_pubkey,
        }],
        lock_time: 0,
    }
}

/// Block over `txs` with a correct merkle commitment.
pub fn make_block(prev_hash: Hash256, time: u32, txs: Vec<Transaction>) -> Block {
    let txids: Vec<Hash256> = txs.iter().map(|tx| tx.txid()).collect();
    Block {
        header: BlockHeader {
            version: 1,
            prev_hash,
            merkle_root: merkle::merkle_root(&txids),
            time,
            bits: EXPECTED_BITS,
            nonce: 0,
        },
        transactions: txs,
    }
}

/// Build the next block on the manager's tip from `txs`.
pub fn next_block(manager: &ChainstateManager, txs: Vec<Transaction>) -> Block {
    let height = manager.tip_height().expect("chain has a tip") + 1;
    let prev = manager.tip_hash().expect("chain has a tip");
    make_block(prev, GENESIS_TIMESTAMP + height, txs)
}

/// Extend the chain with `count` anyone-can-spend coinbase blocks.
pub fn mine(manager: &mut ChainstateManager, count: u32) {
    for _ in 0..count {
        let height = manager.tip_height().expect("chain has a tip") + 1;
        let coinbase = make_coinbase(height, block_subsidy(height), anyone_can_spend());
        let block = next_block(manager, vec![coinbase]);
        let (accepted, new_block) = manager.process_block(&block).expect("no storage errors");
        assert!(accepted && new_block, "mined block at height {height} rejected");
    }
}

/// Unlocking script for a key program: one push of `sig || hash_type`.
pub fn program_unlock(signature: &ed25519_dalek::Signature) -> Vec<u8> {
    let mut script = Vec::with_capacity(66);
    script.push(65);
    script.extend_from_slice(&signature.to_bytes());
    script.push(SIGHASH_ALL);
    script
}

/// Unlocking script for input `index` of `tx` against a version-1 program.
///
/// Sign before filling in any unlocking scripts; the digest commits to the
/// transaction with all of them blanked, so the order does not matter.
pub fn sign_v1(key: &SigningKey, tx: &Transaction, index: usize, amount: u64) -> Vec<u8> {
    let digest = sighash::v1_sighash(tx, index, amount, SIGHASH_ALL);
    program_unlock(&key.sign(digest.as_bytes()))
}

/// Unlocking script for input `index` of `tx` against a version-2 program.
pub fn sign_v2(
    key: &SigningKey,
    tx: &Transaction,
    index: usize,
    spent_outputs: &[TxOutput],
) -> Vec<u8> {
    let digest = sighash::v2_sighash(tx, index, spent_outputs, SIGHASH_ALL);
    program_unlock(&key.sign(digest.as_bytes()))
}
