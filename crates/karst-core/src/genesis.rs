//! Deterministic genesis blocks, one per network.
//!
//! Each network gets its own coinbase message and timestamp, so the genesis
//! hashes differ across networks. All values are hardcoded; every node
//! computes identical genesis blocks.

use std::sync::LazyLock;

use crate::constants::INITIAL_SUBSIDY;
use crate::merkle;
use crate::params::{ChainType, EXPECTED_BITS};
use crate::types::{Block, BlockHeader, Hash256, OutPoint, ScriptPubkey, Transaction, TxInput, TxOutput};

/// Genesis timestamp: March 1, 2026 00:00:00 UTC.
pub const GENESIS_TIMESTAMP: u32 = 1_772_323_200;

static MAINNET: LazyLock<Block> =
    LazyLock::new(|| build_genesis(b"Karst mainnet. Stone wears, water remembers. 2026.", 0));
static TESTNET: LazyLock<Block> =
    LazyLock::new(|| build_genesis(b"Karst testnet 2026.", 1));
static SIGNET: LazyLock<Block> =
    LazyLock::new(|| build_genesis(b"Karst signet 2026.", 2));
static REGTEST: LazyLock<Block> =
    LazyLock::new(|| build_genesis(b"Karst regtest.", 3));

fn build_genesis(message: &[u8], time_offset: u32) -> Block {
    let coinbase = Transaction {
        version: 1,
        inputs: vec![TxInput {
            previous_output: OutPoint::null(),
            script_sig: message.to_vec(),
            sequence: 0xFFFF_FFFF,
        }],
        outputs: vec![TxOutput {
            value: INITIAL_SUBSIDY,
            // OP_RETURN: the genesis subsidy is unspendable.
            script_pubkey: ScriptPubkey(vec![0x6A]),
        }],
        lock_time: 0,
    };
    let merkle_root = merkle::merkle_root(&[coinbase.txid()]);

    Block {
        header: BlockHeader {
            version: 1,
            prev_hash: Hash256::ZERO,
            merkle_root,
            time: GENESIS_TIMESTAMP + time_offset,
            bits: EXPECTED_BITS,
            nonce: 0,
        },
        transactions: vec![coinbase],
    }
}

/// The genesis block for a network (height 0).
pub fn genesis_block(chain: ChainType) -> &'static Block {
    match chain {
        ChainType::Mainnet => &MAINNET,
        ChainType::Testnet => &TESTNET,
        ChainType::Signet => &SIGNET,
        ChainType::Regtest => &REGTEST,
    }
}

/// The genesis block hash for a network.
pub fn genesis_hash(chain: ChainType) -> Hash256 {
    genesis_block(chain).hash()
}
