//! Block validation rules.
//!
//! Split in two stages the way the manager applies them: context-free checks
//! against the block alone ([`check_block`]), then contextual connection
//! against the UTXO set ([`connect_transactions`]) which also runs script
//! verification for every input on the caller's thread pool.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;

use karst_core::constants::{block_subsidy, COINBASE_MATURITY, MAX_BLOCK_SIZE};
use karst_core::merkle;
use karst_core::params::{ActivationHeights, ChainParams};
use karst_core::types::{Block, OutPoint, TxOutput};
use karst_script::flags::{
    VERIFY_CLTV, VERIFY_CSV, VERIFY_NULLDUMMY, VERIFY_P2SH, VERIFY_STRICTSIG, VERIFY_TAPROOT,
    VERIFY_WITNESS,
};

use crate::error::StoreError;
use crate::notifications::BlockValidationResult;
use crate::store::{Coin, CoinStore};
use crate::undo::{BlockUndo, SpentOutput, TxUndo};

/// A rejected block, with the rejection class and a stable reason string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidationFailure {
    pub result: BlockValidationResult,
    pub reason: &'static str,
}

impl ValidationFailure {
    fn consensus(reason: &'static str) -> Self {
        Self {
            result: BlockValidationResult::Consensus,
            reason,
        }
    }

    fn mutated(reason: &'static str) -> Self {
        Self {
            result: BlockValidationResult::Mutated,
            reason,
        }
    }
}

/// Script rule flags in force at a given height.
pub fn script_flags_at(activation: &ActivationHeights, height: u32) -> u32 {
    let mut flags = 0;
    for (rule_height, bit) in [
        (activation.p2sh, VERIFY_P2SH),
        (activation.strictsig, VERIFY_STRICTSIG),
        (activation.nulldummy, VERIFY_NULLDUMMY),
        (activation.cltv, VERIFY_CLTV),
        (activation.csv, VERIFY_CSV),
        (activation.witness, VERIFY_WITNESS),
        (activation.taproot, VERIFY_TAPROOT),
    ] {
        if height >= rule_height {
            flags |= bit;
        }
    }
    flags
}

/// Context-free block checks: structure, commitment, header rules.
pub fn check_block(block: &Block, params: &ChainParams, now: u32) -> Result<(), ValidationFailure> {
    if block.transactions.is_empty() {
        return Err(ValidationFailure::consensus("empty block"));
    }
    if block.to_bytes().len() > MAX_BLOCK_SIZE {
        return Err(ValidationFailure::consensus("oversized block"));
    }
    if !block.transactions[0].is_coinbase() {
        return Err(ValidationFailure::consensus("first transaction is not a coinbase"));
    }
    if block.transactions[1..].iter().any(|tx| tx.is_coinbase()) {
        return Err(ValidationFailure::consensus("multiple coinbases"));
    }

    let txids: Vec<_> = block.transactions.iter().map(|tx| tx.txid()).collect();
    let unique: HashSet<_> = txids.iter().collect();
    if unique.len() != txids.len() {
        return Err(ValidationFailure::mutated("duplicate transaction"));
    }
    if merkle::merkle_root(&txids) != block.header.merkle_root {
        return Err(ValidationFailure::mutated("merkle commitment mismatch"));
    }

    if !params.check_pow(&block.header) {
        return Err(ValidationFailure {
            result: BlockValidationResult::InvalidHeader,
            reason: "proof of work below target",
        });
    }
    if block.header.time > now.saturating_add(params.max_future_drift) {
        return Err(ValidationFailure {
            result: BlockValidationResult::TimeFuture,
            reason: "timestamp too far in the future",
        });
    }
    Ok(())
}

/// State changes produced by connecting a block.
pub struct ConnectData {
    pub spent: Vec<OutPoint>,
    pub created: Vec<(OutPoint, Coin)>,
    pub undo: BlockUndo,
}

/// Validate a block's transactions against the UTXO set at `height` and
/// compute the resulting state changes. Script checks for every input run in
/// parallel on `pool`.
pub fn connect_transactions(
    block: &Block,
    height: u32,
    coins: &dyn CoinStore,
    params: &ChainParams,
    pool: &rayon::ThreadPool,
) -> Result<Result<ConnectData, ValidationFailure>, StoreError> {
    let flags = script_flags_at(&params.activation, height);

    let mut spent: Vec<OutPoint> = Vec::new();
    let mut spent_set: HashSet<OutPoint> = HashSet::new();
    let mut created: Vec<(OutPoint, Coin)> = Vec::new();
    let mut overlay: HashMap<OutPoint, Coin> = HashMap::new();
    let mut undo = BlockUndo::default();
    // Per-transaction spent outputs, in input order, for script checks.
    let mut spent_per_tx: Vec<Vec<TxOutput>> = Vec::with_capacity(block.transactions.len());
    let mut fees: u64 = 0;

    for (tx_index, tx) in block.transactions.iter().enumerate() {
        let txid = tx.txid();
        let mut tx_undo = TxUndo::default();
        let mut tx_spent: Vec<TxOutput> = Vec::new();

        if tx_index > 0 {
            let mut input_total: u64 = 0;
            for input in &tx.inputs {
                let outpoint = input.previous_output;
                if spent_set.contains(&outpoint) {
                    return Ok(Err(ValidationFailure::consensus("double spend within block")));
                }
                let coin = match overlay.get(&outpoint) {
                    Some(coin) => coin.clone(),
                    None => match coins.coin(&outpoint)? {
                        Some(coin) => coin,
                        None => {
                            return Ok(Err(ValidationFailure::consensus(
                                "input spends a missing or spent coin",
                            )));
                        }
                    },
                };
                if coin.is_coinbase && height - coin.height < COINBASE_MATURITY {
                    return Ok(Err(ValidationFailure::consensus("immature coinbase spend")));
                }
                input_total = match input_total.checked_add(coin.output.value) {
                    Some(total) => total,
                    None => return Ok(Err(ValidationFailure::consensus("input value overflow"))),
                };
                tx_undo.spent.push(SpentOutput {
                    output: coin.output.clone(),
                    height: coin.height,
                });
                tx_spent.push(coin.output.clone());
                spent_set.insert(outpoint);
                spent.push(outpoint);
            }

            let Some(output_total) = tx.total_output_value() else {
                return Ok(Err(ValidationFailure::consensus("output value overflow")));
            };
            if output_total > input_total {
                return Ok(Err(ValidationFailure::consensus("outputs exceed inputs")));
            }
            fees = fees.saturating_add(input_total - output_total);
        }

        for (vout, output) in tx.outputs.iter().enumerate() {
            let outpoint = OutPoint {
                txid,
                vout: vout as u32,
            };
            let coin = Coin {
                output: output.clone(),
                height,
                is_coinbase: tx_index == 0,
            };
            overlay.insert(outpoint, coin.clone());
            created.push((outpoint, coin));
        }

        undo.txs.push(tx_undo);
        spent_per_tx.push(tx_spent);
    }

    let coinbase_total = block.transactions[0].total_output_value().unwrap_or(u64::MAX);
    if coinbase_total > block_subsidy(height).saturating_add(fees) {
        return Ok(Err(ValidationFailure::consensus(
            "coinbase exceeds subsidy plus fees",
        )));
    }

    // Script checks, one job per non-coinbase input.
    let jobs: Vec<(usize, usize)> = block.transactions[1..]
        .iter()
        .enumerate()
        .flat_map(|(offset, tx)| (0..tx.inputs.len()).map(move |i| (offset + 1, i)))
        .collect();

    let all_valid = pool.install(|| {
        jobs.par_iter().all(|&(tx_index, input_index)| {
            let tx = &block.transactions[tx_index];
            let spent_outputs = &spent_per_tx[tx_index];
            let spk = &spent_outputs[input_index].script_pubkey;
            let amount = spent_outputs[input_index].value;
            matches!(
                karst_script::verify_script(
                    spk.as_bytes(),
                    amount,
                    tx,
                    spent_outputs,
                    input_index,
                    flags,
                ),
                Ok(true)
            )
        })
    });
    if !all_valid {
        return Ok(Err(ValidationFailure::consensus("script verification failed")));
    }

    Ok(Ok(ConnectData {
        spent,
        created,
        undo,
    }))
}
