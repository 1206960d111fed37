//! End-to-end coin spending: maturity, signatures, fees, and double spends.

use ed25519_dalek::SigningKey;

use karst_chain::{ChainstateManager, ChainstateManagerOptions, ContextBuilder};
use karst_core::constants::{block_subsidy, COINBASE_MATURITY};
use karst_core::types::{OutPoint, ScriptPubkey, Transaction};
use karst_tests::helpers::{
    anyone_can_spend, keypair, make_coinbase, make_spend, mine, next_block, sign_v1, sign_v2,
    v1_program, v2_program,
};

fn mem_manager(dir: &std::path::Path) -> ChainstateManager {
    let context = ContextBuilder::new().build();
    let options = ChainstateManagerOptions::new(context, dir.join("data"), dir.join("blocks"))
        .block_tree_db_in_memory(true)
        .chainstate_db_in_memory(true);
    ChainstateManager::new(options).unwrap()
}

/// A chain with one coin locked by `lock` at height 1, matured past the
/// coinbase maturity window.
struct Harness {
    _dir: tempfile::TempDir,
    manager: ChainstateManager,
    key: SigningKey,
    coin: OutPoint,
    value: u64,
}

fn matured_coin(lock: impl FnOnce(&SigningKey) -> ScriptPubkey) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = mem_manager(dir.path());
    let key = keypair(7);

    let coinbase = make_coinbase(1, block_subsidy(1), lock(&key));
    let coin = OutPoint {
        txid: coinbase.txid(),
        vout: 0,
    };
    let block = next_block(&manager, vec![coinbase]);
    assert_eq!(manager.process_block(&block).unwrap(), (true, true));

    mine(&mut manager, COINBASE_MATURITY - 1);
    assert_eq!(manager.tip_height(), Some(COINBASE_MATURITY));

    Harness {
        _dir: dir,
        manager,
        key,
        coin,
        value: block_subsidy(1),
    }
}

/// Connect a block containing `spend` on top of the harness chain, with the
/// coinbase claiming the subsidy plus `claimed_fee`.
fn connect_spend(harness: &mut Harness, spend: Transaction, claimed_fee: u64) -> (bool, bool) {
    let height = harness.manager.tip_height().unwrap() + 1;
    let coinbase = make_coinbase(
        height,
        block_subsidy(height) + claimed_fee,
        anyone_can_spend(),
    );
    let block = next_block(&harness.manager, vec![coinbase, spend]);
    harness.manager.process_block(&block).unwrap()
}

const FEE: u64 = 1_000;

#[test]
fn v1_program_spend_with_valid_signature() {
    let mut harness = matured_coin(v1_program);
    let mut spend = make_spend(harness.coin, harness.value - FEE, anyone_can_spend());
    spend.inputs[0].script_sig = sign_v1(&harness.key, &spend, 0, harness.value);

    let coins_before = harness.manager.coin_count().unwrap();
    assert_eq!(connect_spend(&mut harness, spend, FEE), (true, true));
    // One coin spent, two created.
    assert_eq!(harness.manager.coin_count().unwrap(), coins_before + 1);

    // The undo record preserves the spent coin's value and origin height.
    let entry = harness.manager.block_index().tip().unwrap().clone();
    let undo = harness.manager.read_block_undo(&entry).unwrap();
    assert_eq!(undo.tx_count(), 2);
    assert_eq!(undo.tx_spent_count(0), 0);
    assert_eq!(undo.tx_spent_count(1), 1);
    let spent = undo.spent_output(1, 0).unwrap();
    assert_eq!(spent.output.value, harness.value);
    assert_eq!(spent.height, 1);
    // Probes outside the recorded data stay quiet.
    assert_eq!(undo.tx_spent_count(9), 0);
    assert!(undo.spent_output(1, 1).is_none());
    assert_eq!(undo.spent_output_height(9, 9), 0);
}

#[test]
fn v2_program_spend_with_valid_signature() {
    let mut harness = matured_coin(v2_program);
    let spent_output = karst_core::types::TxOutput {
        value: harness.value,
        script_pubkey: v2_program(&harness.key),
    };
    let mut spend = make_spend(harness.coin, harness.value - FEE, anyone_can_spend());
    spend.inputs[0].script_sig = sign_v2(&harness.key, &spend, 0, &[spent_output]);

    assert_eq!(connect_spend(&mut harness, spend, FEE), (true, true));
}

#[test]
fn wrong_key_is_rejected() {
    let mut harness = matured_coin(v1_program);
    let wrong_key = keypair(8);
    let mut spend = make_spend(harness.coin, harness.value - FEE, anyone_can_spend());
    spend.inputs[0].script_sig = sign_v1(&wrong_key, &spend, 0, harness.value);

    let tip = harness.manager.tip_hash();
    assert_eq!(connect_spend(&mut harness, spend, FEE), (false, false));
    assert_eq!(harness.manager.tip_hash(), tip);
}

#[test]
fn signature_over_the_wrong_amount_is_rejected() {
    let mut harness = matured_coin(v1_program);
    let mut spend = make_spend(harness.coin, harness.value - FEE, anyone_can_spend());
    // The version-1 digest commits to the spent amount.
    spend.inputs[0].script_sig = sign_v1(&harness.key, &spend, 0, harness.value - 1);

    assert_eq!(connect_spend(&mut harness, spend, FEE), (false, false));
}

#[test]
fn coinbase_overclaiming_the_fee_is_rejected() {
    let mut harness = matured_coin(v1_program);
    let mut spend = make_spend(harness.coin, harness.value - FEE, anyone_can_spend());
    spend.inputs[0].script_sig = sign_v1(&harness.key, &spend, 0, harness.value);

    assert_eq!(connect_spend(&mut harness, spend, FEE + 1), (false, false));
}

#[test]
fn double_spend_within_a_block_is_rejected() {
    let mut harness = matured_coin(|_| anyone_can_spend());
    let first = make_spend(harness.coin, harness.value - FEE, anyone_can_spend());
    let second = make_spend(harness.coin, harness.value - 2 * FEE, anyone_can_spend());

    let height = harness.manager.tip_height().unwrap() + 1;
    let coinbase = make_coinbase(height, block_subsidy(height), anyone_can_spend());
    let block = next_block(&harness.manager, vec![coinbase, first, second]);
    assert_eq!(harness.manager.process_block(&block).unwrap(), (false, false));
}

#[test]
fn chained_spend_within_a_block_is_accepted() {
    let mut harness = matured_coin(|_| anyone_can_spend());
    let first = make_spend(harness.coin, harness.value - FEE, anyone_can_spend());
    let second = make_spend(
        OutPoint {
            txid: first.txid(),
            vout: 0,
        },
        harness.value - 2 * FEE,
        anyone_can_spend(),
    );

    let height = harness.manager.tip_height().unwrap() + 1;
    let coinbase = make_coinbase(height, block_subsidy(height) + 2 * FEE, anyone_can_spend());
    let block = next_block(&harness.manager, vec![coinbase, first, second]);
    assert_eq!(harness.manager.process_block(&block).unwrap(), (true, true));
}

#[test]
fn immature_coinbase_spend_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = mem_manager(dir.path());

    let coinbase = make_coinbase(1, block_subsidy(1), anyone_can_spend());
    let coin = OutPoint {
        txid: coinbase.txid(),
        vout: 0,
    };
    let block = next_block(&manager, vec![coinbase]);
    assert_eq!(manager.process_block(&block).unwrap(), (true, true));

    let spend = make_spend(coin, block_subsidy(1) - FEE, anyone_can_spend());
    let coinbase2 = make_coinbase(2, block_subsidy(2) + FEE, anyone_can_spend());
    let block2 = next_block(&manager, vec![coinbase2, spend]);
    assert_eq!(manager.process_block(&block2).unwrap(), (false, false));
    assert_eq!(manager.tip_height(), Some(1));
}

#[test]
fn spending_a_missing_coin_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = mem_manager(dir.path());

    let spend = make_spend(
        OutPoint {
            txid: karst_core::types::Hash256([0xAA; 32]),
            vout: 0,
        },
        1,
        anyone_can_spend(),
    );
    let coinbase = make_coinbase(1, block_subsidy(1), anyone_can_spend());
    let block = next_block(&manager, vec![coinbase, spend]);
    assert_eq!(manager.process_block(&block).unwrap(), (false, false));
}

#[test]
fn genesis_subsidy_is_unspendable() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = mem_manager(dir.path());
    mine(&mut manager, COINBASE_MATURITY);

    let genesis = karst_core::genesis::genesis_block(karst_core::params::ChainType::Regtest);
    let coin = OutPoint {
        txid: genesis.transactions[0].txid(),
        vout: 0,
    };
    let spend = make_spend(coin, 1, anyone_can_spend());
    let height = manager.tip_height().unwrap() + 1;
    let coinbase = make_coinbase(height, block_subsidy(height), anyone_can_spend());
    let block = next_block(&manager, vec![coinbase, spend]);
    assert_eq!(manager.process_block(&block).unwrap(), (false, false));
}
