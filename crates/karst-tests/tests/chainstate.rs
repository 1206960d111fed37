//! Chainstate manager lifecycle: genesis bootstrap, block ingestion,
//! rejection reporting, and block read-back.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use karst_chain::{
    BlockValidationResult, BlockValidationState, ChainstateManager, ChainstateManagerOptions,
    ContextBuilder, Notifications, SynchronizationState, ValidationInterface, ValidationMode,
};
use karst_core::constants::block_subsidy;
use karst_core::genesis::{genesis_hash, GENESIS_TIMESTAMP};
use karst_core::params::ChainType;
use karst_core::types::{Block, Hash256};
use karst_tests::helpers::{anyone_can_spend, make_block, make_coinbase, mine, next_block};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn manager(dir: &Path) -> ChainstateManager {
    init_tracing();
    let context = ContextBuilder::new().build();
    ChainstateManager::new(ChainstateManagerOptions::new(
        context,
        dir.join("data"),
        dir.join("blocks"),
    ))
    .unwrap()
}

fn mem_manager(dir: &Path) -> ChainstateManager {
    init_tracing();
    let context = ContextBuilder::new().build();
    let options = ChainstateManagerOptions::new(context, dir.join("data"), dir.join("blocks"))
        .block_tree_db_in_memory(true)
        .chainstate_db_in_memory(true);
    ChainstateManager::new(options).unwrap()
}

#[test]
fn fresh_manager_connects_genesis() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    assert_eq!(manager.tip_height(), Some(0));
    assert_eq!(manager.tip_hash(), Some(genesis_hash(ChainType::Regtest)));
    assert_eq!(manager.block_index().len(), 1);
    assert_eq!(manager.coin_count().unwrap(), 1);
}

#[test]
fn process_block_extends_the_chain() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = mem_manager(dir.path());

    let block = next_block(
        &manager,
        vec![make_coinbase(1, block_subsidy(1), anyone_can_spend())],
    );
    assert_eq!(manager.process_block(&block).unwrap(), (true, true));
    assert_eq!(manager.tip_height(), Some(1));
    assert_eq!(manager.tip_hash(), Some(block.hash()));
}

#[test]
fn duplicate_block_is_accepted_but_not_new() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = mem_manager(dir.path());

    let block = next_block(
        &manager,
        vec![make_coinbase(1, block_subsidy(1), anyone_can_spend())],
    );
    assert_eq!(manager.process_block(&block).unwrap(), (true, true));
    let count_before = manager.coin_count().unwrap();

    assert_eq!(manager.process_block(&block).unwrap(), (true, false));
    assert_eq!(manager.tip_height(), Some(1));
    assert_eq!(manager.coin_count().unwrap(), count_before);
}

#[test]
fn duplicate_genesis_is_accepted_but_not_new() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = mem_manager(dir.path());
    let genesis = karst_core::genesis::genesis_block(ChainType::Regtest).clone();
    assert_eq!(manager.process_block(&genesis).unwrap(), (true, false));
}

#[test]
fn connected_blocks_read_back_byte_exact() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = manager(dir.path());

    let block = next_block(
        &manager,
        vec![make_coinbase(1, block_subsidy(1), anyone_can_spend())],
    );
    manager.process_block(&block).unwrap();

    let entry = manager.block_index().by_height(1).unwrap().clone();
    let read = manager.read_block(&entry).unwrap();
    assert_eq!(read.to_bytes(), block.to_bytes());

    // The coinbase spends nothing, so its undo entry is empty.
    let undo = manager.read_block_undo(&entry).unwrap();
    assert_eq!(undo.tx_count(), 1);
    assert_eq!(undo.tx_spent_count(0), 0);
}

#[test]
fn mainnet_manager_connects_its_own_genesis() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let context = ContextBuilder::new().chain_type(ChainType::Mainnet).build();
    let options = ChainstateManagerOptions::new(
        context,
        dir.path().join("data"),
        dir.path().join("blocks"),
    )
    .block_tree_db_in_memory(true)
    .chainstate_db_in_memory(true);
    let mut manager = ChainstateManager::new(options).unwrap();

    assert_eq!(manager.tip_hash(), Some(genesis_hash(ChainType::Mainnet)));

    let block = next_block(
        &manager,
        vec![make_coinbase(1, block_subsidy(1), anyone_can_spend())],
    );
    assert_eq!(manager.process_block(&block).unwrap(), (true, true));
    let entry = manager.block_index().tip().unwrap().clone();
    assert_eq!(
        manager.read_block(&entry).unwrap().to_bytes(),
        block.to_bytes()
    );
}

#[test]
fn block_index_traversal_follows_the_chain() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = mem_manager(dir.path());
    mine(&mut manager, 3);

    let index = manager.block_index();
    let genesis = index.genesis().unwrap();
    assert_eq!(genesis.height, 0);
    assert!(index.prev(genesis).is_none());

    let tip = index.tip().unwrap();
    assert_eq!(tip.height, 3);
    assert!(index.next(tip).is_none());

    // Walking back from the tip reaches genesis in height order.
    let mut cursor = tip;
    for expected in (0..3).rev() {
        cursor = index.prev(cursor).unwrap();
        assert_eq!(cursor.height, expected);
    }
    assert_eq!(cursor.hash, genesis.hash);
}

#[test]
fn in_memory_databases_create_no_directories() {
    let dir = tempfile::tempdir().unwrap();
    let manager = mem_manager(dir.path());
    assert_eq!(manager.tip_height(), Some(0));

    // Flat files always land on disk; the database directories must not.
    assert!(dir.path().join("blocks").join("blk00000.dat").exists());
    assert!(!dir.path().join("blocks").join("index").exists());
    assert!(!dir.path().join("data").join("chainstate").exists());
}

#[test]
fn removed_block_file_degrades_to_none() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = manager(dir.path());
    mine(&mut manager, 1);

    let entry = manager.block_index().by_height(1).unwrap().clone();
    assert!(manager.read_block(&entry).is_some());

    std::fs::remove_file(dir.path().join("blocks").join("blk00000.dat")).unwrap();
    assert!(manager.read_block(&entry).is_none());
}

/// Validation sink that records every reported state.
struct CaptureValidation(Mutex<Vec<BlockValidationState>>);

impl CaptureValidation {
    fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(Vec::new())))
    }

    fn last(&self) -> BlockValidationState {
        *self.0.lock().last().expect("at least one report")
    }
}

impl ValidationInterface for CaptureValidation {
    fn block_checked(&self, _block: &Block, state: &BlockValidationState) {
        self.0.lock().push(*state);
    }
}

/// Notification sink that records tip heights.
struct CaptureTips(Mutex<Vec<(SynchronizationState, u32)>>);

impl Notifications for CaptureTips {
    fn header_tip(&self, state: SynchronizationState, height: u32, _timestamp: u32, _presync: bool) {
        self.0.lock().push((state, height));
    }
}

fn sink_manager(
    dir: &Path,
    validation: Arc<dyn ValidationInterface>,
    notifications: Arc<dyn Notifications>,
) -> ChainstateManager {
    init_tracing();
    let context = ContextBuilder::new()
        .validation(validation)
        .notifications(notifications)
        .build();
    let options = ChainstateManagerOptions::new(context, dir.join("data"), dir.join("blocks"))
        .block_tree_db_in_memory(true)
        .chainstate_db_in_memory(true);
    ChainstateManager::new(options).unwrap()
}

#[test]
fn rejections_reach_the_validation_sink() {
    let dir = tempfile::tempdir().unwrap();
    let capture = CaptureValidation::new();
    let tips = Arc::new(CaptureTips(Mutex::new(Vec::new())));
    let mut manager = sink_manager(dir.path(), capture.clone(), tips.clone());

    // Genesis connected during construction.
    assert_eq!(capture.last().mode, ValidationMode::Valid);
    assert!(tips.0.lock().contains(&(SynchronizationState::PostInit, 0)));

    // Wrong difficulty bits.
    let mut bad_pow = next_block(
        &manager,
        vec![make_coinbase(1, block_subsidy(1), anyone_can_spend())],
    );
    bad_pow.header.bits = 0x1D00_FFFF;
    assert_eq!(manager.process_block(&bad_pow).unwrap(), (false, false));
    assert_eq!(capture.last().result, BlockValidationResult::InvalidHeader);

    // Unknown predecessor.
    let orphan = make_block(
        Hash256([9; 32]),
        GENESIS_TIMESTAMP + 1,
        vec![make_coinbase(1, block_subsidy(1), anyone_can_spend())],
    );
    assert_eq!(manager.process_block(&orphan).unwrap(), (false, false));
    assert_eq!(capture.last().result, BlockValidationResult::MissingPrev);

    // Timestamp beyond the allowed drift.
    let mut future = next_block(
        &manager,
        vec![make_coinbase(1, block_subsidy(1), anyone_can_spend())],
    );
    future.header.time = u32::MAX;
    assert_eq!(manager.process_block(&future).unwrap(), (false, false));
    assert_eq!(capture.last().result, BlockValidationResult::TimeFuture);

    // Mutated commitment.
    let mut mutated = next_block(
        &manager,
        vec![make_coinbase(1, block_subsidy(1), anyone_can_spend())],
    );
    mutated.header.merkle_root = Hash256([0xFF; 32]);
    assert_eq!(manager.process_block(&mutated).unwrap(), (false, false));
    assert_eq!(capture.last().result, BlockValidationResult::Mutated);

    // A valid block still connects after the rejections.
    mine(&mut manager, 1);
    assert_eq!(capture.last().mode, ValidationMode::Valid);
    assert!(tips.0.lock().contains(&(SynchronizationState::PostInit, 1)));
}
