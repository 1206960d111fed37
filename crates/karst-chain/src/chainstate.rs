//! The chainstate manager: block ingestion, persistence, and replay.
//!
//! One manager owns one data directory. Block connection is strictly
//! sequential; only the per-input script checks inside a block fan out to
//! the worker pool. A fatal storage error poisons the manager, which then
//! refuses further work.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use karst_core::logging::{self, LogCategory, LogLevel};
use karst_core::types::{Block, Hash256};

use crate::block_file::{scan_path, FileKind, FilePos, FlatFileStore};
use crate::block_index::{BlockIndex, IndexEntry};
use crate::context::Context;
use crate::error::{KernelError, StoreError};
use crate::notifications::{BlockValidationResult, BlockValidationState, SynchronizationState};
use crate::options::ChainstateManagerOptions;
use crate::store::{
    BlockTreeStore, CoinStore, IndexRecord, MemoryCoinStore, MemoryTreeStore, RocksCoinStore,
    RocksTreeStore,
};
use crate::undo::BlockUndo;
use crate::validation::{check_block, connect_transactions, ValidationFailure};

use karst_core::encoding::{Decodable, Encodable};

/// Block-tree database directory under the blocks directory.
const INDEX_DIR: &str = "index";
/// Chainstate database directory under the data directory.
const CHAINSTATE_DIR: &str = "chainstate";

pub struct ChainstateManager {
    context: Arc<Context>,
    files: FlatFileStore,
    tree: Box<dyn BlockTreeStore>,
    coins: Box<dyn CoinStore>,
    index: BlockIndex,
    pool: rayon::ThreadPool,
    poisoned: bool,
    reindexing: bool,
}

impl ChainstateManager {
    pub fn new(options: ChainstateManagerOptions) -> Result<Self, KernelError> {
        let tree_path = options.blocks_dir.join(INDEX_DIR);
        let coins_path = options.data_dir.join(CHAINSTATE_DIR);

        if options.wipe_block_tree {
            wipe_dir(&tree_path)?;
        }
        if options.wipe_chainstate {
            wipe_dir(&coins_path)?;
        }

        let files = FlatFileStore::open(&options.blocks_dir)?;
        let tree: Box<dyn BlockTreeStore> = if options.block_tree_in_memory {
            Box::new(MemoryTreeStore::new())
        } else {
            Box::new(RocksTreeStore::open(&tree_path)?)
        };
        let coins: Box<dyn CoinStore> = if options.chainstate_in_memory {
            Box::new(MemoryCoinStore::new())
        } else {
            Box::new(RocksCoinStore::open(&coins_path)?)
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.worker_threads)
            .thread_name(|i| format!("scriptcheck.{i}"))
            .build()
            .map_err(|e| KernelError::Internal(e.to_string()))?;

        let mut index = BlockIndex::new();
        for record in tree.load_records()? {
            if record.height as usize != index.len() {
                return Err(KernelError::Store(StoreError::CorruptRecord(format!(
                    "block tree has a gap at height {}",
                    record.height
                ))));
            }
            index.push(record.height, record.hash, record.block_pos, record.undo_pos);
        }

        let reindexing = options.wipe_block_tree && files.has_records(FileKind::Block);
        let mut manager = Self {
            context: options.context,
            files,
            tree,
            coins,
            index,
            pool,
            poisoned: false,
            reindexing,
        };

        // A fresh directory starts at the network genesis. During a reindex
        // the flat files already hold it, so import picks it up instead.
        if manager.index.is_empty() && !manager.files.has_records(FileKind::Block) {
            let genesis = manager.context.chain_params().genesis.clone();
            let (accepted, _) = manager.accept_block(&genesis, None)?;
            if !accepted {
                return Err(KernelError::Internal(
                    "network genesis block failed validation".into(),
                ));
            }
        }

        tracing::info!(
            chain = %manager.context.chain_params().chain_type,
            height = manager.index.len(),
            reindexing = manager.reindexing,
            "chainstate manager ready"
        );
        Ok(manager)
    }

    /// The block index over the connected chain.
    pub fn block_index(&self) -> &BlockIndex {
        &self.index
    }

    /// Connected tip height, if the chainstate holds anything.
    pub fn tip_height(&self) -> Option<u32> {
        self.coins.tip().ok().flatten().map(|(height, _)| height)
    }

    /// Connected tip hash.
    pub fn tip_hash(&self) -> Option<Hash256> {
        self.coins.tip().ok().flatten().map(|(_, hash)| hash)
    }

    /// Number of unspent coins in the chainstate.
    pub fn coin_count(&self) -> Result<u64, KernelError> {
        Ok(self.coins.coin_count()?)
    }

    /// Validate and connect a block.
    ///
    /// Returns `(accepted, new_block)`. A block that is already connected
    /// yields `(true, false)` with no side effects. A block that fails
    /// validation yields `(false, false)` and is reported through the
    /// validation sink. `Err` is reserved for fatal storage problems.
    pub fn process_block(&mut self, block: &Block) -> Result<(bool, bool), KernelError> {
        if self.poisoned {
            return Err(KernelError::Poisoned);
        }
        self.accept_block(block, None)
    }

    /// Replay block files.
    ///
    /// With an empty `paths`, rescans this manager's own flat files,
    /// reusing recorded positions; this is the recovery path after a wipe.
    /// Otherwise each path is parsed as a framed block file and its blocks
    /// fed through the normal connect path. Already-known blocks are
    /// skipped, invalid ones are logged and skipped.
    pub fn import_blocks(&mut self, paths: &[PathBuf]) -> Result<(), KernelError> {
        if self.poisoned {
            return Err(KernelError::Poisoned);
        }

        if paths.is_empty() {
            let records = self.files.scan(FileKind::Block)?;
            tracing::info!(records = records.len(), "replaying local block files");
            for (pos, bytes) in records {
                let Ok(block) = Block::from_bytes(&bytes) else {
                    logging::log(
                        LogCategory::Blockstorage,
                        LogLevel::Info,
                        None,
                        "skipping unparsable record in local block file",
                    );
                    continue;
                };
                self.accept_block(&block, Some(pos))?;
            }
        } else {
            for path in paths {
                let records = scan_path(path)?;
                tracing::info!(path = %path.display(), records = records.len(), "importing block file");
                for bytes in records {
                    let Ok(block) = Block::from_bytes(&bytes) else {
                        continue;
                    };
                    self.accept_block(&block, None)?;
                }
            }
        }

        self.reindexing = false;
        Ok(())
    }

    /// Read a connected block back from the flat files. Missing or corrupt
    /// data yields `None`.
    pub fn read_block(&self, entry: &IndexEntry) -> Option<Block> {
        let bytes = self.files.read(FileKind::Block, &entry.block_pos)?;
        Block::from_bytes(&bytes).ok()
    }

    /// Read a connected block's undo record. Missing or corrupt data yields
    /// `None`.
    pub fn read_block_undo(&self, entry: &IndexEntry) -> Option<BlockUndo> {
        let bytes = self.files.read(FileKind::Undo, &entry.undo_pos)?;
        BlockUndo::decode(&bytes).ok()
    }

    fn accept_block(
        &mut self,
        block: &Block,
        known_pos: Option<FilePos>,
    ) -> Result<(bool, bool), KernelError> {
        let hash = block.hash();
        let connected_tip = self.coins.tip().map_err(|e| self.fatal(e))?;

        // Duplicate of an already connected block: success, nothing new.
        if let Some(entry) = self.index.by_hash(&hash) {
            let connected = connected_tip.is_some_and(|(height, _)| entry.height <= height);
            if connected {
                return Ok((true, false));
            }
        }

        let (height, expected_prev) = match connected_tip {
            None => (0, Hash256::ZERO),
            Some((tip_height, tip_hash)) => (tip_height + 1, tip_hash),
        };

        let params = Arc::clone(self.context.chain_params());
        if let Err(failure) = check_block(block, &params, unix_time()) {
            return Ok(self.reject(block, failure));
        }
        if block.header.prev_hash != expected_prev {
            let result = if self.index.contains(&block.header.prev_hash) {
                // Known predecessor that is not the tip: only best-chain
                // extension is supported.
                BlockValidationResult::InvalidPrev
            } else {
                BlockValidationResult::MissingPrev
            };
            return Ok(self.reject(
                block,
                ValidationFailure {
                    result,
                    reason: "predecessor is not the current tip",
                },
            ));
        }

        let outcome = connect_transactions(block, height, &*self.coins, &params, &self.pool)
            .map_err(|e| self.fatal(e))?;
        let data = match outcome {
            Ok(data) => data,
            Err(failure) => return Ok(self.reject(block, failure)),
        };

        // Persist: flat files first, then the index record, then the coins.
        // A block already present in the index (chainstate rebuild) keeps its
        // recorded positions and gets no new index entry.
        let new_block = !self.index.contains(&hash);
        if new_block {
            let block_pos = match known_pos {
                Some(pos) => pos,
                None => self
                    .files
                    .append(FileKind::Block, &block.to_bytes())
                    .map_err(|e| self.fatal(e))?,
            };
            let undo_pos = self
                .files
                .append(FileKind::Undo, &data.undo.encode())
                .map_err(|e| self.fatal(e))?;
            self.index.push(height, hash, block_pos, undo_pos);
            self.tree
                .put_record(&IndexRecord {
                    height,
                    hash,
                    block_pos,
                    undo_pos,
                })
                .map_err(|e| self.fatal(e))?;
        }

        self.coins
            .apply(&data.spent, &data.created, (height, hash))
            .map_err(|e| self.fatal(e))?;

        logging::log(
            LogCategory::Validation,
            LogLevel::Debug,
            None,
            &format!("connected block {hash} at height {height}"),
        );
        tracing::debug!(%hash, height, new_block, "block connected");

        self.context
            .validation()
            .block_checked(block, &BlockValidationState::valid());
        let sync_state = if self.reindexing {
            SynchronizationState::InitReindex
        } else {
            SynchronizationState::PostInit
        };
        self.context
            .notifications()
            .header_tip(sync_state, height, block.header.time, false);

        Ok((true, new_block))
    }

    fn reject(&self, block: &Block, failure: ValidationFailure) -> (bool, bool) {
        logging::log(
            LogCategory::Validation,
            LogLevel::Info,
            None,
            &format!("rejected block {}: {}", block.hash(), failure.reason),
        );
        tracing::info!(hash = %block.hash(), reason = failure.reason, "block rejected");
        self.context
            .validation()
            .block_checked(block, &BlockValidationState::invalid(failure.result));
        (false, false)
    }

    fn fatal(&mut self, error: StoreError) -> KernelError {
        self.poisoned = true;
        let message = error.to_string();
        tracing::error!(%message, "fatal storage error");
        self.context.notifications().fatal_error(&message);
        KernelError::Store(error)
    }
}

fn wipe_dir(path: &Path) -> Result<(), KernelError> {
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(StoreError::BlockFile)?;
    }
    Ok(())
}

fn unix_time() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
