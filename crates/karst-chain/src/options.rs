//! Chainstate manager construction options.

use std::path::PathBuf;
use std::sync::Arc;

use crate::context::Context;
use crate::error::OptionsError;

/// Upper bound on the script verification pool size.
pub const MAX_WORKER_THREADS: usize = 256;

/// Options for [`crate::chainstate::ChainstateManager`].
pub struct ChainstateManagerOptions {
    pub(crate) context: Arc<Context>,
    pub(crate) data_dir: PathBuf,
    pub(crate) blocks_dir: PathBuf,
    pub(crate) worker_threads: usize,
    pub(crate) wipe_block_tree: bool,
    pub(crate) wipe_chainstate: bool,
    pub(crate) block_tree_in_memory: bool,
    pub(crate) chainstate_in_memory: bool,
}

impl std::fmt::Debug for ChainstateManagerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainstateManagerOptions")
            .field("data_dir", &self.data_dir)
            .field("blocks_dir", &self.blocks_dir)
            .field("worker_threads", &self.worker_threads)
            .field("wipe_block_tree", &self.wipe_block_tree)
            .field("wipe_chainstate", &self.wipe_chainstate)
            .field("block_tree_in_memory", &self.block_tree_in_memory)
            .field("chainstate_in_memory", &self.chainstate_in_memory)
            .finish_non_exhaustive()
    }
}

impl ChainstateManagerOptions {
    pub fn new(
        context: Arc<Context>,
        data_dir: impl Into<PathBuf>,
        blocks_dir: impl Into<PathBuf>,
    ) -> Self {
        let default_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            context,
            data_dir: data_dir.into(),
            blocks_dir: blocks_dir.into(),
            worker_threads: default_threads.min(MAX_WORKER_THREADS),
            wipe_block_tree: false,
            wipe_chainstate: false,
            block_tree_in_memory: false,
            chainstate_in_memory: false,
        }
    }

    /// Size of the script verification pool, clamped to a sane range.
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.clamp(1, MAX_WORKER_THREADS);
        self
    }

    /// Request database wipes on construction. Wiping the block tree without
    /// the chainstate would leave the chainstate pointing at unknown blocks,
    /// so that combination is rejected.
    pub fn wipe_dbs(
        mut self,
        wipe_block_tree: bool,
        wipe_chainstate: bool,
    ) -> Result<Self, OptionsError> {
        if wipe_block_tree && !wipe_chainstate {
            return Err(OptionsError::WipeMismatch);
        }
        self.wipe_block_tree = wipe_block_tree;
        self.wipe_chainstate = wipe_chainstate;
        Ok(self)
    }

    /// Keep the block-tree database in memory. No directory is created.
    pub fn block_tree_db_in_memory(mut self, in_memory: bool) -> Self {
        self.block_tree_in_memory = in_memory;
        self
    }

    /// Keep the chainstate database in memory. No directory is created.
    pub fn chainstate_db_in_memory(mut self, in_memory: bool) -> Self {
        self.chainstate_in_memory = in_memory;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextBuilder;

    fn options() -> ChainstateManagerOptions {
        ChainstateManagerOptions::new(ContextBuilder::new().build(), "/tmp/d", "/tmp/b")
    }

    #[test]
    fn worker_threads_clamped() {
        assert_eq!(options().worker_threads(0).worker_threads, 1);
        assert_eq!(options().worker_threads(4).worker_threads, 4);
        assert_eq!(
            options().worker_threads(100_000).worker_threads,
            MAX_WORKER_THREADS
        );
    }

    #[test]
    fn default_worker_threads_positive() {
        let opts = options();
        assert!(opts.worker_threads >= 1);
        assert!(opts.worker_threads <= MAX_WORKER_THREADS);
    }

    #[test]
    fn wipe_combinations() {
        assert!(options().wipe_dbs(false, false).is_ok());
        assert!(options().wipe_dbs(true, true).is_ok());
        assert!(options().wipe_dbs(false, true).is_ok());
        assert_eq!(
            options().wipe_dbs(true, false).unwrap_err(),
            OptionsError::WipeMismatch
        );
    }
}
