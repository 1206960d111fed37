//! In-memory index over the connected header chain.
//!
//! An append-only arena: entries are created when a block connects and never
//! mutate afterwards. The chain is linear (best-chain extension only), so the
//! arena slot number equals the block height.

use std::collections::HashMap;

use karst_core::types::Hash256;

use crate::block_file::FilePos;

/// Stable handle to an index entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntryId(usize);

/// One connected block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub height: u32,
    pub hash: Hash256,
    /// `None` exactly at genesis.
    pub prev: Option<EntryId>,
    /// Where the raw block lives in the flat files.
    pub block_pos: FilePos,
    /// Where the block's undo record lives.
    pub undo_pos: FilePos,
}

/// Append-only arena of connected blocks with hash lookup.
#[derive(Default)]
pub struct BlockIndex {
    entries: Vec<IndexEntry>,
    by_hash: HashMap<Hash256, EntryId>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next entry. `height` must equal the current length.
    pub fn push(
        &mut self,
        height: u32,
        hash: Hash256,
        block_pos: FilePos,
        undo_pos: FilePos,
    ) -> EntryId {
        debug_assert_eq!(height as usize, self.entries.len());
        let prev = if height == 0 {
            None
        } else {
            Some(EntryId(height as usize - 1))
        };
        let id = EntryId(self.entries.len());
        self.entries.push(IndexEntry {
            height,
            hash,
            prev,
            block_pos,
            undo_pos,
        });
        self.by_hash.insert(hash, id);
        id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at height 0.
    pub fn genesis(&self) -> Option<&IndexEntry> {
        self.entries.first()
    }

    /// Highest connected entry.
    pub fn tip(&self) -> Option<&IndexEntry> {
        self.entries.last()
    }

    pub fn by_height(&self, height: u32) -> Option<&IndexEntry> {
        self.entries.get(height as usize)
    }

    pub fn by_hash(&self, hash: &Hash256) -> Option<&IndexEntry> {
        self.by_hash.get(hash).map(|id| &self.entries[id.0])
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.by_hash.contains_key(hash)
    }

    /// Successor of `entry`, `None` at the tip.
    pub fn next(&self, entry: &IndexEntry) -> Option<&IndexEntry> {
        self.by_height(entry.height + 1)
    }

    /// Predecessor of `entry`, `None` exactly at genesis.
    pub fn prev(&self, entry: &IndexEntry) -> Option<&IndexEntry> {
        let prev = entry.prev?;
        self.entries.get(prev.0)
    }
}
