//! Block-tree and chainstate databases.
//!
//! Each database sits behind a trait with a HashMap-backed in-memory
//! implementation and a RocksDB one. The in-memory variants touch nothing on
//! disk. All RocksDB mutations go through atomic [`WriteBatch`]es.

use std::collections::HashMap;
use std::path::Path;

use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch, DB};

use karst_core::types::{Hash256, OutPoint, TxOutput};

use crate::block_file::FilePos;
use crate::error::StoreError;

/// Durable form of a block index entry.
#[derive(Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct IndexRecord {
    pub height: u32,
    pub hash: Hash256,
    pub block_pos: FilePos,
    pub undo_pos: FilePos,
}

/// An unspent output with its creation context.
#[derive(Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct Coin {
    pub output: TxOutput,
    pub height: u32,
    pub is_coinbase: bool,
}

/// Persistence for the block index.
pub trait BlockTreeStore: Send {
    fn put_record(&mut self, record: &IndexRecord) -> Result<(), StoreError>;

    /// All records, ordered by height.
    fn load_records(&self) -> Result<Vec<IndexRecord>, StoreError>;
}

/// Persistence for the UTXO set and chain tip.
pub trait CoinStore: Send {
    fn coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, StoreError>;

    /// Connected tip, `None` for a fresh chainstate.
    fn tip(&self) -> Result<Option<(u32, Hash256)>, StoreError>;

    /// Atomically remove `spent`, add `created`, and advance the tip.
    fn apply(
        &mut self,
        spent: &[OutPoint],
        created: &[(OutPoint, Coin)],
        tip: (u32, Hash256),
    ) -> Result<(), StoreError>;

    fn coin_count(&self) -> Result<u64, StoreError>;
}

// --- In-memory implementations ---

#[derive(Default)]
pub struct MemoryTreeStore {
    records: Vec<IndexRecord>,
}

impl MemoryTreeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockTreeStore for MemoryTreeStore {
    fn put_record(&mut self, record: &IndexRecord) -> Result<(), StoreError> {
        self.records.push(record.clone());
        Ok(())
    }

    fn load_records(&self) -> Result<Vec<IndexRecord>, StoreError> {
        let mut records = self.records.clone();
        records.sort_by_key(|r| r.height);
        Ok(records)
    }
}

#[derive(Default)]
pub struct MemoryCoinStore {
    coins: HashMap<OutPoint, Coin>,
    tip: Option<(u32, Hash256)>,
}

impl MemoryCoinStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CoinStore for MemoryCoinStore {
    fn coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, StoreError> {
        Ok(self.coins.get(outpoint).cloned())
    }

    fn tip(&self) -> Result<Option<(u32, Hash256)>, StoreError> {
        Ok(self.tip)
    }

    fn apply(
        &mut self,
        spent: &[OutPoint],
        created: &[(OutPoint, Coin)],
        tip: (u32, Hash256),
    ) -> Result<(), StoreError> {
        for outpoint in spent {
            self.coins.remove(outpoint);
        }
        for (outpoint, coin) in created {
            self.coins.insert(*outpoint, coin.clone());
        }
        self.tip = Some(tip);
        Ok(())
    }

    fn coin_count(&self) -> Result<u64, StoreError> {
        Ok(self.coins.len() as u64)
    }
}

// --- RocksDB implementations ---

const CF_INDEX: &str = "index";
const CF_COINS: &str = "coins";
const CF_META: &str = "meta";

const META_TIP_HEIGHT: &[u8] = b"tip_height";
const META_TIP_HASH: &[u8] = b"tip_hash";
const META_COIN_COUNT: &[u8] = b"coin_count";

fn open_db(path: &Path, cfs: &[&str]) -> Result<DB, StoreError> {
    let mut db_opts = Options::default();
    db_opts.create_if_missing(true);
    db_opts.create_missing_column_families(true);
    let descriptors: Vec<ColumnFamilyDescriptor> = cfs
        .iter()
        .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
        .collect();
    DB::open_cf_descriptors(&db_opts, path, descriptors)
        .map_err(|e| StoreError::Database(e.to_string()))
}

fn cf_handle<'a>(db: &'a DB, name: &str) -> Result<&'a rocksdb::ColumnFamily, StoreError> {
    db.cf_handle(name)
        .ok_or_else(|| StoreError::Database(format!("missing column family: {name}")))
}

fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::CorruptRecord(e.to_string()))
}

fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, StoreError> {
    let (value, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| StoreError::CorruptRecord(e.to_string()))?;
    Ok(value)
}

/// RocksDB-backed block-tree database.
pub struct RocksTreeStore {
    db: DB,
}

impl RocksTreeStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self {
            db: open_db(path.as_ref(), &[CF_INDEX])?,
        })
    }
}

impl BlockTreeStore for RocksTreeStore {
    fn put_record(&mut self, record: &IndexRecord) -> Result<(), StoreError> {
        let cf = cf_handle(&self.db, CF_INDEX)?;
        let mut batch = WriteBatch::default();
        // Big-endian height keys keep iteration in height order.
        batch.put_cf(cf, record.height.to_be_bytes(), encode(record)?);
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn load_records(&self) -> Result<Vec<IndexRecord>, StoreError> {
        let cf = cf_handle(&self.db, CF_INDEX)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            records.push(decode(&value)?);
        }
        Ok(records)
    }
}

/// RocksDB-backed chainstate database.
pub struct RocksCoinStore {
    db: DB,
}

impl RocksCoinStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self {
            db: open_db(path.as_ref(), &[CF_COINS, CF_META])?,
        })
    }

    fn meta_u64(&self, key: &[u8]) -> Result<Option<u64>, StoreError> {
        let cf = cf_handle(&self.db, CF_META)?;
        match self
            .db
            .get_cf(cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
        {
            Some(bytes) if bytes.len() == 8 => Ok(Some(u64::from_le_bytes(
                bytes.as_slice().try_into().expect("8-byte value"),
            ))),
            Some(_) => Err(StoreError::CorruptRecord("bad metadata length".into())),
            None => Ok(None),
        }
    }
}

impl CoinStore for RocksCoinStore {
    fn coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, StoreError> {
        let cf = cf_handle(&self.db, CF_COINS)?;
        match self
            .db
            .get_cf(cf, encode(outpoint)?)
            .map_err(|e| StoreError::Database(e.to_string()))?
        {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn tip(&self) -> Result<Option<(u32, Hash256)>, StoreError> {
        let cf = cf_handle(&self.db, CF_META)?;
        let Some(hash_bytes) = self
            .db
            .get_cf(cf, META_TIP_HASH)
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };
        if hash_bytes.len() != 32 {
            return Err(StoreError::CorruptRecord("bad tip hash length".into()));
        }
        let hash = Hash256(hash_bytes.as_slice().try_into().expect("32-byte value"));
        let height = self
            .meta_u64(META_TIP_HEIGHT)?
            .ok_or_else(|| StoreError::CorruptRecord("tip hash without height".into()))?;
        Ok(Some((height as u32, hash)))
    }

    fn apply(
        &mut self,
        spent: &[OutPoint],
        created: &[(OutPoint, Coin)],
        tip: (u32, Hash256),
    ) -> Result<(), StoreError> {
        let cf_coins = cf_handle(&self.db, CF_COINS)?;
        let cf_meta = cf_handle(&self.db, CF_META)?;
        let mut batch = WriteBatch::default();

        for outpoint in spent {
            batch.delete_cf(cf_coins, encode(outpoint)?);
        }
        for (outpoint, coin) in created {
            batch.put_cf(cf_coins, encode(outpoint)?, encode(coin)?);
        }

        let count = self.coin_count()?;
        let new_count = count + created.len() as u64 - spent.len() as u64;
        batch.put_cf(cf_meta, META_COIN_COUNT, new_count.to_le_bytes());
        batch.put_cf(cf_meta, META_TIP_HEIGHT, (tip.0 as u64).to_le_bytes());
        batch.put_cf(cf_meta, META_TIP_HASH, tip.1.as_bytes());

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn coin_count(&self) -> Result<u64, StoreError> {
        Ok(self.meta_u64(META_COIN_COUNT)?.unwrap_or(0))
    }
}
