//! Flat block and undo files.
//!
//! Raw blocks live in `blk*.dat` and undo records in `rev*.dat` under the
//! blocks directory, framed as `[magic u32][length u32][payload]` with
//! little-endian integers. Files roll over once they pass the size cap.
//! These files are always on disk, independent of whether the databases are
//! in memory.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use karst_core::constants::MAX_BLOCK_SIZE;

use crate::error::StoreError;

/// Record framing magic, "KRST" in little-endian byte order.
pub const RECORD_MAGIC: u32 = 0x5453_524B;

/// Files roll over past this size.
const MAX_FILE_SIZE: u64 = 128 * 1024 * 1024;

/// Frame header: magic + length.
const HEADER_SIZE: u64 = 8;

/// Position of a record inside the flat file set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct FilePos {
    /// File number within its kind.
    pub file: u32,
    /// Byte offset of the frame header.
    pub offset: u64,
}

/// Which flat file series a record belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Block,
    Undo,
}

impl FileKind {
    fn prefix(self) -> &'static str {
        match self {
            FileKind::Block => "blk",
            FileKind::Undo => "rev",
        }
    }
}

/// Append-only store for framed records under one directory.
pub struct FlatFileStore {
    dir: PathBuf,
}

impl FlatFileStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, kind: FileKind, file: u32) -> PathBuf {
        self.dir.join(format!("{}{:05}.dat", kind.prefix(), file))
    }

    /// Highest existing file number for a kind, if any file exists.
    fn last_file(&self, kind: FileKind) -> Option<u32> {
        let mut last = None;
        let mut n = 0;
        while self.path(kind, n).exists() {
            last = Some(n);
            n += 1;
        }
        last
    }

    /// Whether any file of this kind exists yet.
    pub fn has_records(&self, kind: FileKind) -> bool {
        self.last_file(kind).is_some()
    }

    /// Append one record, rolling to the next file when the current one is
    /// full. The write is flushed and synced before the position is returned.
    pub fn append(&self, kind: FileKind, payload: &[u8]) -> Result<FilePos, StoreError> {
        let mut file_no = self.last_file(kind).unwrap_or(0);
        let mut offset = match std::fs::metadata(self.path(kind, file_no)) {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
        if offset > 0 && offset + HEADER_SIZE + payload.len() as u64 > MAX_FILE_SIZE {
            file_no += 1;
            offset = 0;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(kind, file_no))?;
        file.write_all(&RECORD_MAGIC.to_le_bytes())?;
        file.write_all(&(payload.len() as u32).to_le_bytes())?;
        file.write_all(payload)?;
        file.sync_data()?;

        Ok(FilePos {
            file: file_no,
            offset,
        })
    }

    /// Read the record at `pos`. Missing files, bad framing, or a short read
    /// all yield `None`.
    pub fn read(&self, kind: FileKind, pos: &FilePos) -> Option<Vec<u8>> {
        let mut file = File::open(self.path(kind, pos.file)).ok()?;
        file.seek(SeekFrom::Start(pos.offset)).ok()?;
        read_frame(&mut file)
    }

    /// All records of a kind across every file, in append order, with their
    /// positions. Scanning stops at the first bad frame in each file.
    pub fn scan(&self, kind: FileKind) -> Result<Vec<(FilePos, Vec<u8>)>, StoreError> {
        let mut records = Vec::new();
        let Some(last) = self.last_file(kind) else {
            return Ok(records);
        };
        for file_no in 0..=last {
            let mut file = File::open(self.path(kind, file_no))?;
            let mut offset = 0u64;
            loop {
                let Some(payload) = read_frame(&mut file) else {
                    break;
                };
                let pos = FilePos {
                    file: file_no,
                    offset,
                };
                offset += HEADER_SIZE + payload.len() as u64;
                records.push((pos, payload));
            }
        }
        Ok(records)
    }
}

/// All records in one framed file, stopping at the first bad frame.
pub fn scan_path(path: &Path) -> Result<Vec<Vec<u8>>, StoreError> {
    let mut file = File::open(path)?;
    let mut records = Vec::new();
    while let Some(payload) = read_frame(&mut file) {
        records.push(payload);
    }
    Ok(records)
}

fn read_frame(file: &mut File) -> Option<Vec<u8>> {
    let mut header = [0u8; 8];
    file.read_exact(&mut header).ok()?;
    let magic = u32::from_le_bytes(header[..4].try_into().expect("4-byte slice"));
    let len = u32::from_le_bytes(header[4..].try_into().expect("4-byte slice")) as usize;
    if magic != RECORD_MAGIC || len > MAX_BLOCK_SIZE {
        return None;
    }
    let mut payload = vec![0u8; len];
    file.read_exact(&mut payload).ok()?;
    Some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (FlatFileStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = FlatFileStore::open(dir.path().join("blocks")).unwrap();
        (store, dir)
    }

    #[test]
    fn append_then_read_back() {
        let (store, _dir) = temp_store();
        let pos = store.append(FileKind::Block, b"hello block").unwrap();
        assert_eq!(pos, FilePos { file: 0, offset: 0 });
        assert_eq!(
            store.read(FileKind::Block, &pos).unwrap(),
            b"hello block".to_vec()
        );
    }

    #[test]
    fn sequential_appends_get_distinct_positions() {
        let (store, _dir) = temp_store();
        let a = store.append(FileKind::Block, b"aaaa").unwrap();
        let b = store.append(FileKind::Block, b"bb").unwrap();
        assert_eq!(b.offset, a.offset + 8 + 4);
        assert_eq!(store.read(FileKind::Block, &a).unwrap(), b"aaaa".to_vec());
        assert_eq!(store.read(FileKind::Block, &b).unwrap(), b"bb".to_vec());
    }

    #[test]
    fn block_and_undo_series_are_separate() {
        let (store, _dir) = temp_store();
        let bp = store.append(FileKind::Block, b"block").unwrap();
        let up = store.append(FileKind::Undo, b"undo").unwrap();
        assert_eq!(bp.offset, 0);
        assert_eq!(up.offset, 0);
        assert_eq!(store.read(FileKind::Block, &bp).unwrap(), b"block".to_vec());
        assert_eq!(store.read(FileKind::Undo, &up).unwrap(), b"undo".to_vec());
    }

    #[test]
    fn read_missing_file_is_none() {
        let (store, _dir) = temp_store();
        assert!(store
            .read(FileKind::Block, &FilePos { file: 3, offset: 0 })
            .is_none());
    }

    #[test]
    fn read_bad_offset_is_none() {
        let (store, _dir) = temp_store();
        store.append(FileKind::Block, b"data").unwrap();
        assert!(store
            .read(FileKind::Block, &FilePos { file: 0, offset: 3 })
            .is_none());
    }

    #[test]
    fn removed_file_degrades_to_none() {
        let (store, _dir) = temp_store();
        let pos = store.append(FileKind::Block, b"data").unwrap();
        std::fs::remove_file(store.dir().join("blk00000.dat")).unwrap();
        assert!(store.read(FileKind::Block, &pos).is_none());
    }

    #[test]
    fn scan_returns_records_in_append_order() {
        let (store, _dir) = temp_store();
        let a = store.append(FileKind::Block, b"one").unwrap();
        let b = store.append(FileKind::Block, b"two").unwrap();
        let records = store.scan(FileKind::Block).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], (a, b"one".to_vec()));
        assert_eq!(records[1], (b, b"two".to_vec()));
    }

    #[test]
    fn scan_empty_store() {
        let (store, _dir) = temp_store();
        assert!(store.scan(FileKind::Block).unwrap().is_empty());
    }

    #[test]
    fn scan_stops_at_garbage_tail() {
        let (store, _dir) = temp_store();
        store.append(FileKind::Block, b"good").unwrap();
        let path = store.dir().join("blk00000.dat");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x00, 0x00, 0x00, 0xFF])
            .unwrap();

        let records = store.scan(FileKind::Block).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1, b"good".to_vec());
    }

    #[test]
    fn scan_path_reads_foreign_file() {
        let (store, _dir) = temp_store();
        store.append(FileKind::Block, b"first").unwrap();
        store.append(FileKind::Block, b"second").unwrap();
        let records = scan_path(&store.dir().join("blk00000.dat")).unwrap();
        assert_eq!(records, vec![b"first".to_vec(), b"second".to_vec()]);
    }
}
