//! Undo data for reverting a connected block.
//!
//! One [`TxUndo`] per transaction in block order (empty for the coinbase),
//! one [`SpentOutput`] per input in input order. Undo records are written to
//! flat files with the consensus codec when a block connects.
//!
//! Accessors are bounds-safe: probing outside the recorded data yields a
//! zero count, `None`, or a zero height rather than an error.

use karst_core::encoding::{self, Decodable, Encodable, Reader};
use karst_core::error::CodecError;
use karst_core::types::TxOutput;

/// A coin consumed by a block, as it existed before the spend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpentOutput {
    /// The spent output's value and locking script.
    pub output: TxOutput,
    /// Height of the block that created the coin.
    pub height: u32,
}

/// Spends made by one transaction.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct TxUndo {
    /// One entry per input, in input order.
    pub spent: Vec<SpentOutput>,
}

/// Everything needed to disconnect a block.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct BlockUndo {
    /// One entry per transaction, in block order. The coinbase entry is
    /// always empty.
    pub txs: Vec<TxUndo>,
}

impl BlockUndo {
    /// Number of transactions covered by this record.
    pub fn tx_count(&self) -> usize {
        self.txs.len()
    }

    /// Number of outputs spent by the transaction at `tx_index`, or 0 when
    /// the index is out of range.
    pub fn tx_spent_count(&self, tx_index: usize) -> usize {
        self.txs.get(tx_index).map_or(0, |tx| tx.spent.len())
    }

    /// The spent output at the given position, or `None` when either index
    /// is out of range.
    pub fn spent_output(&self, tx_index: usize, out_index: usize) -> Option<&SpentOutput> {
        self.txs.get(tx_index)?.spent.get(out_index)
    }

    /// Creation height of the spent output at the given position, or 0 when
    /// out of range.
    pub fn spent_output_height(&self, tx_index: usize, out_index: usize) -> u32 {
        self.spent_output(tx_index, out_index)
            .map_or(0, |spent| spent.height)
    }
}

impl Encodable for SpentOutput {
    fn encode_into(&self, out: &mut Vec<u8>) {
        self.output.encode_into(out);
        encoding::write_u32(out, self.height);
    }
}

impl Decodable for SpentOutput {
    fn decode_from(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            output: TxOutput::decode_from(reader)?,
            height: reader.read_u32()?,
        })
    }
}

// Minimum sizes for count sanity checks.
const MIN_SPENT_SIZE: usize = 8 + 4 + 4;
const MIN_TX_UNDO_SIZE: usize = 4;

impl Encodable for TxUndo {
    fn encode_into(&self, out: &mut Vec<u8>) {
        encoding::write_u32(out, self.spent.len() as u32);
        for spent in &self.spent {
            spent.encode_into(out);
        }
    }
}

impl Decodable for TxUndo {
    fn decode_from(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        let count = reader.read_count(MIN_SPENT_SIZE)?;
        let mut spent = Vec::with_capacity(count);
        for _ in 0..count {
            spent.push(SpentOutput::decode_from(reader)?);
        }
        Ok(Self { spent })
    }
}

impl Encodable for BlockUndo {
    fn encode_into(&self, out: &mut Vec<u8>) {
        encoding::write_u32(out, self.txs.len() as u32);
        for tx in &self.txs {
            tx.encode_into(out);
        }
    }
}

impl Decodable for BlockUndo {
    fn decode_from(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        let count = reader.read_count(MIN_TX_UNDO_SIZE)?;
        let mut txs = Vec::with_capacity(count);
        for _ in 0..count {
            txs.push(TxUndo::decode_from(reader)?);
        }
        Ok(Self { txs })
    }
}
