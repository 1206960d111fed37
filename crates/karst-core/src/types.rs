//! Core consensus types: transactions, blocks, scripts.
//!
//! Every type carries a canonical byte encoding (see [`crate::encoding`]).
//! Construction from raw bytes is fallible: malformed or truncated input
//! yields a [`CodecError`], never a partially-usable object.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::encoding::{self, Decodable, Encodable, Reader};
use crate::error::CodecError;

/// A 32-byte hash value.
///
/// Used for block header hashes, transaction IDs, and merkle roots, all
/// computed as double SHA-256 over the canonical encoding.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes). Used for the genesis predecessor and
    /// coinbase previous outpoints.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Double SHA-256.
pub fn sha256d(bytes: &[u8]) -> Hash256 {
    let first = Sha256::digest(bytes);
    Hash256(Sha256::digest(first).into())
}

/// Reference to a specific output of a previous transaction.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub struct OutPoint {
    /// Transaction ID containing the referenced output.
    pub txid: Hash256,
    /// Index of the output within the transaction.
    pub vout: u32,
}

impl OutPoint {
    /// The null outpoint, used for coinbase transaction inputs.
    pub fn null() -> Self {
        Self {
            txid: Hash256::ZERO,
            vout: u32::MAX,
        }
    }

    /// Check if this is the null outpoint (coinbase marker).
    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.vout == u32::MAX
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// An opaque locking-script byte string.
///
/// May be empty; operations that require a usable script fail on an empty
/// one rather than panicking.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct ScriptPubkey(pub Vec<u8>);

impl ScriptPubkey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<u8>> for ScriptPubkey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// A transaction input, spending a previous output.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct TxInput {
    /// The outpoint being spent. Null outpoint for coinbase.
    pub previous_output: OutPoint,
    /// Unlocking script. Carries the genesis message for coinbase inputs.
    pub script_sig: Vec<u8>,
    /// Relative-locktime field, compared by OP_CHECKSEQUENCEVERIFY.
    pub sequence: u32,
}

/// A transaction output: an amount locked by a script.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct TxOutput {
    /// Value in grains.
    pub value: u64,
    /// Locking script.
    pub script_pubkey: ScriptPubkey,
}

/// A transaction transferring value between outputs.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    /// Protocol version.
    pub version: u32,
    /// Inputs consuming previous outputs.
    pub inputs: Vec<TxInput>,
    /// New outputs created by this transaction.
    pub outputs: Vec<TxOutput>,
    /// Absolute locktime, compared by OP_CHECKLOCKTIMEVERIFY.
    pub lock_time: u32,
}

impl Transaction {
    /// Parse a transaction from its canonical encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        Self::decode(bytes)
    }

    /// Serialize to the canonical encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode()
    }

    /// Compute the transaction ID (double SHA-256 of the canonical encoding).
    pub fn txid(&self) -> Hash256 {
        sha256d(&self.encode())
    }

    /// Check if this is a coinbase transaction (single input with null outpoint).
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    /// Sum of all output values. Returns None on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }
}

/// Block header committing to the block's contents.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct BlockHeader {
    /// Protocol version.
    pub version: u32,
    /// Hash of the previous block header. Zero for genesis.
    pub prev_hash: Hash256,
    /// Merkle root of the block's transaction IDs.
    pub merkle_root: Hash256,
    /// Unix timestamp in seconds.
    pub time: u32,
    /// Compact difficulty encoding. Fixed per network.
    pub bits: u32,
    /// Proof-of-work nonce.
    pub nonce: u32,
}

impl BlockHeader {
    /// Serialized header size: 3 u32 + 2 hashes + 1 u32.
    pub const SIZE: usize = 4 + 32 + 32 + 4 + 4 + 4;

    /// Canonical block hash: double SHA-256 over the 80 header bytes.
    pub fn hash(&self) -> Hash256 {
        sha256d(&self.encode())
    }
}

/// A complete block: header plus transactions.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct Block {
    /// Header with proof-of-work.
    pub header: BlockHeader,
    /// Ordered list of transactions. First transaction must be coinbase.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Parse a block from its canonical encoding.
    ///
    /// Fails on empty, truncated, or otherwise malformed input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        Self::decode(bytes)
    }

    /// Serialize to the canonical encoding. Re-encoding a decoded block
    /// reproduces the exact original byte sequence.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode()
    }

    /// The block's canonical hash, derived from its header bytes.
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// Get the coinbase transaction, if the block is non-empty.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }
}

// --- Codec impls ---

impl Encodable for OutPoint {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.txid.as_bytes());
        encoding::write_u32(out, self.vout);
    }
}

impl Decodable for OutPoint {
    fn decode_from(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        let txid = Hash256(reader.read_array32()?);
        let vout = reader.read_u32()?;
        Ok(Self { txid, vout })
    }
}

impl Encodable for TxInput {
    fn encode_into(&self, out: &mut Vec<u8>) {
        self.previous_output.encode_into(out);
        encoding::write_varbytes(out, &self.script_sig);
        encoding::write_u32(out, self.sequence);
    }
}

impl Decodable for TxInput {
    fn decode_from(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            previous_output: OutPoint::decode_from(reader)?,
            script_sig: reader.read_varbytes()?,
            sequence: reader.read_u32()?,
        })
    }
}

impl Encodable for TxOutput {
    fn encode_into(&self, out: &mut Vec<u8>) {
        encoding::write_u64(out, self.value);
        encoding::write_varbytes(out, self.script_pubkey.as_bytes());
    }
}

impl Decodable for TxOutput {
    fn decode_from(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            value: reader.read_u64()?,
            script_pubkey: ScriptPubkey(reader.read_varbytes()?),
        })
    }
}

/// Minimum encoded input size: outpoint + empty script + sequence.
const MIN_INPUT_SIZE: usize = 36 + 4 + 4;
/// Minimum encoded output size: value + empty script.
const MIN_OUTPUT_SIZE: usize = 8 + 4;
/// Minimum encoded transaction size: version + two counts + locktime.
const MIN_TX_SIZE: usize = 4 + 4 + 4 + 4;

impl Encodable for Transaction {
    fn encode_into(&self, out: &mut Vec<u8>) {
        encoding::write_u32(out, self.version);
        encoding::write_u32(out, self.inputs.len() as u32);
        for input in &self.inputs {
            input.encode_into(out);
        }
        encoding::write_u32(out, self.outputs.len() as u32);
        for output in &self.outputs {
            output.encode_into(out);
        }
        encoding::write_u32(out, self.lock_time);
    }
}

impl Decodable for Transaction {
    fn decode_from(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        let version = reader.read_u32()?;
        let input_count = reader.read_count(MIN_INPUT_SIZE)?;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            inputs.push(TxInput::decode_from(reader)?);
        }
        let output_count = reader.read_count(MIN_OUTPUT_SIZE)?;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            outputs.push(TxOutput::decode_from(reader)?);
        }
        let lock_time = reader.read_u32()?;
        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }
}

impl Encodable for BlockHeader {
    fn encode_into(&self, out: &mut Vec<u8>) {
        encoding::write_u32(out, self.version);
        out.extend_from_slice(self.prev_hash.as_bytes());
        out.extend_from_slice(self.merkle_root.as_bytes());
        encoding::write_u32(out, self.time);
        encoding::write_u32(out, self.bits);
        encoding::write_u32(out, self.nonce);
    }
}

impl Decodable for BlockHeader {
    fn decode_from(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            version: reader.read_u32()?,
            prev_hash: Hash256(reader.read_array32()?),
            merkle_root: Hash256(reader.read_array32()?),
            time: reader.read_u32()?,
            bits: reader.read_u32()?,
            nonce: reader.read_u32()?,
        })
    }
}

impl Encodable for Block {
    fn encode_into(&self, out: &mut Vec<u8>) {
        self.header.encode_into(out);
        encoding::write_u32(out, self.transactions.len() as u32);
        for tx in &self.transactions {
            tx.encode_into(out);
        }
    }
}

impl Decodable for Block {
    fn decode_from(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        let header = BlockHeader::decode_from(reader)?;
        let tx_count = reader.read_count(MIN_TX_SIZE)?;
        let mut transactions = Vec::with_capacity(tx_count);
        for _ in 0..tx_count {
            transactions.push(Transaction::decode_from(reader)?);
        }
        Ok(Self {
            header,
            transactions,
        })
    }
}
