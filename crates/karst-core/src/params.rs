//! Per-network consensus parameters.

use serde::{Deserialize, Serialize};

use crate::constants::MAX_FUTURE_BLOCK_TIME;
use crate::genesis;
use crate::types::Block;

/// Supported networks.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub enum ChainType {
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl ChainType {
    pub fn name(&self) -> &'static str {
        match self {
            ChainType::Mainnet => "mainnet",
            ChainType::Testnet => "testnet",
            ChainType::Signet => "signet",
            ChainType::Regtest => "regtest",
        }
    }
}

impl std::fmt::Display for ChainType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Heights at which script rule generations activate.
///
/// A rule applies to blocks at or above its height. Height 0 means the rule
/// is in force from genesis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActivationHeights {
    pub p2sh: u32,
    pub strictsig: u32,
    pub nulldummy: u32,
    pub cltv: u32,
    pub csv: u32,
    pub witness: u32,
    pub taproot: u32,
}

impl ActivationHeights {
    /// All rules active from genesis.
    pub const FROM_GENESIS: Self = Self {
        p2sh: 0,
        strictsig: 0,
        nulldummy: 0,
        cltv: 0,
        csv: 0,
        witness: 0,
        taproot: 0,
    };
}

/// Consensus parameters for one network.
#[derive(Clone, Debug)]
pub struct ChainParams {
    pub chain_type: ChainType,
    /// Deterministic genesis block for this network.
    pub genesis: Block,
    /// Expected `bits` value in every header. Difficulty is fixed.
    pub expected_bits: u32,
    /// Upper bound on the leading 8 hash bytes, little-endian.
    pub pow_limit: u64,
    /// Maximum seconds a block timestamp may exceed the current time.
    pub max_future_drift: u32,
    /// Script rule activation schedule.
    pub activation: ActivationHeights,
}

/// Every header must carry this `bits` value.
pub const EXPECTED_BITS: u32 = 0x207F_FFFF;

impl ChainParams {
    pub fn new(chain_type: ChainType) -> Self {
        let activation = match chain_type {
            // Mainnet rolled rules out in stages.
            ChainType::Mainnet => ActivationHeights {
                p2sh: 0,
                strictsig: 100,
                nulldummy: 100,
                cltv: 200,
                csv: 200,
                witness: 300,
                taproot: 400,
            },
            ChainType::Testnet | ChainType::Signet | ChainType::Regtest => {
                ActivationHeights::FROM_GENESIS
            }
        };

        Self {
            chain_type,
            genesis: genesis::genesis_block(chain_type).clone(),
            expected_bits: EXPECTED_BITS,
            pow_limit: u64::MAX,
            max_future_drift: MAX_FUTURE_BLOCK_TIME,
            activation,
        }
    }

    /// Check proof of work: the leading 8 bytes of the block hash, read
    /// little-endian, must not exceed the network limit.
    pub fn check_pow(&self, header: &crate::types::BlockHeader) -> bool {
        if header.bits != self.expected_bits {
            return false;
        }
        let hash = header.hash();
        let lead = u64::from_le_bytes(hash.as_bytes()[..8].try_into().expect("8-byte slice"));
        lead <= self.pow_limit
    }
}
