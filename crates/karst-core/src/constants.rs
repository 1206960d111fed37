//! Protocol constants.
//!
//! All monetary values are in grains (1 KARST = 10^8 grains).

/// Smallest-unit denomination per coin.
pub const COIN: u64 = 100_000_000;

/// Hard cap on total supply.
pub const MAX_MONEY: u64 = 21_000_000 * COIN;

/// Maximum serialized block size in bytes.
pub const MAX_BLOCK_SIZE: usize = 1_000_000;

/// Maximum script size in bytes.
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Blocks a coinbase output must wait before it can be spent.
pub const COINBASE_MATURITY: u32 = 100;

/// Maximum seconds a block timestamp may lie in the future.
pub const MAX_FUTURE_BLOCK_TIME: u32 = 2 * 60 * 60;

/// Blocks between subsidy halvings.
pub const HALVING_INTERVAL: u32 = 210_000;

/// Base block subsidy at height 0.
pub const INITIAL_SUBSIDY: u64 = 50 * COIN;

/// Block subsidy at a given height, following the halving schedule.
pub fn block_subsidy(height: u32) -> u64 {
    let halvings = height / HALVING_INTERVAL;
    if halvings >= 64 {
        return 0;
    }
    INITIAL_SUBSIDY >> halvings
}
