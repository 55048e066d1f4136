//! Network policy constants and the subsidy schedule.

/// Blocks between difficulty retargets.
pub const BLOCKS_PER_ADJUSTMENT: u64 = 2016;

/// Target spacing between blocks, seconds.
pub const TARGET_BLOCK_SECONDS: u64 = 600;

/// Maximum tolerated clock drift for header timestamps, seconds.
pub const MAX_FUTURE_DRIFT_SECS: u64 = 7200;

/// Serialized block size cap.
pub const MAX_BLOCK_BYTES: usize = 1_048_576;

/// Transactions-per-block cap.
pub const MAX_BLOCK_TXS: usize = 4096;

/// Inputs-per-transaction cap.
pub const MAX_TX_INPUTS: usize = 1024;

/// Outputs-per-transaction cap.
pub const MAX_TX_OUTPUTS: usize = 1024;

/// Script size cap, bytes.
pub const MAX_SCRIPT_BYTES: usize = 1024;

/// Coinbase subsidy at height 0, in base units (8 decimals).
pub const BASE_SUBSIDY: u64 = 50_0000_0000;

/// Blocks between subsidy halvings.
pub const HALVING_INTERVAL: u64 = 210_000;

/// Easiest compact target the network accepts.
pub const MIN_BITS: u32 = 0x2100_ffff;

/// Coinbase subsidy at a height. Zero after 63 halvings.
pub fn subsidy(height: u64) -> u64 {
    let halvings = height / HALVING_INTERVAL;
    if halvings > 63 {
        return 0;
    }
    BASE_SUBSIDY >> halvings
}
