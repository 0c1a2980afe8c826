//! Consensus constants, fixed for every network at genesis.

/// Satoshi per coin. One satoshi represents one kilogram of CO2.
pub const COIN: u64 = 100_000_000;

/// Maximum money supply in satoshi.
pub const MAX_MONEY: u64 = 21_000_000 * COIN;

/// Initial block subsidy.
pub const INITIAL_SUBSIDY: u64 = 50 * COIN;

/// Subsidy halves every this many blocks.
pub const HALVING_INTERVAL: u32 = 210_000;

/// Target seconds between blocks.
pub const TARGET_BLOCK_TIME: u64 = 600;

/// Difficulty retarget interval in blocks.
pub const RETARGET_INTERVAL: u32 = 2016;

/// Maximum serialized block size in bytes.
pub const MAX_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Maximum transactions per block.
pub const MAX_BLOCK_TXS: usize = 2000;

/// Maximum serialized transaction size in bytes.
pub const MAX_TX_SIZE: usize = 1_000_000;

/// Maximum inputs per transaction.
pub const MAX_INPUTS: usize = 1000;

/// Maximum outputs per transaction.
pub const MAX_OUTPUTS: usize = 1000;

/// Maximum signature or public key length accepted by the wire codec.
pub const MAX_SIG_SIZE: usize = 10_000;

/// Maximum address length accepted by the wire codec.
pub const MAX_ADDRESS_SIZE: usize = 128;

/// Maximum certificate id length accepted by the wire codec.
pub const MAX_CERT_ID_SIZE: usize = 64;

/// Headers may not be more than this many seconds ahead of local time.
pub const MAX_FUTURE_DRIFT: u64 = 2 * 60 * 60;

/// Number of prior headers used for the median-time-past rule.
pub const MEDIAN_TIME_SPAN: usize = 11;

/// Minimum absolute relay fee in satoshi.
pub const MIN_RELAY_FEE: u64 = 1000;

/// Minimum relay fee rate in satoshi per serialized byte.
pub const MIN_RELAY_FEE_RATE: u64 = 1;

/// Mempool capacity: maximum number of transactions.
pub const MEMPOOL_MAX_TXS: usize = 10_000;

/// Mempool capacity: maximum total serialized bytes (300 MB).
pub const MEMPOOL_MAX_BYTES: usize = 300 * 1_000_000;

/// Orphan pool capacity: maximum held blocks.
pub const ORPHAN_POOL_MAX: usize = 100;

/// Orphan pool: maximum age in seconds before expiry.
pub const ORPHAN_MAX_AGE: u64 = 3600;

/// Block subsidy at a given height, halving every [`HALVING_INTERVAL`].
///
/// Drops to zero from the 64th halving onward.
pub fn subsidy(height: u32) -> u64 {
    let halvings = height / HALVING_INTERVAL;
    if halvings >= 64 {
        return 0;
    }
    INITIAL_SUBSIDY >> halvings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subsidy_schedule() {
        assert_eq!(subsidy(0), 50 * COIN);
        assert_eq!(subsidy(209_999), 50 * COIN);
        assert_eq!(subsidy(210_000), 25 * COIN);
        assert_eq!(subsidy(420_000), 1_250_000_000);
    }

    #[test]
    fn test_subsidy_cliff_after_64_halvings() {
        assert_eq!(subsidy(64 * HALVING_INTERVAL - 1), 0); // 63rd halving already shifts to zero
        assert_eq!(subsidy(64 * HALVING_INTERVAL), 0);
        assert_eq!(subsidy(u32::MAX), 0);
    }

    #[test]
    fn test_total_supply_below_max_money() {
        let mut total: u64 = 0;
        for halving in 0..64u32 {
            total += (INITIAL_SUBSIDY >> halving) * HALVING_INTERVAL as u64;
        }
        assert!(total <= MAX_MONEY);
    }
}
