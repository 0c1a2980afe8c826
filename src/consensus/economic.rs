//! Economic rules: subsidy schedule and fee arithmetic.

use crate::consensus::constants::{subsidy, MAX_MONEY};
use crate::consensus::error::{ConsensusError, Result};
use crate::consensus::types::Transaction;

/// Maximum coinbase payout at a height given the fees collected in the block.
pub fn max_coinbase_payout(height: u32, total_fees: u64) -> u64 {
    subsidy(height).saturating_add(total_fees)
}

/// Fee of a transaction given its resolved input total.
///
/// Coinbase pays no fee. Errors if the inputs do not cover the outputs.
pub fn transaction_fee(tx: &Transaction, input_total: u64) -> Result<u64> {
    if tx.is_coinbase() {
        return Ok(0);
    }
    let output_total = tx.total_output();
    if input_total < output_total {
        return Err(ConsensusError::InsufficientInputs);
    }
    Ok(input_total - output_total)
}

/// Reject output sums beyond the money supply cap.
pub fn check_money_range(total: u64) -> Result<()> {
    if total > MAX_MONEY {
        return Err(ConsensusError::BadAmount);
    }
    Ok(())
}

/// Fee rate in satoshi per byte, rounding down; zero-size guards against
/// division by zero on pathological inputs.
pub fn fee_rate(fee: u64, size: usize) -> u64 {
    if size == 0 {
        return 0;
    }
    fee / size as u64
}
