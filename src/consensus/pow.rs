//! Proof of work: compact targets, hash checks, retargeting, chain work.
//!
//! Targets are 256-bit little-endian integers encoded in headers as compact
//! "bits" (`mantissa * 256^(exponent-3)`). The PoW hash (Scrypt or Argon2id,
//! fixed per chain) is interpreted little-endian and must not exceed the
//! expanded target.

use crate::config::NetworkParams;
use crate::consensus::constants::{MAX_FUTURE_DRIFT, MEDIAN_TIME_SPAN};
use crate::consensus::error::{ConsensusError, Result};
use crate::consensus::serialization::serialize_header;
use crate::consensus::types::{BlockHeader, Hash};
use crate::crypto;

/// Unsigned 256-bit integer over four little-endian u64 limbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct U256(pub [u64; 4]);

impl U256 {
    pub const ZERO: U256 = U256([0; 4]);
    pub const MAX: U256 = U256([u64::MAX; 4]);

    pub fn from_u64(value: u64) -> Self {
        U256([value, 0, 0, 0])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }

    pub fn from_le_bytes(bytes: &[u8; 32]) -> Self {
        let mut words = [0u64; 4];
        for (i, word) in words.iter_mut().enumerate() {
            *word = u64::from_le_bytes(bytes[i * 8..(i + 1) * 8].try_into().expect("8 bytes"));
        }
        U256(words)
    }

    pub fn to_le_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for (i, &word) in self.0.iter().enumerate() {
            bytes[i * 8..(i + 1) * 8].copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    /// Number of significant bits.
    pub fn bits(&self) -> u32 {
        for (i, &word) in self.0.iter().enumerate().rev() {
            if word != 0 {
                return (i as u32) * 64 + (64 - word.leading_zeros());
            }
        }
        0
    }

    pub fn shl(&self, shift: u32) -> Self {
        if shift >= 256 {
            return U256::ZERO;
        }
        let mut result = U256::ZERO;
        let word_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;
        for i in 0..4 {
            if i + word_shift < 4 {
                result.0[i + word_shift] |= self.0[i] << bit_shift;
                if bit_shift > 0 && i + word_shift + 1 < 4 {
                    result.0[i + word_shift + 1] |= self.0[i] >> (64 - bit_shift);
                }
            }
        }
        result
    }

    pub fn shr(&self, shift: u32) -> Self {
        if shift >= 256 {
            return U256::ZERO;
        }
        let mut result = U256::ZERO;
        let word_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;
        for i in 0..4 {
            if i >= word_shift {
                result.0[i - word_shift] |= self.0[i] >> bit_shift;
                if bit_shift > 0 && i - word_shift >= 1 {
                    result.0[i - word_shift - 1] |= self.0[i] << (64 - bit_shift);
                }
            }
        }
        result
    }

    pub fn overflowing_add(&self, other: &U256) -> (U256, bool) {
        let mut result = U256::ZERO;
        let mut carry = false;
        for i in 0..4 {
            let (sum, c1) = self.0[i].overflowing_add(other.0[i]);
            let (sum, c2) = sum.overflowing_add(carry as u64);
            result.0[i] = sum;
            carry = c1 || c2;
        }
        (result, carry)
    }

    /// Wrapping subtraction; callers compare first when underflow matters.
    pub fn wrapping_sub(&self, other: &U256) -> U256 {
        let mut result = U256::ZERO;
        let mut borrow = false;
        for i in 0..4 {
            let (diff, b1) = self.0[i].overflowing_sub(other.0[i]);
            let (diff, b2) = diff.overflowing_sub(borrow as u64);
            result.0[i] = diff;
            borrow = b1 || b2;
        }
        result
    }

    /// Multiply by a u64, reporting overflow past 256 bits.
    pub fn overflowing_mul_u64(&self, rhs: u64) -> (U256, bool) {
        let mut result = U256::ZERO;
        let mut carry: u128 = 0;
        for i in 0..4 {
            let product = (self.0[i] as u128) * (rhs as u128) + carry;
            result.0[i] = product as u64;
            carry = product >> 64;
        }
        (result, carry != 0)
    }

    /// Divide by a u64 divisor, returning the quotient.
    pub fn div_u64(&self, divisor: u64) -> U256 {
        debug_assert!(divisor != 0);
        let mut result = U256::ZERO;
        let mut remainder: u128 = 0;
        for i in (0..4).rev() {
            let acc = (remainder << 64) | self.0[i] as u128;
            result.0[i] = (acc / divisor as u128) as u64;
            remainder = acc % divisor as u128;
        }
        result
    }

    /// Long division by another U256, returning the quotient.
    pub fn div(&self, divisor: &U256) -> U256 {
        if divisor.is_zero() {
            return U256::MAX;
        }
        if self < divisor {
            return U256::ZERO;
        }
        let mut quotient = U256::ZERO;
        let mut remainder = U256::ZERO;
        for bit in (0..self.bits()).rev() {
            remainder = remainder.shl(1);
            if (self.0[(bit / 64) as usize] >> (bit % 64)) & 1 == 1 {
                remainder.0[0] |= 1;
            }
            if &remainder >= divisor {
                remainder = remainder.wrapping_sub(divisor);
                quotient.0[(bit / 64) as usize] |= 1 << (bit % 64);
            }
        }
        quotient
    }
}

impl PartialOrd for U256 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U256 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        for (a, b) in self.0.iter().rev().zip(other.0.iter().rev()) {
            match a.cmp(b) {
                std::cmp::Ordering::Equal => continue,
                ordering => return ordering,
            }
        }
        std::cmp::Ordering::Equal
    }
}

// ============================================================================
// COMPACT TARGET ENCODING
// ============================================================================

/// Expand compact bits into a 256-bit target.
///
/// Rejects zero targets and encodings whose exponent pushes the mantissa
/// past 256 bits.
pub fn expand_target(bits: u32) -> Result<U256> {
    let exponent = (bits >> 24) as u8;
    let mantissa = bits & 0x007f_ffff;
    if bits & 0x0080_0000 != 0 {
        // Sign bit set encodes a negative target
        return Err(ConsensusError::BadBits);
    }
    if mantissa == 0 {
        return Err(ConsensusError::BadBits);
    }
    let target = if exponent <= 3 {
        U256::from_u64((mantissa >> (8 * (3 - exponent))) as u64)
    } else {
        if exponent > 32 {
            return Err(ConsensusError::BadBits);
        }
        let shift = 8 * (exponent as u32 - 3);
        let expanded = U256::from_u64(mantissa as u64).shl(shift);
        // Round-trip detects mantissa bits shifted off the top
        if expanded.shr(shift) != U256::from_u64(mantissa as u64) {
            return Err(ConsensusError::BadBits);
        }
        expanded
    };
    if target.is_zero() {
        return Err(ConsensusError::BadBits);
    }
    Ok(target)
}

/// Compress a 256-bit target into compact bits.
pub fn compact_from_target(target: &U256) -> u32 {
    let mut size = target.bits().div_ceil(8);
    let mut compact: u64 = if size <= 3 {
        (target.0[0] << (8 * (3 - size))) & 0x00ff_ffff
    } else {
        let shifted = target.shr(8 * (size - 3));
        shifted.0[0] & 0x00ff_ffff
    };
    // Avoid the sign bit: shift the mantissa down one byte if its high bit
    // would be set.
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }
    ((size as u64) << 24 | compact) as u32
}

/// Work contributed by a header: 2^256 / (target + 1).
pub fn block_work(bits: u32) -> Result<U256> {
    let target = expand_target(bits)?;
    // 2^256 / (target+1) == (~target / (target+1)) + 1
    let (divisor, overflow) = target.overflowing_add(&U256::from_u64(1));
    if overflow {
        return Ok(U256::from_u64(1));
    }
    let negated = U256::MAX.wrapping_sub(&target);
    let (work, _) = negated.div(&divisor).overflowing_add(&U256::from_u64(1));
    Ok(work)
}

/// Human-readable difficulty: pow_limit / target.
pub fn difficulty(bits: u32, pow_limit_bits: u32) -> f64 {
    let (Ok(target), Ok(limit)) = (expand_target(bits), expand_target(pow_limit_bits)) else {
        return 0.0;
    };
    // Approximate via the top 128 bits of each
    let to_f64 = |v: &U256| {
        v.0.iter()
            .enumerate()
            .map(|(i, &w)| (w as f64) * 2f64.powi(64 * i as i32))
            .sum::<f64>()
    };
    let t = to_f64(&target);
    if t == 0.0 {
        return 0.0;
    }
    to_f64(&limit) / t
}

// ============================================================================
// HASH CHECKS
// ============================================================================

/// Proof-of-work hash of a header under the chain's configured algorithm.
pub fn pow_hash(params: &NetworkParams, header: &BlockHeader) -> Hash {
    crypto::pow_hash(params.pow_algorithm, &serialize_header(header))
}

/// Check that a header's PoW hash meets its own declared target and that the
/// target does not exceed the network pow limit.
pub fn check_proof_of_work(params: &NetworkParams, header: &BlockHeader) -> Result<()> {
    let target = expand_target(header.bits)?;
    let limit = expand_target(params.pow_limit_bits)?;
    if target > limit {
        return Err(ConsensusError::BadBits);
    }
    let hash = pow_hash(params, header);
    if U256::from_le_bytes(&hash) > target {
        return Err(ConsensusError::PowInsufficient);
    }
    Ok(())
}

// ============================================================================
// RETARGETING
// ============================================================================

/// Compute the required bits for a block at `height`, given the previous
/// block's bits and the timestamps anchoring the closed retarget window.
///
/// Off retarget boundaries the previous bits carry over. On a boundary the
/// target scales by the actual window duration over the expected one,
/// clamped to [T/4, 4T], and is capped at the pow limit.
pub fn next_work_required(
    params: &NetworkParams,
    height: u32,
    prev_bits: u32,
    window_end_time: u32,
    window_start_time: u32,
) -> Result<u32> {
    if height == 0 {
        return Ok(params.genesis_bits);
    }
    if height % params.retarget_interval != 0 {
        return Ok(prev_bits);
    }

    let expected = params.retarget_interval as u64 * params.target_block_time;
    let actual = (window_end_time.saturating_sub(window_start_time)) as u64;
    let clamped = actual.clamp(expected / 4, expected * 4);

    let old_target = expand_target(prev_bits)?;
    let limit = expand_target(params.pow_limit_bits)?;
    let (scaled, overflow) = old_target.overflowing_mul_u64(clamped);
    let new_target = if overflow {
        // Scaling overflowed 256 bits; the cap below applies regardless
        limit
    } else {
        scaled.div_u64(expected)
    };
    let new_target = if new_target > limit { limit } else { new_target };
    Ok(compact_from_target(&new_target))
}

/// Median of the last [`MEDIAN_TIME_SPAN`] timestamps, newest last.
///
/// With fewer than the full span, the median is over what exists.
pub fn median_time_past(timestamps: &[u32]) -> u32 {
    if timestamps.is_empty() {
        return 0;
    }
    let mut window: Vec<u32> = timestamps
        .iter()
        .rev()
        .take(MEDIAN_TIME_SPAN)
        .copied()
        .collect();
    window.sort_unstable();
    window[window.len() / 2]
}

/// Header timestamp rule: strictly after the median of the previous eleven,
/// and not beyond the allowed clock skew.
pub fn check_header_time(header: &BlockHeader, prev_timestamps: &[u32], now: u64) -> Result<()> {
    if !prev_timestamps.is_empty() {
        let mtp = median_time_past(prev_timestamps);
        if header.timestamp <= mtp {
            return Err(ConsensusError::BadTimestamp(format!(
                "{} not after median time past {}",
                header.timestamp, mtp
            )));
        }
    }
    if header.timestamp as u64 > now + MAX_FUTURE_DRIFT {
        return Err(ConsensusError::BadTimestamp(format!(
            "{} too far in the future",
            header.timestamp
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkParams;

    #[test]
    fn test_u256_ordering() {
        assert!(U256::from_u64(1) < U256::from_u64(2));
        assert!(U256([0, 1, 0, 0]) > U256::from_u64(u64::MAX));
        assert_eq!(U256::ZERO, U256::ZERO);
    }

    #[test]
    fn test_u256_le_bytes_round_trip() {
        let value = U256([1, 2, 3, 4]);
        assert_eq!(U256::from_le_bytes(&value.to_le_bytes()), value);
    }

    #[test]
    fn test_u256_mul_div() {
        let v = U256::from_u64(1000);
        let (scaled, overflow) = v.overflowing_mul_u64(4000);
        assert!(!overflow);
        assert_eq!(scaled, U256::from_u64(4_000_000));
        assert_eq!(scaled.div_u64(4000), v);
    }

    #[test]
    fn test_u256_mul_overflow_detected() {
        let (_, overflow) = U256::MAX.overflowing_mul_u64(2);
        assert!(overflow);
    }

    #[test]
    fn test_u256_long_division() {
        let a = U256([0, 0, 1, 0]); // 2^128
        let b = U256::from_u64(2);
        assert_eq!(a.div(&b), U256([0, 1 << 63, 0, 0]));
        assert_eq!(U256::from_u64(7).div(&U256::from_u64(3)), U256::from_u64(2));
        assert_eq!(U256::from_u64(1).div(&U256::from_u64(3)), U256::ZERO);
    }

    #[test]
    fn test_expand_compact_round_trip() {
        for bits in [0x1d00ffffu32, 0x207fffff, 0x1b0404cb, 0x03123400] {
            let target = expand_target(bits).unwrap();
            assert_eq!(compact_from_target(&target), bits);
        }
    }

    #[test]
    fn test_expand_target_rejects_bad_encodings() {
        assert!(expand_target(0x1d000000).is_err()); // zero mantissa
        assert!(expand_target(0x21ffffff).is_err()); // exponent too large
        assert!(expand_target(0x1d800000).is_err()); // sign bit
    }

    #[test]
    fn test_block_work_inverse_to_target() {
        let easy = block_work(0x207fffff).unwrap();
        let hard = block_work(0x1d00ffff).unwrap();
        assert!(hard > easy);
    }

    #[test]
    fn test_median_time_past() {
        assert_eq!(median_time_past(&[5]), 5);
        assert_eq!(median_time_past(&[1, 2, 3]), 2);
        // Only the last eleven count
        let times: Vec<u32> = (0..20).collect();
        assert_eq!(median_time_past(&times), 14);
    }

    #[test]
    fn test_check_header_time_rules() {
        let header = BlockHeader {
            version: 1,
            prev_hash: [0; 32],
            merkle_root: [0; 32],
            timestamp: 1000,
            bits: 0x207fffff,
            nonce: 0,
        };
        // Must exceed MTP
        assert!(check_header_time(&header, &[1000, 1001, 1002], 10_000).is_err());
        assert!(check_header_time(&header, &[1, 2, 3], 10_000).is_ok());
        // Must not be too far in the future
        assert!(check_header_time(&header, &[1, 2, 3], 0).is_err());
    }

    #[test]
    fn test_retarget_carries_bits_off_boundary() {
        let params = NetworkParams::regtest();
        let bits = next_work_required(&params, 5, 0x207fffff, 0, 0).unwrap();
        assert_eq!(bits, 0x207fffff);
    }

    #[test]
    fn test_retarget_clamps_at_four_x() {
        let mut params = NetworkParams::regtest();
        params.retarget_interval = 4;
        params.target_block_time = 600;
        // Window twenty times longer than expected: clamp to 4x, but capped
        // at the pow limit.
        let expected = 4 * 600;
        let slow = next_work_required(&params, 4, 0x1d00ffff, 20 * expected as u32, 0).unwrap();
        let clamped = next_work_required(&params, 4, 0x1d00ffff, 4 * expected as u32, 0).unwrap();
        assert_eq!(slow, clamped);

        // Window twenty times shorter: clamp to 1/4.
        let fast = next_work_required(&params, 4, 0x1d00ffff, expected as u32 / 20, 0).unwrap();
        let quarter = next_work_required(&params, 4, 0x1d00ffff, expected as u32 / 4, 0).unwrap();
        assert_eq!(fast, quarter);
        // Faster blocks mean a smaller target
        assert!(expand_target(fast).unwrap() < expand_target(slow).unwrap());
    }

    #[test]
    fn test_retarget_steady_state_keeps_target() {
        let mut params = NetworkParams::regtest();
        params.retarget_interval = 2016;
        params.target_block_time = 600;
        let expected = (2016u32) * 600;
        let bits = next_work_required(&params, 2016, 0x1d00ffff, expected, 0).unwrap();
        assert_eq!(bits, 0x1d00ffff);
    }
}
