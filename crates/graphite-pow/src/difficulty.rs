//! Difficulty encoding and retarget algebra.
//!
//! Targets are 256-bit big-endian thresholds carried in headers as a 4-byte
//! compact form: exponent in the high byte, 23-bit coefficient below it.
//! A proof satisfies a target when the SHA-256 of its serialization,
//! compared as a big-endian integer, is less than or equal to the target.

use num_bigint::BigUint;

/// Expand compact `bits` into a 32-byte big-endian target.
pub fn compact_to_target(bits: u32) -> [u8; 32] {
    let exp = (bits >> 24) as usize;
    let coef = bits & 0x007F_FFFF;
    let mut target = [0u8; 32];

    if exp <= 3 {
        let value = coef >> (8 * (3 - exp));
        target[28..32].copy_from_slice(&value.to_be_bytes());
        return target;
    }

    let offset = 32i64 - exp as i64;
    let bytes = [(coef >> 16) as u8, (coef >> 8) as u8, coef as u8];
    for (i, b) in bytes.into_iter().enumerate() {
        let pos = offset + i as i64;
        if (0..32).contains(&pos) {
            target[pos as usize] = b;
        } else if pos < 0 && b != 0 {
            // A nonzero byte above bit 255 cannot be represented; saturate.
            return [0xFF; 32];
        }
    }
    target
}

/// Compress a 32-byte big-endian target into compact bits.
///
/// The top three significant bytes become the coefficient; if its high bit
/// is set the coefficient is shifted right one byte and the exponent bumped,
/// so the sign bit of the legacy encoding stays clear.
pub fn target_to_compact(target: &[u8; 32]) -> u32 {
    let first = match target.iter().position(|&b| b != 0) {
        Some(i) => i,
        None => return 0,
    };
    let size = 32 - first;

    let mut coef = (target[first] as u32) << 16;
    if first + 1 < 32 {
        coef |= (target[first + 1] as u32) << 8;
    }
    if first + 2 < 32 {
        coef |= target[first + 2] as u32;
    }

    let (size, coef) = if coef & 0x0080_0000 != 0 {
        (size as u32 + 1, coef >> 8)
    } else {
        (size as u32, coef)
    };
    (size << 24) | coef
}

/// Big-endian unsigned comparison `hash <= target`.
pub fn hash_meets_target(hash: &[u8; 32], target: &[u8; 32]) -> bool {
    hash <= target
}

/// Work contributed by a block mined at `bits`.
///
/// Smaller targets yield more work. Only the top 8 target bytes enter the
/// quotient; cumulative chain work adds these with wrapping arithmetic.
pub fn work_for_bits(bits: u32) -> u64 {
    let target = compact_to_target(bits);
    let top = u64::from_be_bytes(target[0..8].try_into().unwrap());
    u64::MAX / top.max(1)
}

/// Compute the compact bits after a retarget window.
///
/// The timespan ratio is clamped to [1/4, 4]; the new target is the old one
/// scaled by `actual/expected` and clamped so it is never easier than the
/// network minimum encoded by `min_bits`.
pub fn retarget(current_bits: u32, actual_secs: u64, expected_secs: u64, min_bits: u32) -> u32 {
    let expected = expected_secs.max(1);
    let actual = actual_secs
        .clamp(expected / 4, expected.saturating_mul(4))
        .max(1);

    let current = BigUint::from_bytes_be(&compact_to_target(current_bits));
    let mut next = current * actual / expected;

    let min_target = BigUint::from_bytes_be(&compact_to_target(min_bits));
    if next > min_target {
        next = min_target;
    }

    let raw = next.to_bytes_be();
    let mut padded = [0u8; 32];
    padded[32 - raw.len()..].copy_from_slice(&raw);
    target_to_compact(&padded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_roundtrip() {
        for bits in [0x1d00_ffffu32, 0x1b04_04cb, 0x2100_ffff, 0x1703_4d4b] {
            let target = compact_to_target(bits);
            assert_eq!(target_to_compact(&target), bits, "bits {:#x}", bits);
        }
    }

    #[test]
    fn test_small_exponent_is_right_aligned() {
        let target = compact_to_target(0x0300_1234);
        assert_eq!(target[30], 0x12);
        assert_eq!(target[31], 0x34);
        assert!(target[..30].iter().all(|&b| b == 0));

        // exp=2 drops the low coefficient byte
        let target = compact_to_target(0x0200_1234);
        assert_eq!(target[31], 0x12);
        assert!(target[..31].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_zero_target() {
        assert_eq!(compact_to_target(0), [0u8; 32]);
        assert_eq!(target_to_compact(&[0u8; 32]), 0);
    }

    #[test]
    fn test_high_bit_coefficient_renormalizes() {
        let mut target = [0u8; 32];
        target[4] = 0x80; // would set the coefficient sign bit
        let bits = target_to_compact(&target);
        assert_eq!(bits >> 24, 29); // size bumped from 28 to 29
        assert_eq!(bits & 0x007F_FFFF, 0x8000);
        // Re-expansion reproduces the same target.
        assert_eq!(compact_to_target(bits), target);
    }

    #[test]
    fn test_all_ones_target_accepts_everything() {
        let target = [0xFF; 32];
        assert!(hash_meets_target(&[0xFF; 32], &target));
        assert!(hash_meets_target(&[0x00; 32], &target));
    }

    #[test]
    fn test_all_zero_target_rejects_everything_nonzero() {
        let target = [0x00; 32];
        assert!(!hash_meets_target(&[0x01; 32], &target));
        let mut barely = [0u8; 32];
        barely[31] = 1;
        assert!(!hash_meets_target(&barely, &target));
    }

    #[test]
    fn test_work_ordering() {
        // Smaller target (harder) => more work.
        let easy = work_for_bits(0x2100_ffff);
        let hard = work_for_bits(0x1d00_ffff);
        assert!(hard > easy);
    }

    #[test]
    fn test_work_never_zero() {
        assert!(work_for_bits(0x2100_ffff) >= 1);
        // Degenerate zero target maps to max work rather than dividing by zero.
        assert_eq!(work_for_bits(0), u64::MAX);
    }

    #[test]
    fn test_retarget_slow_blocks_get_easier() {
        let bits = 0x1d00_ffff;
        let min = 0x2100_ffff;
        let new_bits = retarget(bits, 2000, 1000, min);
        let old = compact_to_target(bits);
        let new = compact_to_target(new_bits);
        assert!(new >= old, "slow blocks must not make the target harder");
    }

    #[test]
    fn test_retarget_fast_blocks_get_harder() {
        let bits = 0x1d00_ffff;
        let min = 0x2100_ffff;
        let new_bits = retarget(bits, 500, 1000, min);
        let old = compact_to_target(bits);
        let new = compact_to_target(new_bits);
        assert!(new <= old, "fast blocks must not make the target easier");
    }

    #[test]
    fn test_retarget_ratio_clamped() {
        let bits = 0x1d00_ffff;
        let min = 0x2100_ffff;
        // 100x slower clamps to 4x easier.
        let capped = retarget(bits, 100_000, 1000, min);
        let four_x = retarget(bits, 4000, 1000, min);
        assert_eq!(capped, four_x);
    }

    #[test]
    fn test_retarget_clamps_to_minimum() {
        // Already at the minimum and slowing further: stays at the minimum.
        let min = 0x2100_ffff;
        let new_bits = retarget(min, 4000, 1000, min);
        assert_eq!(new_bits, min);
    }

    #[test]
    fn test_retarget_perfect_timing_is_stable() {
        let bits = 0x1d00_ffff;
        let new_bits = retarget(bits, 1000, 1000, 0x2100_ffff);
        assert_eq!(new_bits, bits);
    }
}
