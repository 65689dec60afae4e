//! Wager matching tolerance
//!
//! A matching wager must lie within ±1% of the opening wager, both bounds
//! inclusive, with each bound truncated toward zero. Bounds are computed in
//! u128 so no admissible opening wager can overflow.

use crate::error::FlipError;

/// Lower bound, in percent of the opening wager
pub const MIN_MATCH_PERCENT: u128 = 99;

/// Upper bound, in percent of the opening wager
pub const MAX_MATCH_PERCENT: u128 = 101;

/// Largest opening wager whose maximum pool still fits in a u64.
///
/// `floor(2^64 * 100 / 201)`; its worst-case pool is exactly `u64::MAX`.
pub const MAX_OPENING_WAGER: u64 = ((u64::MAX as u128 + 1) * 100 / 201) as u64;

/// Inclusive `(min, max)` matching range for `opening`
pub fn wager_bounds(opening: u64) -> (u64, u64) {
    let opening = opening as u128;
    let min = opening * MIN_MATCH_PERCENT / 100;
    let max = opening * MAX_MATCH_PERCENT / 100;
    // max saturates only for openings far above MAX_OPENING_WAGER
    (min as u64, u64::try_from(max).unwrap_or(u64::MAX))
}

/// Reject an opening wager outside `1..=MAX_OPENING_WAGER`.
pub fn check_opening_wager(amount: u64) -> Result<(), FlipError> {
    if amount == 0 || amount > MAX_OPENING_WAGER {
        return Err(FlipError::WagerOutOfRange { wager: amount, min: 1, max: MAX_OPENING_WAGER });
    }
    Ok(())
}

/// Reject a matching wager outside the opening wager's tolerance window.
pub fn check_matching_wager(opening: u64, matching: u64) -> Result<(), FlipError> {
    let (min, max) = wager_bounds(opening);
    if matching < min || matching > max {
        return Err(FlipError::WagerOutOfRange { wager: matching, min, max });
    }
    Ok(())
}

/// Total pool after a match; `None` only for inputs no open would accept.
pub fn total_pool(opening: u64, matching: u64) -> Option<u64> {
    opening.checked_add(matching)
}
