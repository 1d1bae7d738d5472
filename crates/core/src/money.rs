//! Integer money arithmetic.
//!
//! Amounts are whole units of the billing currency. Every rounding step in the
//! pricing rules is a ratio (`weight / 1000`, `18 / 100`), so it is computed as
//! a half-up integer division instead of going through floating point.

/// Monetary amount in the smallest currency unit.
pub type Amount = u64;

/// `round(value * numerator / denominator)`, rounding halves up.
///
/// Computed in `u128`; results that do not fit in `u64` saturate.
/// A zero denominator yields zero.
pub fn round_ratio(value: u64, numerator: u64, denominator: u64) -> Amount {
    if denominator == 0 {
        return 0;
    }
    let den = denominator as u128;
    let scaled = (value as u128) * (numerator as u128) + den / 2;
    u64::try_from(scaled / den).unwrap_or(u64::MAX)
}
