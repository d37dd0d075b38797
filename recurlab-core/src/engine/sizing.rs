//! Order sizing for fixed-amount contributions.

/// Whole units bought with `amount` at `price`: `floor(amount / price)`.
///
/// Leftover cash is discarded, not carried to the next contribution.
/// `price` must be positive; the series invariant guarantees that for closes.
/// Returns `None` when the unit count does not fit in a `u64`.
pub fn order_size(amount: u64, price: f64) -> Option<u64> {
    debug_assert!(price > 0.0, "order_size requires a positive price");
    let units = (amount as f64 / price).floor();
    // `u64::MAX as f64` rounds up to 2^64, which is already out of range.
    if units.is_finite() && units >= 0.0 && units < u64::MAX as f64 {
        Some(units as u64)
    } else {
        None
    }
}
