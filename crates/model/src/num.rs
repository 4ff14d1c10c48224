/// Amount in the smallest unit of the payment token.
pub type Amount = u128;

/// Denominator of basis-point factors.
pub const BASIS_POINTS: u16 = 10_000;

/// Apply a basis-point factor to `amount`, rounding down.
///
/// Returns `None` on overflow.
#[inline]
pub fn apply_bps(amount: Amount, bps: u16) -> Option<Amount> {
    amount
        .checked_mul(Amount::from(bps))?
        .checked_div(Amount::from(BASIS_POINTS))
}

/// Checked sum of amounts.
pub fn checked_sum<'a>(amounts: impl IntoIterator<Item = &'a Amount>) -> Option<Amount> {
    amounts
        .into_iter()
        .try_fold(0, |acc: Amount, amount| acc.checked_add(*amount))
}

/// Sum of basis points, widened so that it never overflows for short tables.
pub fn bps_total(table: &[u16]) -> u32 {
    table.iter().map(|bps| u32::from(*bps)).sum()
}
