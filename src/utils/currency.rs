use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive};

// Stripe and Creem report amounts as integers in the currency's smallest
// unit. The ledger stores decimals with two fractional digits.

/// Converts a provider minor-unit amount to a decimal; a missing amount is zero.
pub fn to_currency_amount(minor_units: Option<i64>) -> BigDecimal {
    match minor_units {
        Some(amount) => BigDecimal::from(amount) / BigDecimal::from(100),
        None => BigDecimal::from(0),
    }
}

/// Converts a stored decimal back to minor units, rounding half away from zero.
pub fn to_minor_units(amount: &BigDecimal) -> i64 {
    (amount * BigDecimal::from(100))
        .with_scale_round(0, RoundingMode::HalfUp)
        .to_i64()
        .unwrap_or(0)
}

/// True when `refunded_minor_units` covers the full stored total.
pub fn is_full_refund(refunded_minor_units: i64, original_total: &BigDecimal) -> bool {
    refunded_minor_units == to_minor_units(original_total)
}
