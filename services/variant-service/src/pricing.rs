// =============================================================================
// PRICING ENGINE
// =============================================================================
// final = round2((base + Σ fixed) * (1 + Σ percentage / 100))
//
// Fixed deltas are always applied before percentage deltas, whatever order
// the modifiers arrive in. A negative result is floored at zero and reported
// as a warning; it never blocks generation. A result above MAX_PRICE (or one
// that overflows Decimal) is rejected.
// =============================================================================

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::generator::CandidateCombination;
use crate::metrics;
use crate::models::PriceModifier;

/// Price computed for one combination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceQuote {
    pub price: Decimal,

    /// The raw result was negative and has been floored at zero
    pub clamped: bool,
}

/// Largest price the `NUMERIC(12, 2)` price column can hold (9999999999.99)
pub const MAX_PRICE: Decimal = Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2);

/// Round half away from zero to two decimal places.
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn out_of_range(base_price: Decimal) -> AppError {
    AppError::BadRequest(format!(
        "variant price for base price {base_price} exceeds the maximum of {MAX_PRICE}"
    ))
}

/// Apply a set of modifiers to `base_price`.
///
/// # Errors
/// `BadRequest` when the arithmetic overflows or the price exceeds
/// [`MAX_PRICE`].
pub fn apply_modifiers<'a>(
    base_price: Decimal,
    modifiers: impl IntoIterator<Item = &'a PriceModifier>,
) -> AppResult<PriceQuote> {
    let mut fixed_total = Decimal::ZERO;
    let mut pct_total = Decimal::ZERO;
    for modifier in modifiers {
        let (sum, amount) = match modifier {
            PriceModifier::Fixed { amount } => (&mut fixed_total, *amount),
            PriceModifier::Percentage { amount } => (&mut pct_total, *amount),
        };
        *sum = sum
            .checked_add(amount)
            .ok_or_else(|| out_of_range(base_price))?;
    }

    let factor = pct_total
        .checked_div(Decimal::ONE_HUNDRED)
        .and_then(|pct| Decimal::ONE.checked_add(pct));
    let raw = base_price
        .checked_add(fixed_total)
        .zip(factor)
        .and_then(|(amount, factor)| amount.checked_mul(factor))
        .map(round2)
        .ok_or_else(|| out_of_range(base_price))?;

    if raw > MAX_PRICE {
        return Err(out_of_range(base_price));
    }

    if raw.is_sign_negative() && !raw.is_zero() {
        metrics::record_pricing_clamp();
        warn!(
            base_price = %base_price,
            fixed_total = %fixed_total,
            pct_total = %pct_total,
            raw_price = %raw,
            "Negative variant price clamped to zero; check attribute price modifiers"
        );
        return Ok(PriceQuote {
            price: Decimal::ZERO,
            clamped: true,
        });
    }

    Ok(PriceQuote {
        price: raw,
        clamped: false,
    })
}

/// Price one generated combination.
pub fn price(base_price: Decimal, combination: &CandidateCombination) -> AppResult<PriceQuote> {
    apply_modifiers(
        base_price,
        combination
            .values
            .iter()
            .flat_map(|value| value.price_modifiers.iter()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fixed(amount: Decimal) -> PriceModifier {
        PriceModifier::Fixed { amount }
    }

    fn pct(amount: Decimal) -> PriceModifier {
        PriceModifier::Percentage { amount }
    }

    #[test]
    fn test_empty_modifiers_return_base() {
        let quote = apply_modifiers(dec!(1000.00), &[]).unwrap();
        assert_eq!(quote.price, dec!(1000.00));
        assert!(!quote.clamped);
    }

    #[test]
    fn test_fixed_applies_before_percentage() {
        // Red has no modifier, 512GB carries +200 and +5%.
        let quote = apply_modifiers(dec!(1000), &[fixed(dec!(200)), pct(dec!(5))]).unwrap();
        assert_eq!(quote.price, dec!(1260.00));
    }

    #[test]
    fn test_result_does_not_depend_on_modifier_order() {
        let mods = [pct(dec!(12.5)), fixed(dec!(49.99)), pct(dec!(-3)), fixed(dec!(10))];
        let mut reversed = mods;
        reversed.reverse();

        let a = apply_modifiers(dec!(199.99), &mods).unwrap();
        let b = apply_modifiers(dec!(199.99), &reversed).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_matches_closed_form_for_many_modifier_sets() {
        let bases = [dec!(0), dec!(9.99), dec!(1000), dec!(1234.56)];
        let sets: Vec<Vec<PriceModifier>> = vec![
            vec![],
            vec![fixed(dec!(15))],
            vec![pct(dec!(7.5))],
            vec![fixed(dec!(-20)), pct(dec!(10)), fixed(dec!(3.33))],
            vec![pct(dec!(1)), pct(dec!(2)), pct(dec!(3))],
        ];

        for base in bases {
            for set in &sets {
                let fixed_sum: Decimal = set
                    .iter()
                    .filter_map(|m| match m {
                        PriceModifier::Fixed { amount } => Some(*amount),
                        _ => None,
                    })
                    .sum();
                let pct_sum: Decimal = set
                    .iter()
                    .filter_map(|m| match m {
                        PriceModifier::Percentage { amount } => Some(*amount),
                        _ => None,
                    })
                    .sum();
                let expected = round2((base + fixed_sum) * (dec!(1) + pct_sum / dec!(100)));
                let expected = expected.max(Decimal::ZERO);

                assert_eq!(apply_modifiers(base, set).unwrap().price, expected, "base {base} set {set:?}");
            }
        }
    }

    #[test]
    fn test_negative_price_is_clamped_not_rejected() {
        let quote = apply_modifiers(dec!(50), &[fixed(dec!(-80))]).unwrap();
        assert_eq!(quote.price, Decimal::ZERO);
        assert!(quote.clamped);
    }

    #[test]
    fn test_overflow_is_rejected_instead_of_panicking() {
        let result = apply_modifiers(Decimal::MAX, &[fixed(dec!(100))]);
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        let result = apply_modifiers(Decimal::MAX, &[pct(dec!(5))]);
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_price_ceiling_matches_column_precision() {
        assert_eq!(MAX_PRICE, dec!(9999999999.99));
        assert_eq!(apply_modifiers(MAX_PRICE, &[]).unwrap().price, MAX_PRICE);
        assert!(apply_modifiers(MAX_PRICE, &[fixed(dec!(0.01))]).is_err());
        assert!(apply_modifiers(dec!(9000000000), &[pct(dec!(20))]).is_err());
    }

    #[test]
    fn test_rounds_half_away_from_zero() {
        assert_eq!(round2(dec!(10.005)), dec!(10.01));
        assert_eq!(round2(dec!(10.004)), dec!(10.00));
    }
}
