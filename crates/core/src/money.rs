//! Integer money arithmetic.
//!
//! Amounts are `i64` minor units (cents), rates are basis points (`2000` = 20 %)
//! and quantities are thousandths of a unit (`1500` = 1.5). Every rounding step is
//! half-up (away from zero) to two decimals, performed once on an exact `i128`
//! intermediate.

/// Basis points in 100 %.
pub const FULL_RATE_BPS: u32 = 10_000;

/// Thousandths in one unit of quantity.
pub const QUANTITY_SCALE: i64 = 1_000;

/// Divide rounding half away from zero. `den` must be positive.
fn div_round_half_up(num: i128, den: i128) -> i128 {
    let q = num / den;
    let r = num % den;
    if r.abs() * 2 >= den {
        q + num.signum()
    } else {
        q
    }
}

fn clamp_i64(v: i128) -> Option<i64> {
    i64::try_from(v).ok()
}

/// Net amount of a document line: `quantity × unit price × (1 − discount)`.
///
/// Returns `None` when the result does not fit an `i64`.
pub fn line_total(quantity_milli: i64, unit_price: i64, discount_bps: u32) -> Option<i64> {
    let discount = i128::from(discount_bps.min(FULL_RATE_BPS));
    let num = i128::from(quantity_milli)
        * i128::from(unit_price)
        * (i128::from(FULL_RATE_BPS) - discount);
    let den = i128::from(QUANTITY_SCALE) * i128::from(FULL_RATE_BPS);
    clamp_i64(div_round_half_up(num, den))
}

/// Apply a rate in basis points to an amount (VAT, percentage discounts).
pub fn apply_rate(amount: i64, rate_bps: u32) -> i64 {
    let v = div_round_half_up(
        i128::from(amount) * i128::from(rate_bps),
        i128::from(FULL_RATE_BPS),
    );
    // |amount × rate / 10000| stays within i64 for any rate up to 100 %.
    clamp_i64(v).unwrap_or(if amount < 0 { i64::MIN } else { i64::MAX })
}

/// Parse a decimal string (`"120.5"`, `"-3"`, `"0.19600000"`) into an integer
/// scaled by `10^scale`, rounding extra digits half-up.
///
/// `parse_decimal("19.6", 2)` is `Some(1960)`; a VAT rate of `"19.6"` percent read
/// with scale 2 yields basis points directly.
pub fn parse_decimal(text: &str, scale: u32) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let (negative, digits) = match text.as_bytes()[0] {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let mut value: i128 = 0;
    for b in int_part.bytes() {
        value = value.checked_mul(10)?.checked_add(i128::from(b - b'0'))?;
    }
    let frac = frac_part.as_bytes();
    for i in 0..scale as usize {
        let digit = frac.get(i).map(|b| i128::from(b - b'0')).unwrap_or(0);
        value = value.checked_mul(10)?.checked_add(digit)?;
    }
    if let Some(next) = frac.get(scale as usize) {
        if *next >= b'5' {
            value += 1;
        }
    }
    if negative {
        value = -value;
    }
    clamp_i64(value)
}

/// Render minor units as a plain decimal string with two digits (`-12.30`).
pub fn format_minor(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = i128::from(amount).abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn line_total_applies_quantity_and_discount() {
        // 2.5 × 10.00 with 10 % off = 22.50
        assert_eq!(line_total(2_500, 1_000, 1_000), Some(2_250));
        // 1 × 0.05 with 50 % off = 0.025 -> 0.03 (half-up)
        assert_eq!(line_total(1_000, 5, 5_000), Some(3));
        assert_eq!(line_total(1_000, 1_999, 0), Some(1_999));
    }

    #[test]
    fn rates_round_half_up() {
        assert_eq!(apply_rate(1_999, 2_000), 400); // 3.998 -> 4.00
        assert_eq!(apply_rate(25, 2_000), 5);
        assert_eq!(apply_rate(-25, 2_000), -5);
        assert_eq!(apply_rate(1_000, 550), 55);
    }

    #[test]
    fn parses_dolibarr_style_decimals() {
        assert_eq!(parse_decimal("120.50000000", 2), Some(12_050));
        assert_eq!(parse_decimal("19.6", 2), Some(1_960));
        assert_eq!(parse_decimal("-3", 2), Some(-300));
        assert_eq!(parse_decimal("0.005", 2), Some(1));
        assert_eq!(parse_decimal(".5", 2), Some(50));
        assert_eq!(parse_decimal("1.5", 3), Some(1_500));
        assert_eq!(parse_decimal("abc", 2), None);
        assert_eq!(parse_decimal("", 2), None);
        assert_eq!(parse_decimal("1.2.3", 2), None);
    }

    #[test]
    fn formats_minor_units() {
        assert_eq!(format_minor(1_230), "12.30");
        assert_eq!(format_minor(-5), "-0.05");
        assert_eq!(format_minor(0), "0.00");
    }

    proptest! {
        #[test]
        fn full_discount_is_free(qty in 1i64..1_000_000, price in 0i64..10_000_000) {
            prop_assert_eq!(line_total(qty, price, FULL_RATE_BPS), Some(0));
        }

        #[test]
        fn whole_quantities_without_discount_are_exact(units in 1i64..10_000, price in 0i64..10_000_000) {
            prop_assert_eq!(line_total(units * QUANTITY_SCALE, price, 0), Some(units * price));
        }

        #[test]
        fn formatted_amounts_parse_back(amount in -1_000_000_000i64..1_000_000_000) {
            prop_assert_eq!(parse_decimal(&format_minor(amount), 2), Some(amount));
        }
    }
}
