//! Exact conversions between base-unit integers and decimal token amounts.

use alloy::primitives::U256;
use bigdecimal::num_bigint::{BigInt, Sign};
use bigdecimal::BigDecimal;

pub fn u256_to_big_decimal(value: &U256) -> BigDecimal {
    let bytes = value.to_be_bytes::<32>();
    BigDecimal::from(BigInt::from_bytes_be(Sign::Plus, &bytes))
}

/// Truncates toward zero. `None` for negative values or values wider than 256 bits.
pub fn big_decimal_to_u256(value: &BigDecimal) -> Option<U256> {
    let (int, _) = value.with_scale(0).as_bigint_and_exponent();
    let (sign, bytes) = int.to_bytes_be();
    if sign == Sign::Minus {
        return None;
    }
    U256::try_from_be_slice(&bytes)
}

/// `10^decimals` as a decimal.
pub fn pow10(decimals: u8) -> BigDecimal {
    BigDecimal::new(BigInt::from(1), -i64::from(decimals))
}

/// Base units to whole tokens, e.g. `1500000` with 6 decimals is `1.5`.
pub fn normalize(amount: &U256, decimals: u8) -> BigDecimal {
    let bytes = amount.to_be_bytes::<32>();
    BigDecimal::new(BigInt::from_bytes_be(Sign::Plus, &bytes), i64::from(decimals))
}

/// Whole tokens back to base units, rounding down.
pub fn denormalize(amount: &BigDecimal, decimals: u8) -> Option<U256> {
    big_decimal_to_u256(&(amount * pow10(decimals)))
}

/// Fixed-point rendering with exactly `places` fractional digits, never in
/// exponent notation.
pub fn format_fixed(value: &BigDecimal, places: u32) -> String {
    let scale = i64::from(places);
    let (digits, _) = value.round(scale).with_scale(scale).as_bigint_and_exponent();
    let negative = digits.sign() == Sign::Minus;
    let mut text = digits.magnitude().to_string();

    let places = places as usize;
    if places > 0 {
        if text.len() <= places {
            text = format!("{}{}", "0".repeat(places + 1 - text.len()), text);
        }
        text.insert(text.len() - places, '.');
    }
    if negative {
        text.insert(0, '-');
    }
    text
}

/// Human readable amount with trailing zeros removed.
pub fn format_units(amount: &U256, decimals: u8) -> String {
    let text = format_fixed(&normalize(amount, decimals), u32::from(decimals));
    if decimals == 0 {
        return text;
    }
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_normalize_keeps_precision() {
        let amount = U256::from(1_500_000u64);
        assert_eq!(normalize(&amount, 6), BigDecimal::from_str("1.5").unwrap());

        let wei = U256::from_str("123456789012345678901").unwrap();
        assert_eq!(
            normalize(&wei, 18),
            BigDecimal::from_str("123.456789012345678901").unwrap()
        );
    }

    #[test]
    fn test_denormalize_rounds_down() {
        let value = BigDecimal::from_str("0.95").unwrap();
        assert_eq!(denormalize(&value, 0), Some(U256::ZERO));
        assert_eq!(denormalize(&value, 6), Some(U256::from(950_000u64)));
        assert_eq!(
            denormalize(&BigDecimal::from_str("1.0000009").unwrap(), 6),
            Some(U256::from(1_000_000u64))
        );
    }

    #[test]
    fn test_negative_is_not_an_amount() {
        assert_eq!(big_decimal_to_u256(&BigDecimal::from(-1)), None);
    }

    #[test]
    fn test_format_fixed() {
        assert_eq!(format_fixed(&BigDecimal::from_str("2.5").unwrap(), 6), "2.500000");
        assert_eq!(format_fixed(&BigDecimal::from_str("0.000001").unwrap(), 6), "0.000001");
        assert_eq!(format_fixed(&BigDecimal::from_str("0.0000004").unwrap(), 6), "0.000000");
        assert_eq!(format_fixed(&BigDecimal::from(1), 6), "1.000000");
        assert_eq!(format_fixed(&BigDecimal::from(42), 0), "42");
        assert_eq!(format_fixed(&BigDecimal::from_str("-0.25").unwrap(), 4), "-0.2500");
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(&U256::from(5_000_000u64), 6), "5");
        assert_eq!(format_units(&U256::from(1_230_000u64), 6), "1.23");
        assert_eq!(format_units(&U256::from(1u64), 18), "0.000000000000000001");
        assert_eq!(format_units(&U256::ZERO, 18), "0");
    }
}
