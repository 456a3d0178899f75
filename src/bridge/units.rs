use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive as _;

use super::BridgeError;

/// Convert a human-unit amount into the chain's indivisible base unit.
/// Truncates toward zero: the broadcast amount is never larger than what the
/// caller authorized.
pub fn to_base_units(amount: Decimal, decimals: u32) -> Result<u128, BridgeError> {
    if amount.is_sign_negative() {
        return Err(BridgeError::InvalidInput(format!(
            "amount must not be negative: {amount}"
        )));
    }

    let scale = Decimal::from(10u64.pow(decimals));
    let scaled = amount.checked_mul(scale).ok_or_else(|| {
        BridgeError::InvalidInput(format!("amount out of range for scale {decimals}: {amount}"))
    })?;

    scaled.trunc().to_u128().ok_or_else(|| {
        BridgeError::InvalidInput(format!("amount out of range for scale {decimals}: {amount}"))
    })
}

/// Inverse of [`to_base_units`], for rendering chain balances in display
/// units.
pub fn from_base_units(units: u128, decimals: u32) -> Result<Decimal, BridgeError> {
    let units = i128::try_from(units).map_err(|_| {
        BridgeError::InvalidInput(format!("base amount out of range: {units}"))
    })?;
    Ok(Decimal::from_i128_with_scale(units, decimals).normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr as _;

    #[test]
    fn truncates_never_rounds_up() {
        let amount = Decimal::from_str("0.1234567891").unwrap();
        assert_eq!(to_base_units(amount, 9).unwrap(), 123_456_789);

        let amount = Decimal::from_str("0.999999999999").unwrap();
        assert_eq!(to_base_units(amount, 9).unwrap(), 999_999_999);
    }

    #[test]
    fn scales_whole_amounts() {
        assert_eq!(to_base_units(Decimal::from(5), 9).unwrap(), 5_000_000_000);
        assert_eq!(
            to_base_units(Decimal::from_str("2.5").unwrap(), 18).unwrap(),
            2_500_000_000_000_000_000
        );
    }

    #[test]
    fn rejects_negative() {
        assert!(to_base_units(Decimal::from(-1), 9).is_err());
    }

    #[test]
    fn base_units_round_trip_display() {
        let d = from_base_units(123_456_789, 9).unwrap();
        assert_eq!(d, Decimal::from_str("0.123456789").unwrap());
        assert_eq!(from_base_units(0, 18).unwrap(), Decimal::ZERO);
    }
}
