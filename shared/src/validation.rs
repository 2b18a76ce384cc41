//! Validation utilities for the bonded-zone inventory service
//!
//! Field validators plugged into `validator` derives, plus the Indonesian
//! customs identifiers checked before anything is reported to INSW.

use std::borrow::Cow;
use std::collections::HashSet;

use rust_decimal::Decimal;
use validator::ValidationError;

use crate::models::ItemKey;

// ============================================================================
// Quantity Validations
// ============================================================================

/// Decimal places stored for quantities
pub const QTY_SCALE: u32 = 6;

/// Decimal places stored for monetary amounts
pub const AMOUNT_SCALE: u32 = 4;

fn check_scale(value: &Decimal, max: u32) -> Result<(), ValidationError> {
    if value.normalize().scale() > max {
        let mut err = ValidationError::new("scale");
        err.message = Some(Cow::from(format!(
            "Value may have at most {max} decimal places"
        )));
        return Err(err);
    }
    Ok(())
}

/// Quantity must be strictly positive
pub fn positive_quantity(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        let mut err = ValidationError::new("positive");
        err.message = Some(Cow::from("Quantity must be greater than zero"));
        return Err(err);
    }
    check_scale(value, QTY_SCALE)
}

/// Quantity may be zero but not negative
pub fn non_negative_quantity(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        let mut err = ValidationError::new("non_negative");
        err.message = Some(Cow::from("Quantity cannot be negative"));
        return Err(err);
    }
    check_scale(value, QTY_SCALE)
}

/// Amount may be zero but not negative
pub fn non_negative_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        let mut err = ValidationError::new("non_negative");
        err.message = Some(Cow::from("Amount cannot be negative"));
        return Err(err);
    }
    check_scale(value, AMOUNT_SCALE)
}

/// Return the first item key that appears more than once
pub fn find_duplicate_key<I>(keys: I) -> Option<ItemKey>
where
    I: IntoIterator<Item = ItemKey>,
{
    let mut seen = HashSet::new();
    keys.into_iter().find(|key| !seen.insert(key.clone()))
}

// ============================================================================
// Indonesia-Specific Validations
// ============================================================================

/// Validate NPWP (tax id): 15 digits, or the 16 digit NIK-based form.
/// Separators (`.` and `-`) are ignored.
pub fn validate_npwp(npwp: &str) -> Result<(), &'static str> {
    if npwp
        .chars()
        .any(|c| !(c.is_ascii_digit() || c == '.' || c == '-'))
    {
        return Err("NPWP may only contain digits, dots and dashes");
    }
    let digits = npwp.chars().filter(|c| c.is_ascii_digit()).count();
    if digits == 15 || digits == 16 {
        Ok(())
    } else {
        Err("NPWP must have 15 or 16 digits")
    }
}

/// NPWP with separators removed, as INSW expects it
pub fn normalize_npwp(npwp: &str) -> String {
    npwp.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_positive_quantity() {
        assert!(positive_quantity(&Decimal::from_str("0.01").unwrap()).is_ok());
        assert!(positive_quantity(&Decimal::ZERO).is_err());
        assert!(positive_quantity(&Decimal::from(-1)).is_err());
    }

    #[test]
    fn test_non_negative_quantity() {
        assert!(non_negative_quantity(&Decimal::ZERO).is_ok());
        let err = non_negative_quantity(&Decimal::from(-2)).unwrap_err();
        assert_eq!(err.code, "non_negative");
    }

    #[test]
    fn test_quantity_scale_bound() {
        let too_fine = Decimal::from_str("100.0000001").unwrap();
        assert_eq!(non_negative_quantity(&too_fine).unwrap_err().code, "scale");
        assert_eq!(positive_quantity(&too_fine).unwrap_err().code, "scale");
        // Trailing zeros do not count against the scale
        assert!(positive_quantity(&Decimal::from_str("1.50000000").unwrap()).is_ok());
        assert!(non_negative_quantity(&Decimal::from_str("0.000001").unwrap()).is_ok());
        assert_eq!(
            non_negative_amount(&Decimal::from_str("1.00001").unwrap()).unwrap_err().code,
            "scale"
        );
    }

    #[test]
    fn test_find_duplicate_key() {
        let keys = vec![
            ItemKey::new("A", "RAW"),
            ItemKey::new("A", "FG"),
            ItemKey::new("B", "RAW"),
            ItemKey::new("A", "RAW"),
        ];
        assert_eq!(find_duplicate_key(keys), Some(ItemKey::new("A", "RAW")));
        assert_eq!(find_duplicate_key(vec![ItemKey::new("A", "RAW")]), None);
    }

    #[test]
    fn test_validate_npwp() {
        assert!(validate_npwp("01.234.567.8-901.000").is_ok());
        assert!(validate_npwp("0123456789012345").is_ok());
        assert!(validate_npwp("12345").is_err());
        assert!(validate_npwp("01.234.567.8-90A.000").is_err());
    }

    #[test]
    fn test_normalize_npwp() {
        assert_eq!(normalize_npwp("01.234.567.8-901.000"), "012345678901000");
    }
}
