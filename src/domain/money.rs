//! Minor-unit currency arithmetic.
//!
//! Amounts move through the engine as integer minor units (kobo, pesewas,
//! cents). Providers that bill in major units get a decimal string produced
//! with integer math only.

/// ISO 4217 minor-unit exponent for the currencies the engine routes.
/// Returns `None` for currencies no adapter is configured to handle.
pub fn minor_unit_exponent(currency: &str) -> Option<u32> {
    let exp = match currency {
        "NGN" | "GHS" | "KES" | "ZAR" | "TZS" | "EGP" | "MAD" | "USD" | "EUR" | "GBP" => 2,
        "XOF" | "XAF" | "UGX" | "RWF" | "GNF" => 0,
        _ => return None,
    };
    Some(exp)
}

/// Formats an integer minor-unit amount as a major-unit decimal string,
/// e.g. `(150050, "NGN")` -> `"1500.50"`, `(5000, "XOF")` -> `"5000"`.
pub fn format_major_units(amount_minor: i64, currency: &str) -> Option<String> {
    let exp = minor_unit_exponent(currency)?;
    if exp == 0 {
        return Some(amount_minor.to_string());
    }
    let scale = 10i64.pow(exp);
    let whole = amount_minor / scale;
    let frac = (amount_minor % scale).abs();
    Some(format!("{}.{:0width$}", whole, frac, width = exp as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_decimal_currency() {
        assert_eq!(format_major_units(150050, "NGN").unwrap(), "1500.50");
        assert_eq!(format_major_units(100, "GHS").unwrap(), "1.00");
        assert_eq!(format_major_units(5, "KES").unwrap(), "0.05");
    }

    #[test]
    fn test_zero_decimal_currency() {
        assert_eq!(format_major_units(5000, "XOF").unwrap(), "5000");
        assert_eq!(format_major_units(1, "UGX").unwrap(), "1");
    }

    #[test]
    fn test_unknown_currency_rejected() {
        assert!(minor_unit_exponent("BTC").is_none());
        assert!(format_major_units(100, "???").is_none());
    }

    #[test]
    fn test_no_floating_point_drift() {
        // 0.1 + 0.2 style amounts stay exact under integer math.
        assert_eq!(format_major_units(30, "USD").unwrap(), "0.30");
        assert_eq!(format_major_units(i64::MAX, "XOF").unwrap(), i64::MAX.to_string());
    }
}
