//! Currency detection.

use super::patterns::{CURRENCY_CODE, CURRENCY_SYMBOL};

/// Detect the invoice currency as an ISO 4217 code.
///
/// An explicit code wins over a symbol; among symbols the first one in the
/// text is used.
pub fn detect_currency(text: &str) -> Option<String> {
    if let Some(m) = CURRENCY_CODE.find(text) {
        return Some(m.as_str().to_string());
    }

    let symbol = CURRENCY_SYMBOL.find(text)?.as_str();
    let code = match symbol.chars().next()? {
        '₹' | 'R' | 'r' => "INR",
        '$' => "USD",
        '€' => "EUR",
        '£' => "GBP",
        _ => return None,
    };
    Some(code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_symbols() {
        assert_eq!(detect_currency("Total (INR): 1180.00").as_deref(), Some("INR"));
        assert_eq!(detect_currency("Total: ₹1,180.00").as_deref(), Some("INR"));
        assert_eq!(detect_currency("Amount: Rs. 500").as_deref(), Some("INR"));
        assert_eq!(detect_currency("Total $42.00").as_deref(), Some("USD"));
        assert_eq!(detect_currency("€ 10,00 then USD").as_deref(), Some("USD"));
        assert_eq!(detect_currency("Mrs. Sharma paid 500"), None);
    }
}
