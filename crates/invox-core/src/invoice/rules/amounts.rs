//! Amount extraction and normalization.

use rust_decimal::Decimal;
use std::str::FromStr;

use super::patterns::{AMOUNT_PATTERN, NUMBER_TOKEN, TAX_AMOUNT, TOTAL_AMOUNT};
use super::{ExtractionMatch, RuleExtractor};

/// Extractor for two-decimal monetary amounts anywhere in the text.
pub struct AmountExtractor;

impl AmountExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AmountExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleExtractor for AmountExtractor {
    type Output = ExtractionMatch<Decimal>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        AMOUNT_PATTERN
            .captures_iter(text)
            .filter_map(|caps| {
                let full_match = caps.get(0)?;
                let integer_part = caps[1].replace(',', "");
                let amount = Decimal::from_str(&format!("{}.{}", integer_part, &caps[2])).ok()?;
                Some(
                    ExtractionMatch::new(amount, 0.6, full_match.as_str())
                        .with_position(full_match.start(), full_match.end()),
                )
            })
            .collect()
    }
}

/// Amounts recovered from an invoice.
#[derive(Debug, Clone, Default)]
pub struct InvoiceAmounts {
    /// Grand total.
    pub total: Option<ExtractionMatch<Decimal>>,
    /// Total tax (GST/VAT).
    pub tax: Option<ExtractionMatch<Decimal>>,
    /// Pre-tax subtotal, when labeled.
    pub subtotal: Option<ExtractionMatch<Decimal>>,
    /// All detected two-decimal amounts.
    pub all_amounts: Vec<ExtractionMatch<Decimal>>,
}

/// Extract total and tax amounts from invoice text.
pub fn extract_amounts(text: &str) -> InvoiceAmounts {
    let mut result = InvoiceAmounts {
        all_amounts: AmountExtractor::new().extract_all(text),
        ..Default::default()
    };

    let mut totals = Vec::new();
    let mut subtotals = Vec::new();
    for (label, amount) in labeled_amounts(&TOTAL_AMOUNT, text) {
        if label.starts_with("sub") {
            subtotals.push(amount);
        } else {
            totals.push(amount);
        }
    }

    result.total = totals.into_iter().max_by(|a, b| a.value.cmp(&b.value));
    result.subtotal = subtotals.into_iter().max_by(|a, b| a.value.cmp(&b.value));
    result.tax = extract_tax(text);

    // Derive tax from total and subtotal
    if result.tax.is_none() {
        if let (Some(total), Some(subtotal)) = (&result.total, &result.subtotal) {
            let tax = total.value.checked_sub(subtotal.value);
            if let Some(tax) = tax.filter(|t| *t > Decimal::ZERO) {
                result.tax = Some(ExtractionMatch::new(tax, 0.6, "calculated"));
            }
        }
    }

    // Fall back to the subtotal, then to the largest amount on the page
    if result.total.is_none() {
        result.total = result.subtotal.clone().or_else(|| {
            result
                .all_amounts
                .iter()
                .max_by(|a, b| a.value.cmp(&b.value))
                .cloned()
                .map(|m| ExtractionMatch { confidence: 0.4, ..m })
        });
    }

    result
}

/// Aggregate tax line first, then the sum of GST components, then any tax figure.
fn extract_tax(text: &str) -> Option<ExtractionMatch<Decimal>> {
    let mut aggregate = None;
    let mut components: Vec<ExtractionMatch<Decimal>> = Vec::new();
    let mut generic = None;

    for (label, amount) in labeled_amounts(&TAX_AMOUNT, text) {
        match label.as_str() {
            "cgst" | "sgst" | "igst" | "utgst" => components.push(amount),
            l if l.starts_with("total") || l.contains("amount") => {
                aggregate.get_or_insert(amount);
            }
            _ => {
                generic.get_or_insert(amount);
            }
        }
    }

    if aggregate.is_some() {
        return aggregate;
    }
    if !components.is_empty() {
        // An unrepresentable sum is dropped rather than wrapped
        let sum = components
            .iter()
            .try_fold(Decimal::ZERO, |acc, m| acc.checked_add(m.value));
        let Some(sum) = sum else {
            return generic;
        };
        let source = components
            .iter()
            .map(|m| m.source.as_str())
            .collect::<Vec<_>>()
            .join(" + ");
        return Some(ExtractionMatch::new(sum, 0.8, source));
    }
    generic
}

/// Matches of a labeled-amount pattern, skipping percentages.
fn labeled_amounts(
    pattern: &regex::Regex,
    text: &str,
) -> Vec<(String, ExtractionMatch<Decimal>)> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| {
            let full_match = caps.get(0)?;
            let amount = caps.name("amount")?;
            if text[amount.end()..].starts_with('%') {
                return None;
            }
            let value = parse_amount(amount.as_str())?;
            let label = caps["label"]
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase();
            Some((
                label,
                ExtractionMatch::new(value, 0.9, full_match.as_str())
                    .with_position(full_match.start(), full_match.end()),
            ))
        })
        .collect()
}

/// Parse a free-form amount such as `"₹1,18,000.50"`, `"Rs. 1,000"` or
/// `"1.234,56"` into a plain decimal.
///
/// The first numeric token is used. When both separators appear the last one
/// is the decimal point; a lone comma followed by exactly three digits is a
/// thousands separator.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let token = NUMBER_TOKEN.find(s)?;
    let normalized = normalize_separators(token.as_str());
    let value = Decimal::from_str(&normalized).ok()?;

    let negative = s[..token.start()].trim_end().ends_with('-');
    Some(if negative { -value } else { value })
}

fn normalize_separators(token: &str) -> String {
    match (token.rfind(','), token.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => token.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => token.replace(',', ""),
        (Some(comma), None) => {
            let single = token.matches(',').count() == 1;
            if single && token.len() - comma - 1 != 3 {
                token.replace(',', ".")
            } else {
                token.replace(',', "")
            }
        }
        (None, Some(_)) if token.matches('.').count() > 1 => token.replace('.', ""),
        _ => token.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("₹1,18,000.50"), Some(dec("118000.50")));
        assert_eq!(parse_amount("Rs. 1,000"), Some(dec("1000")));
        assert_eq!(parse_amount("1,234.56"), Some(dec("1234.56")));
        assert_eq!(parse_amount("1.234,56"), Some(dec("1234.56")));
        assert_eq!(parse_amount("INR 1180.00/-"), Some(dec("1180.00")));
        assert_eq!(parse_amount("12,5"), Some(dec("12.5")));
        assert_eq!(parse_amount("-250.00"), Some(dec("-250.00")));
        assert_eq!(parse_amount("n/a"), None);
    }

    #[test]
    fn test_extract_totals_and_gst_components() {
        let text = "
            Sub Total: 1,000.00
            CGST @ 9%: 90.00
            SGST @ 9%: 90.00
            Grand Total: ₹ 1,180.00
        ";

        let amounts = extract_amounts(text);
        assert_eq!(amounts.total.unwrap().value, dec("1180.00"));
        assert_eq!(amounts.subtotal.unwrap().value, dec("1000.00"));
        assert_eq!(amounts.tax.unwrap().value, dec("180.00"));
    }

    #[test]
    fn test_aggregate_tax_wins_over_rates() {
        let text = "GST 18%\nTotal Tax: 180.00\nTotal Amount: 1180.00";
        let amounts = extract_amounts(text);
        assert_eq!(amounts.tax.unwrap().value, dec("180.00"));
        assert_eq!(amounts.total.unwrap().value, dec("1180.00"));
    }

    #[test]
    fn test_tax_derived_from_subtotal() {
        let text = "Subtotal: 500.00\nTotal: 590.00";
        let amounts = extract_amounts(text);
        let tax = amounts.tax.unwrap();
        assert_eq!(tax.value, dec("90.00"));
        assert_eq!(tax.source, "calculated");
    }

    #[test]
    fn test_total_falls_back_to_largest_amount() {
        let text = "Widget 250.00\nGadget 1,250.00";
        let amounts = extract_amounts(text);
        let total = amounts.total.unwrap();
        assert_eq!(total.value, dec("1250.00"));
        assert!(total.confidence < 0.5);
        assert_eq!(amounts.all_amounts.len(), 2);
    }

    #[test]
    fn test_component_sum_overflow_is_dropped() {
        let text = "CGST: 79228162514264337593543950335\nSGST: 79228162514264337593543950335\n";
        let amounts = extract_amounts(text);
        assert!(amounts.tax.is_none());
    }

    #[test]
    fn test_no_amounts() {
        let amounts = extract_amounts("Thank you for your business");
        assert!(amounts.total.is_none());
        assert!(amounts.tax.is_none());
    }
}
