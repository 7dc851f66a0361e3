//! Deterministic rule-based invoice extraction.

use tracing::debug;

use crate::models::InvoiceData;

use super::rules::{
    ExtractionMatch, GstinExtractor, RuleExtractor, detect_currency, extract_amounts,
    extract_dates,
    patterns::{
        ADDRESS_LABEL, BUYER_SECTION, EMAIL, GSTIN_STANDALONE, HEADING_LINE, INVOICE_NUMBER,
        PHONE, PO_NUMBER, SELLER_SECTION,
    },
};

/// Pattern-based extractor used when the generative model's answer is unusable.
///
/// Never fails: fields that cannot be recovered are left as `None`, and
/// `line_items` is always empty.
#[derive(Debug, Clone)]
pub struct RegexFallbackExtractor {
    /// Whether to validate GSTIN check characters.
    validate_gstin: bool,
    /// Minimum confidence for accepting rule matches.
    min_confidence: f32,
}

impl RegexFallbackExtractor {
    pub fn new() -> Self {
        Self {
            validate_gstin: true,
            min_confidence: 0.3,
        }
    }

    /// Set GSTIN validation.
    pub fn with_gstin_validation(mut self, validate: bool) -> Self {
        self.validate_gstin = validate;
        self
    }

    /// Set minimum confidence threshold.
    pub fn with_min_confidence(mut self, confidence: f32) -> Self {
        self.min_confidence = confidence;
        self
    }

    /// Recover whatever invoice fields the text yields.
    pub fn extract(&self, text: &str) -> InvoiceData {
        let dates = extract_dates(text);
        let amounts = extract_amounts(text);
        let (vendor_name, vendor_address) = extract_vendor(text);

        let data = InvoiceData {
            invoice_number: first_reference(&INVOICE_NUMBER, text),
            invoice_date: self.accept(dates.invoice_date),
            due_date: self.accept(dates.due_date),
            vendor_name,
            vendor_address,
            gstin: GstinExtractor::new()
                .with_validation(self.validate_gstin)
                .extract(text)
                .map(|m| m.value),
            total_amount: self.accept(amounts.total),
            tax_amount: self.accept(amounts.tax),
            currency: detect_currency(text),
            purchase_order_number: first_reference(&PO_NUMBER, text),
            line_items: Vec::new(),
        };

        debug!(
            "Regex fallback recovered {} fields from {} chars",
            data.populated_fields(),
            text.len()
        );
        data
    }

    fn accept<T>(&self, found: Option<ExtractionMatch<T>>) -> Option<T> {
        found
            .filter(|m| m.confidence >= self.min_confidence)
            .map(|m| m.value)
    }
}

impl Default for RegexFallbackExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// First labeled reference that contains at least one digit.
fn first_reference(pattern: &regex::Regex, text: &str) -> Option<String> {
    pattern.captures_iter(text).find_map(|caps| {
        let value = caps.get(1)?.as_str().trim_end_matches(['.', '-', '/']);
        value
            .chars()
            .any(|c| c.is_ascii_digit())
            .then(|| value.to_string())
    })
}

/// Vendor name and address.
///
/// The name is the text after a seller header ("Vendor:", "Sold By") or the
/// first line below it; without a header it is the first line that reads like
/// a name. Up to two following address-like lines form the address unless an
/// explicit "Address:" label exists.
fn extract_vendor(text: &str) -> (Option<String>, Option<String>) {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let name = match lines.iter().position(|l| SELLER_SECTION.is_match(l)) {
        Some(header) => {
            let inline = SELLER_SECTION
                .find(lines[header])
                .map(|m| lines[header][m.end()..].trim())
                .unwrap_or_default();
            if inline.is_empty() {
                find_name_line(&lines, header + 1)
            } else {
                Some((header, inline.to_string()))
            }
        }
        None => find_name_line(&lines, 0),
    };

    let labeled_address = ADDRESS_LABEL
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
        .filter(|a| !a.is_empty());

    let address = labeled_address.or_else(|| {
        let (index, _) = name.as_ref()?;
        let parts: Vec<&str> = lines[index + 1..]
            .iter()
            .take_while(|l| is_address_line(l))
            .take(2)
            .copied()
            .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    });

    (name.map(|(_, n)| n), address)
}

fn find_name_line(lines: &[&str], from: usize) -> Option<(usize, String)> {
    lines
        .iter()
        .enumerate()
        .skip(from)
        .take_while(|(_, l)| !BUYER_SECTION.is_match(l))
        .find(|(_, l)| is_name_line(l))
        .map(|(i, l)| (i, l.to_string()))
}

fn is_name_line(line: &str) -> bool {
    line.chars().any(char::is_alphabetic)
        && !line.contains(':')
        && !HEADING_LINE.is_match(line)
        && !SELLER_SECTION.is_match(line)
        && !EMAIL.is_match(line)
        && !PHONE.is_match(line)
        && !GSTIN_STANDALONE.is_match(line)
}

fn is_address_line(line: &str) -> bool {
    !line.contains(':')
        && !HEADING_LINE.is_match(line)
        && !SELLER_SECTION.is_match(line)
        && !BUYER_SECTION.is_match(line)
        && !EMAIL.is_match(line)
        && !PHONE.is_match(line)
        && !GSTIN_STANDALONE.is_match(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const SAMPLE: &str = "
        ABC Traders Pvt Ltd
        12 MG Road, Bengaluru
        Karnataka 560001
        GSTIN: 29AAGCB7383J1Z4
        TAX INVOICE
        Invoice No: INV-2024-001
        Invoice Date: 15/01/2024
        Due Date: 14/02/2024
        PO Number: PO-987
        Bill To
        XYZ Retail
        Product A    2    250.00    500.00
        Sub Total: 1,000.00
        CGST @ 9%: 90.00
        SGST @ 9%: 90.00
        Grand Total: ₹1,180.00
    ";

    #[test]
    fn test_extract_sample_invoice() {
        let data = RegexFallbackExtractor::new().extract(SAMPLE);

        assert_eq!(data.invoice_number.as_deref(), Some("INV-2024-001"));
        assert_eq!(data.invoice_date, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(data.due_date, NaiveDate::from_ymd_opt(2024, 2, 14));
        assert_eq!(data.vendor_name.as_deref(), Some("ABC Traders Pvt Ltd"));
        assert_eq!(
            data.vendor_address.as_deref(),
            Some("12 MG Road, Bengaluru, Karnataka 560001")
        );
        assert_eq!(data.gstin.as_deref(), Some("29AAGCB7383J1Z4"));
        assert_eq!(data.total_amount, Some(Decimal::from_str("1180.00").unwrap()));
        assert_eq!(data.tax_amount, Some(Decimal::from_str("180.00").unwrap()));
        assert_eq!(data.currency.as_deref(), Some("INR"));
        assert_eq!(data.purchase_order_number.as_deref(), Some("PO-987"));
        assert!(data.line_items.is_empty());
    }

    #[test]
    fn test_seller_header_and_address_label() {
        let text = "Invoice #A-17\nVendor: Acme Supplies\nAddress: 1 Main St, Pune\nTotal: $99.50";
        let data = RegexFallbackExtractor::new().extract(text);

        assert_eq!(data.invoice_number.as_deref(), Some("A-17"));
        assert_eq!(data.vendor_name.as_deref(), Some("Acme Supplies"));
        assert_eq!(data.vendor_address.as_deref(), Some("1 Main St, Pune"));
        assert_eq!(data.total_amount, Some(Decimal::from_str("99.50").unwrap()));
        assert_eq!(data.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn test_garbage_yields_empty_data() {
        let data = RegexFallbackExtractor::new().extract("@@@ ### !!!");
        assert!(data.is_empty());

        let data = RegexFallbackExtractor::new().extract("");
        assert!(data.is_empty());
    }

    #[test]
    fn test_min_confidence_drops_guessed_total() {
        let text = "Widget 250.00\nGadget 1,250.00";
        assert!(RegexFallbackExtractor::new().extract(text).total_amount.is_some());

        let strict = RegexFallbackExtractor::new().with_min_confidence(0.5);
        assert!(strict.extract(text).total_amount.is_none());
    }

    #[test]
    fn test_huge_gst_components_do_not_panic() {
        let text = "CGST: 79228162514264337593543950335\nSGST: 79228162514264337593543950335\n";
        let data = RegexFallbackExtractor::new().extract(text);
        assert_eq!(data.tax_amount, None);
        assert_eq!(data.total_amount, None);
    }
}
