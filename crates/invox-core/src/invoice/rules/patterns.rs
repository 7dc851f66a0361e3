//! Common regex patterns for English-language (Indian GST) invoices.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // GSTIN (Indian GST identification number)
    pub static ref GSTIN_PATTERN: Regex = Regex::new(
        r"(?i)GSTIN(?:\s*/\s*UIN)?(?:\s*(?:no|number)\.?)?[ \t]*[:\-]?[ \t]*([0-9A-Z]{15})\b"
    ).unwrap();

    pub static ref GSTIN_STANDALONE: Regex = Regex::new(
        r"\b(\d{2}[A-Z]{5}\d{4}[A-Z][1-9A-Z]Z[0-9A-Z])\b"
    ).unwrap();

    // Date patterns
    pub static ref DATE_DMY: Regex = Regex::new(
        r"\b(\d{1,2})[./\-](\d{1,2})[./\-](\d{4}|\d{2})\b"
    ).unwrap();

    pub static ref DATE_YMD: Regex = Regex::new(
        r"\b(\d{4})[./\-](\d{1,2})[./\-](\d{1,2})\b"
    ).unwrap();

    /// "15 Jan 2024", "15th January, 2024", "15-Jan-2024"
    pub static ref DATE_LONG_DMY: Regex = Regex::new(
        r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?[\s\-]+(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?[\s\-]+(\d{4})\b"
    ).unwrap();

    /// "January 15, 2024", "Jan 15 2024"
    pub static ref DATE_LONG_MDY: Regex = Regex::new(
        r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?[ \t]+(\d{1,2})(?:st|nd|rd|th)?,?[ \t]+(\d{4})\b"
    ).unwrap();

    // Labeled dates
    pub static ref INVOICE_DATE: Regex = Regex::new(
        r"(?i)(?:invoice\s+date|date\s+of\s+(?:invoice|issue)|inv\.?\s*date|bill\s+date|issue\s+date|dated)[ \t]*[:.\-]?[ \t]*([^\n]+)"
    ).unwrap();

    pub static ref DUE_DATE: Regex = Regex::new(
        r"(?i)(?:due\s+date|payment\s+due(?:\s+date)?|due\s+on|pay\s+by)[ \t]*[:.\-]?[ \t]*([^\n]+)"
    ).unwrap();

    pub static ref PLAIN_DATE: Regex = Regex::new(
        r"(?im)^[ \t]*date[ \t]*[:.\-][ \t]*([^\n]+)"
    ).unwrap();

    // Amounts with a two-digit fraction, Western (1,234.56) or Indian (1,18,000.50) grouping
    pub static ref AMOUNT_PATTERN: Regex = Regex::new(
        r"\b(\d{1,3}(?:,\d{2,3})+|\d+)\.(\d{2})\b"
    ).unwrap();

    pub static ref TOTAL_AMOUNT: Regex = Regex::new(
        r"(?i)\b(?P<label>grand\s+total|total\s+amount(?:\s+due)?|amount\s+(?:due|payable)|net\s+payable|total\s+payable|balance\s+due|invoice\s+total|sub\s*-?\s*total|total)[ \t]*(?:\([^)\n]{1,6}\))?[ \t]*[:\-]?[ \t]*(?:rs\.?|inr|usd|eur|gbp|₹|\$|€|£)?[ \t]*(?P<amount>\d[\d,]*(?:\.\d{1,2})?)"
    ).unwrap();

    pub static ref TAX_AMOUNT: Regex = Regex::new(
        r"(?i)\b(?P<label>total\s+tax(?:\s+amount)?|tax\s+amount|total\s+gst|gst\s+amount|igst|cgst|sgst|utgst|gst|vat|tax)\b[ \t]*(?:@?[ \t]*\d{1,2}(?:\.\d+)?[ \t]*%)?[ \t]*(?:\([^)\n]{1,6}\))?[ \t]*[:\-]?[ \t]*(?:rs\.?|inr|usd|eur|gbp|₹|\$|€|£)?[ \t]*(?P<amount>\d[\d,]*(?:\.\d{1,2})?)"
    ).unwrap();

    /// First numeric token inside a free-form amount string.
    pub static ref NUMBER_TOKEN: Regex = Regex::new(
        r"\d(?:[\d,.]*\d)?"
    ).unwrap();

    // Currency
    pub static ref CURRENCY_CODE: Regex = Regex::new(
        r"\b(INR|USD|EUR|GBP|AUD|CAD|SGD|AED|JPY|CNY|CHF)\b"
    ).unwrap();

    pub static ref CURRENCY_SYMBOL: Regex = Regex::new(
        r"(₹|\$|€|£|\b(?i:rs)\.?[ \t]*\d)"
    ).unwrap();

    // Document references
    pub static ref INVOICE_NUMBER: Regex = Regex::new(
        r"(?i)\b(?:invoice[ \t]*(?:no|number|num|#)|inv[ \t]*(?:no|#)|bill[ \t]*(?:no|number)|invoice)\.?[ \t]*[:#\-]?[ \t]*([A-Za-z0-9][A-Za-z0-9/\-_.]*)"
    ).unwrap();

    pub static ref PO_NUMBER: Regex = Regex::new(
        r"(?i)\b(?:purchase[ \t]+order(?:[ \t]*(?:no|number|#))?|p\.?[ \t]*o\.?[ \t]*(?:no|number|#)|po[ \t]*[:#])\.?[ \t]*[:#\-]?[ \t]*([A-Za-z0-9][A-Za-z0-9/\-_.]*)"
    ).unwrap();

    // Party identification
    pub static ref SELLER_SECTION: Regex = Regex::new(
        r"(?im)^[ \t]*(?:vendor|seller|supplier|sold\s+by|billed\s+by|from)(?:\s+(?:name|details))?[ \t]*(?::|$)[ \t]*"
    ).unwrap();

    pub static ref BUYER_SECTION: Regex = Regex::new(
        r"(?im)^[ \t]*(?:bill(?:ed)?\s+to|buyer|customer|ship(?:ped)?\s+to|sold\s+to|recipient)(?:\s+(?:name|details))?[ \t]*(?::|$)[ \t]*"
    ).unwrap();

    pub static ref ADDRESS_LABEL: Regex = Regex::new(
        r"(?im)^[ \t]*(?:vendor\s+|seller\s+|supplier\s+)?address[ \t]*[:\-][ \t]*([^\n]+)"
    ).unwrap();

    /// Lines that are document headings or field labels rather than names.
    pub static ref HEADING_LINE: Regex = Regex::new(
        r"(?i)^(?:(?:tax|gst|proforma|commercial|retail)\s+)?(?:invoice|bill|receipt|credit\s+note|debit\s+note)\b|^(?:invoice|date|due|gstin|phone|tel|email|e-mail|mobile|fax|pan|po|p\.\s*o|purchase|page)\b"
    ).unwrap();

    // Contact details (excluded from names and addresses)
    pub static ref EMAIL: Regex = Regex::new(
        r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}"
    ).unwrap();

    pub static ref PHONE: Regex = Regex::new(
        r"(?i)\b(?:phone|tel|mobile|ph)\b|(?:\+91[\s\-]?)?\b\d{5}[\s\-]?\d{5}\b"
    ).unwrap();
}
