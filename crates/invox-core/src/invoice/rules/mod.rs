//! Rule-based field extractors for English-language invoices.

pub mod amounts;
pub mod currency;
pub mod dates;
pub mod gstin;
pub mod patterns;

pub use amounts::{AmountExtractor, InvoiceAmounts, extract_amounts, parse_amount};
pub use currency::detect_currency;
pub use dates::{DateExtractor, InvoiceDates, extract_dates, parse_date};
pub use gstin::{GstinExtractor, extract_gstin, validate_gstin};

/// Trait for single-field rule extractors.
pub trait RuleExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// Extract the field from text.
    fn extract(&self, text: &str) -> Option<Self::Output>;

    /// Extract all occurrences of the field.
    fn extract_all(&self, text: &str) -> Vec<Self::Output>;
}

/// Extraction context with confidence scores.
#[derive(Debug, Clone)]
pub struct ExtractionMatch<T> {
    /// Extracted value.
    pub value: T,
    /// Confidence score (0.0 - 1.0).
    pub confidence: f32,
    /// Position in source text.
    pub position: Option<(usize, usize)>,
    /// Source text that was matched.
    pub source: String,
}

impl<T> ExtractionMatch<T> {
    pub fn new(value: T, confidence: f32, source: impl Into<String>) -> Self {
        Self {
            value,
            confidence,
            position: None,
            source: source.into(),
        }
    }

    pub fn with_position(mut self, start: usize, end: usize) -> Self {
        self.position = Some((start, end));
        self
    }

    fn start(&self) -> usize {
        self.position.map(|(start, _)| start).unwrap_or(usize::MAX)
    }
}
