//! GSTIN (Indian GST identification number) extraction and validation.

use super::patterns::{GSTIN_PATTERN, GSTIN_STANDALONE};
use super::{ExtractionMatch, RuleExtractor};

const CHARSET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// GSTIN field extractor.
pub struct GstinExtractor {
    /// Whether to validate the check character.
    validate: bool,
}

impl GstinExtractor {
    pub fn new() -> Self {
        Self { validate: true }
    }

    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }
}

impl Default for GstinExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleExtractor for GstinExtractor {
    type Output = ExtractionMatch<String>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results: Vec<Self::Output> = Vec::new();

        // Labeled first, then bare numbers with the right shape
        let labeled = GSTIN_PATTERN.captures_iter(text).map(|caps| (caps.get(0), caps.get(1), 0.95));
        let bare = GSTIN_STANDALONE.captures_iter(text).map(|caps| (caps.get(0), caps.get(1), 0.8));

        for (full_match, value, confidence) in labeled.chain(bare) {
            let (Some(full_match), Some(value)) = (full_match, value) else {
                continue;
            };
            let gstin = value.as_str().to_uppercase();

            if results.iter().any(|r| r.value == gstin) {
                continue;
            }

            if !self.validate || validate_gstin(&gstin) {
                results.push(
                    ExtractionMatch::new(gstin, confidence, full_match.as_str())
                        .with_position(full_match.start(), full_match.end()),
                );
            }
        }

        results.sort_by_key(|r| r.start());
        results
    }
}

/// Extract the first valid GSTIN from text (normally the issuer's).
pub fn extract_gstin(text: &str) -> Option<String> {
    GstinExtractor::new().extract(text).map(|m| m.value)
}

/// Validate a GSTIN: 2-digit state code, PAN, entity code, `Z`, and a
/// base-36 check character.
pub fn validate_gstin(gstin: &str) -> bool {
    let gstin = gstin.trim().to_uppercase();
    if gstin.len() != 15 || !GSTIN_STANDALONE.is_match(&gstin) {
        return false;
    }

    let bytes = gstin.as_bytes();
    let mut sum = 0usize;
    for (i, byte) in bytes.iter().take(14).enumerate() {
        let Some(value) = CHARSET.iter().position(|c| c == byte) else {
            return false;
        };
        let product = value * if i % 2 == 0 { 1 } else { 2 };
        sum += product / 36 + product % 36;
    }

    let check = CHARSET[(36 - sum % 36) % 36];
    check == bytes[14]
}
