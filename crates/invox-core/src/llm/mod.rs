//! Structured field extraction with a generative model.

mod http;
mod prompt;

pub use http::HttpGenerator;
pub use prompt::{build_prompt, clean_output};

use tracing::{debug, info};

use crate::error::LlmError;
use crate::models::InvoiceData;

/// A black-box generative model: prompt in, completion out.
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`. The output may echo the prompt.
    fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Turns OCR text into [`InvoiceData`] by prompting a [`TextGenerator`].
pub struct FieldExtractor {
    generator: Box<dyn TextGenerator>,
}

impl FieldExtractor {
    pub fn new(generator: Box<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Extract invoice fields from OCR text.
    ///
    /// Fails with [`LlmError::Generation`] when the model cannot be reached
    /// and [`LlmError::Parse`] (carrying the raw output) when its answer is
    /// not an invoice JSON object.
    pub fn extract(&self, ocr_text: &str) -> Result<InvoiceData, LlmError> {
        let prompt = build_prompt(ocr_text);
        debug!("Prompting model with {} chars of OCR text", ocr_text.len());

        let output = self.generator.generate(&prompt)?;
        let data = parse_output(&prompt, &output)?;

        info!(
            "Model extracted {} fields ({} line items)",
            data.populated_fields(),
            data.line_items.len()
        );
        Ok(data)
    }
}

/// Parse raw model output produced for `prompt`.
pub fn parse_output(prompt: &str, output: &str) -> Result<InvoiceData, LlmError> {
    let parse_error = |reason: String| LlmError::Parse {
        reason,
        raw: output.to_string(),
    };

    let body = clean_output(prompt, output);
    if body.is_empty() {
        return Err(parse_error("empty output".to_string()));
    }

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| parse_error(e.to_string()))?;
    if !value.is_object() {
        return Err(parse_error("expected a JSON object".to_string()));
    }

    serde_json::from_value(value).map_err(|e| parse_error(format!("schema mismatch: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    struct Canned(Result<String, String>);

    impl TextGenerator for Canned {
        fn generate(&self, prompt: &str) -> Result<String, LlmError> {
            match &self.0 {
                Ok(text) => Ok(text.replace("{PROMPT}", prompt)),
                Err(e) => Err(LlmError::Generation(e.clone())),
            }
        }
    }

    fn extractor(output: &str) -> FieldExtractor {
        FieldExtractor::new(Box::new(Canned(Ok(output.to_string()))))
    }

    #[test]
    fn test_well_formed_output() {
        let data = extractor(
            r#"{
                "invoice_number": "INV-123",
                "invoice_date": "2024-01-15",
                "due_date": null,
                "vendor_name": "ABC Corp",
                "total_amount": 1000.50,
                "currency": "INR",
                "line_items": [{"description": "Product A", "quantity": 2, "unit_price": 250.0, "line_total": 500.0}]
            }"#,
        )
        .extract("ocr text")
        .unwrap();

        assert_eq!(data.invoice_number.as_deref(), Some("INV-123"));
        assert_eq!(data.invoice_date, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(data.due_date, None);
        assert_eq!(data.total_amount, Some(Decimal::from_str("1000.50").unwrap()));
        assert_eq!(data.line_items.len(), 1);
    }

    #[test]
    fn test_echoed_prompt_is_stripped() {
        let data = extractor("{PROMPT}\n{\"gstin\": \"29AAGCB7383J1Z4\"}")
            .extract("ocr text")
            .unwrap();
        assert_eq!(data.gstin.as_deref(), Some("29AAGCB7383J1Z4"));
    }

    #[test]
    fn test_malformed_output_carries_raw_text() {
        let err = extractor("{\"invoice_number\": \"INV-1\",").extract("ocr").unwrap_err();
        match &err {
            LlmError::Parse { raw, .. } => assert_eq!(raw, "{\"invoice_number\": \"INV-1\","),
            other => panic!("expected parse error, got {other:?}"),
        }
        assert!(err.to_string().contains("INV-1"));
    }

    #[test]
    fn test_non_object_and_schema_mismatch() {
        assert!(matches!(
            extractor("[1, 2, 3]").extract("ocr"),
            Err(LlmError::Parse { .. })
        ));
        assert!(matches!(
            extractor(r#"{"line_items": "none"}"#).extract("ocr"),
            Err(LlmError::Parse { .. })
        ));
        assert!(matches!(extractor("   ").extract("ocr"), Err(LlmError::Parse { .. })));
    }

    #[test]
    fn test_generation_failure_passes_through() {
        let extractor = FieldExtractor::new(Box::new(Canned(Err("connection refused".to_string()))));
        assert!(matches!(
            extractor.extract("ocr"),
            Err(LlmError::Generation(msg)) if msg == "connection refused"
        ));
    }
}
