//! Prompt construction and model-output cleanup.

/// Build the fixed extraction prompt around the OCR text.
pub fn build_prompt(invoice_text: &str) -> String {
    format!(
        r#"You are an expert invoice data extractor. Extract the following fields from the invoice text:
'invoice_number', 'invoice_date' (format YYYY-MM-DD), 'due_date' (format YYYY-MM-DD),
'vendor_name', 'vendor_address', 'gstin', 'total_amount', 'tax_amount', 'currency', 'purchase_order_number',
'line_items' (as a list of objects, each with 'description', 'quantity', 'unit_price', 'line_total').
If a field is not found, use null. For amounts, extract only the numerical value without currency symbols or commas.
For dates, use YYYY-MM-DD format.

Invoice Text:
---
{invoice_text}
---

Provide the output strictly as only a JSON object. Example JSON structure:
{{
  "invoice_number": "INV-123",
  "invoice_date": "2024-01-15",
  "due_date": "2024-02-15",
  "vendor_name": "ABC Corp",
  "vendor_address": "123 Main St, City, Country",
  "gstin": "GSTIN123456789",
  "total_amount": 1000.50,
  "tax_amount": 180.00,
  "currency": "INR",
  "purchase_order_number": "PO-987",
  "line_items": [
    {{
      "description": "Product A",
      "quantity": 2,
      "unit_price": 250.00,
      "line_total": 500.00
    }},
    {{
      "description": "Service B",
      "quantity": 1,
      "unit_price": 500.50,
      "line_total": 500.50
    }}
  ]
}}
"#
    )
}

/// Reduce raw model output to the candidate JSON text.
///
/// Removes a leading echo of the prompt, then a surrounding Markdown code
/// fence, then any prose before the first `{` or after the last `}`.
pub fn clean_output<'a>(prompt: &str, output: &'a str) -> &'a str {
    let body = output.trim_start();
    let body = body
        .strip_prefix(prompt)
        .or_else(|| body.strip_prefix(prompt.trim()))
        .unwrap_or(body)
        .trim();

    let body = strip_code_fence(body);

    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => body,
    }
}

fn strip_code_fence(body: &str) -> &str {
    let Some(rest) = body.strip_prefix("```") else {
        return body;
    };
    // Drop the info string ("json") on the opening line
    let rest = rest.split_once('\n').map(|(_, r)| r).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
