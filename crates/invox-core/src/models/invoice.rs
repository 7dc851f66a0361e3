//! Structured invoice data produced by the model and by the fallback rules.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Invoice fields recovered from a document.
///
/// Every key is always serialized; missing values are `null`. Dates are
/// `YYYY-MM-DD` strings and amounts are plain JSON numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceData {
    /// Invoice number/identifier.
    #[serde(with = "lenient::text")]
    pub invoice_number: Option<String>,

    /// Date the invoice was issued.
    #[serde(with = "lenient::date")]
    pub invoice_date: Option<NaiveDate>,

    /// Payment due date.
    #[serde(with = "lenient::date")]
    pub due_date: Option<NaiveDate>,

    /// Vendor (issuer) name.
    #[serde(with = "lenient::text")]
    pub vendor_name: Option<String>,

    /// Vendor address as a single line.
    #[serde(with = "lenient::text")]
    pub vendor_address: Option<String>,

    /// Indian GST identification number.
    #[serde(with = "lenient::text")]
    pub gstin: Option<String>,

    /// Grand total.
    #[serde(with = "lenient::amount")]
    pub total_amount: Option<Decimal>,

    /// Total tax.
    #[serde(with = "lenient::amount")]
    pub tax_amount: Option<Decimal>,

    /// Currency code.
    #[serde(with = "lenient::text")]
    pub currency: Option<String>,

    /// Buyer's purchase order reference.
    #[serde(with = "lenient::text")]
    pub purchase_order_number: Option<String>,

    /// Line items in document order.
    #[serde(deserialize_with = "lenient::items")]
    pub line_items: Vec<LineItem>,
}

/// A single line item on the invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineItem {
    /// Product/service description.
    #[serde(with = "lenient::text")]
    pub description: Option<String>,

    /// Quantity.
    #[serde(with = "lenient::amount")]
    pub quantity: Option<Decimal>,

    /// Unit price.
    #[serde(with = "lenient::amount")]
    pub unit_price: Option<Decimal>,

    /// Total for this line.
    #[serde(with = "lenient::amount")]
    pub line_total: Option<Decimal>,
}

impl InvoiceData {
    /// Number of populated scalar fields plus one if any line items exist.
    pub fn populated_fields(&self) -> usize {
        let scalars = [
            self.invoice_number.is_some(),
            self.invoice_date.is_some(),
            self.due_date.is_some(),
            self.vendor_name.is_some(),
            self.vendor_address.is_some(),
            self.gstin.is_some(),
            self.total_amount.is_some(),
            self.tax_amount.is_some(),
            self.currency.is_some(),
            self.purchase_order_number.is_some(),
        ];
        scalars.iter().filter(|set| **set).count() + usize::from(!self.line_items.is_empty())
    }

    /// Whether nothing at all was recovered.
    pub fn is_empty(&self) -> bool {
        self.populated_fields() == 0
    }
}

/// Tolerant (de)serializers for model-produced JSON.
///
/// Generative models return numbers as strings, amounts with currency
/// symbols, and dates in whatever format the document used. These helpers
/// normalize such values instead of rejecting the whole object.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::LineItem;

    pub mod text {
        use super::*;
        use serde::Serializer;

        pub fn serialize<S: Serializer>(value: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => s.serialize_str(v),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
            let value = Option::<Value>::deserialize(d)?;
            Ok(match value {
                Some(Value::String(s)) => {
                    let trimmed = s.trim();
                    (!trimmed.is_empty()).then(|| trimmed.to_string())
                }
                Some(Value::Number(n)) => Some(n.to_string()),
                Some(Value::Bool(b)) => Some(b.to_string()),
                Some(other @ (Value::Array(_) | Value::Object(_))) => {
                    return Err(serde::de::Error::custom(format!(
                        "expected a string, found {other}"
                    )));
                }
                Some(Value::Null) | None => None,
            })
        }
    }

    pub mod amount {
        use super::*;
        use rust_decimal::Decimal;
        use rust_decimal::prelude::ToPrimitive;
        use serde::Serializer;
        use std::str::FromStr;

        use crate::invoice::rules::amounts::parse_amount;

        pub fn serialize<S: Serializer>(value: &Option<Decimal>, s: S) -> Result<S::Ok, S::Error> {
            match value.and_then(|v| v.normalize().to_f64()) {
                Some(v) => s.serialize_f64(v),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Decimal>, D::Error> {
            let value = Option::<Value>::deserialize(d)?;
            match value {
                Some(Value::Number(n)) => {
                    let repr = n.to_string();
                    Decimal::from_str(&repr)
                        .or_else(|_| Decimal::from_scientific(&repr))
                        .map(Some)
                        .map_err(|e| serde::de::Error::custom(format!("bad number {repr}: {e}")))
                }
                Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
                Some(Value::String(s)) => parse_amount(&s)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("not an amount: {s:?}"))),
                Some(Value::Null) | None => Ok(None),
                Some(other) => Err(serde::de::Error::custom(format!(
                    "expected a number, found {other}"
                ))),
            }
        }
    }

    pub mod date {
        use super::*;
        use chrono::NaiveDate;
        use serde::Serializer;

        use crate::invoice::rules::dates::parse_date;

        pub fn serialize<S: Serializer>(value: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => s.serialize_str(&v.format("%Y-%m-%d").to_string()),
                None => s.serialize_none(),
            }
        }

        /// Unrecognizable date strings become `None` rather than an error.
        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
            let value = Option::<Value>::deserialize(d)?;
            match value {
                Some(Value::String(s)) => Ok(parse_date(&s)),
                Some(Value::Null) | None => Ok(None),
                Some(other) => Err(serde::de::Error::custom(format!(
                    "expected a date string, found {other}"
                ))),
            }
        }
    }

    pub fn items<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<LineItem>, D::Error> {
        Ok(Option::<Vec<LineItem>>::deserialize(d)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    #[test]
    fn test_serializes_every_key() {
        let json = serde_json::to_value(InvoiceData::default()).unwrap();
        let object = json.as_object().unwrap();

        for key in [
            "invoice_number",
            "invoice_date",
            "due_date",
            "vendor_name",
            "vendor_address",
            "gstin",
            "total_amount",
            "tax_amount",
            "currency",
            "purchase_order_number",
            "line_items",
        ] {
            assert!(object.contains_key(key), "missing {key}");
        }
        assert_eq!(object["line_items"], serde_json::json!([]));
        assert_eq!(object["total_amount"], serde_json::Value::Null);
    }

    #[test]
    fn test_amounts_and_dates_are_normalized() {
        let data: InvoiceData = serde_json::from_value(serde_json::json!({
            "invoice_number": 4411,
            "invoice_date": "15/01/2024",
            "due_date": "2024-02-15",
            "total_amount": "₹1,18,000.50",
            "tax_amount": 180.0,
            "line_items": [
                {"description": "Product A", "quantity": 2, "unit_price": "250", "line_total": 500}
            ]
        }))
        .unwrap();

        assert_eq!(data.invoice_number.as_deref(), Some("4411"));
        assert_eq!(data.invoice_date, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(data.due_date, NaiveDate::from_ymd_opt(2024, 2, 15));
        assert_eq!(data.total_amount, Some(Decimal::from_str("118000.50").unwrap()));
        assert_eq!(data.tax_amount, Some(Decimal::from(180)));
        assert_eq!(data.line_items.len(), 1);
        assert_eq!(data.line_items[0].unit_price, Some(Decimal::from(250)));
    }

    #[test]
    fn test_round_trip_emits_plain_numbers() {
        let data = InvoiceData {
            total_amount: Some(Decimal::from_str("1000.50").unwrap()),
            invoice_date: NaiveDate::from_ymd_opt(2024, 1, 15),
            ..Default::default()
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["total_amount"], serde_json::json!(1000.5));
        assert_eq!(json["invoice_date"], serde_json::json!("2024-01-15"));
    }

    #[test]
    fn test_rejects_structurally_wrong_values() {
        let result: Result<InvoiceData, _> = serde_json::from_value(serde_json::json!({
            "total_amount": {"value": 10}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_populated_fields() {
        let mut data = InvoiceData::default();
        assert!(data.is_empty());
        data.currency = Some("INR".to_string());
        data.line_items.push(LineItem::default());
        assert_eq!(data.populated_fields(), 2);
    }
}
