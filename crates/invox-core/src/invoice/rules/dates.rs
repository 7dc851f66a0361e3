//! Date extraction and normalization.

use chrono::NaiveDate;

use super::patterns::{
    DATE_DMY, DATE_LONG_DMY, DATE_LONG_MDY, DATE_YMD, DUE_DATE, INVOICE_DATE, PLAIN_DATE,
};
use super::{ExtractionMatch, RuleExtractor};

/// Date field extractor.
///
/// Numeric dates are read day-first; when that is impossible (`01/25/2024`)
/// they are read month-first.
pub struct DateExtractor;

impl DateExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleExtractor for DateExtractor {
    type Output = ExtractionMatch<NaiveDate>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results: Vec<Self::Output> = Vec::new();
        let mut push = |date: NaiveDate, confidence: f32, m: regex::Match<'_>| {
            if results.iter().any(|r| r.value == date) {
                return;
            }
            results.push(
                ExtractionMatch::new(date, confidence, m.as_str()).with_position(m.start(), m.end()),
            );
        };

        // DD/MM/YYYY, DD.MM.YY, MM-DD-YYYY
        for caps in DATE_DMY.captures_iter(text) {
            let first: u32 = caps[1].parse().unwrap_or(0);
            let second: u32 = caps[2].parse().unwrap_or(0);
            let year = parse_year(&caps[3]);

            let date = NaiveDate::from_ymd_opt(year, second, first)
                .map(|d| (d, 0.9))
                .or_else(|| NaiveDate::from_ymd_opt(year, first, second).map(|d| (d, 0.7)));
            if let (Some((date, confidence)), Some(m)) = (date, caps.get(0)) {
                push(date, confidence, m);
            }
        }

        // YYYY-MM-DD
        for caps in DATE_YMD.captures_iter(text) {
            let year: i32 = caps[1].parse().unwrap_or(0);
            let month: u32 = caps[2].parse().unwrap_or(0);
            let day: u32 = caps[3].parse().unwrap_or(0);

            if let (Some(date), Some(m)) = (NaiveDate::from_ymd_opt(year, month, day), caps.get(0)) {
                push(date, 0.95, m);
            }
        }

        // 15 Jan 2024
        for caps in DATE_LONG_DMY.captures_iter(text) {
            let day: u32 = caps[1].parse().unwrap_or(0);
            let month = month_to_number(&caps[2]);
            let year: i32 = caps[3].parse().unwrap_or(0);

            if let (Some(date), Some(m)) = (NaiveDate::from_ymd_opt(year, month, day), caps.get(0)) {
                push(date, 0.95, m);
            }
        }

        // January 15, 2024
        for caps in DATE_LONG_MDY.captures_iter(text) {
            let month = month_to_number(&caps[1]);
            let day: u32 = caps[2].parse().unwrap_or(0);
            let year: i32 = caps[3].parse().unwrap_or(0);

            if let (Some(date), Some(m)) = (NaiveDate::from_ymd_opt(year, month, day), caps.get(0)) {
                push(date, 0.95, m);
            }
        }

        results.sort_by_key(|r| r.start());
        results
    }
}

/// Dates recovered from an invoice.
#[derive(Debug, Clone, Default)]
pub struct InvoiceDates {
    /// Issue date.
    pub invoice_date: Option<ExtractionMatch<NaiveDate>>,
    /// Payment due date.
    pub due_date: Option<ExtractionMatch<NaiveDate>>,
}

/// Extract the labeled invoice and due dates from invoice text.
pub fn extract_dates(text: &str) -> InvoiceDates {
    let extractor = DateExtractor::new();
    let labeled = |pattern: &regex::Regex| {
        pattern.captures_iter(text).find_map(|caps| {
            let date_text = caps.get(1)?.as_str();
            extractor
                .extract(date_text)
                .map(|date| ExtractionMatch::new(date.value, 0.95, date_text))
        })
    };

    let mut result = InvoiceDates {
        invoice_date: labeled(&INVOICE_DATE).or_else(|| labeled(&PLAIN_DATE)),
        due_date: labeled(&DUE_DATE),
    };

    // If no labeled issue date was found, take the first other date
    if result.invoice_date.is_none() {
        let due = result.due_date.as_ref().map(|d| d.value);
        result.invoice_date = extractor
            .extract_all(text)
            .into_iter()
            .find(|d| Some(d.value) != due);
    }

    result
}

/// Parse a single date string in any supported form.
///
/// ISO dates (optionally followed by a time) are accepted directly; anything
/// else goes through [`DateExtractor`].
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Some(prefix) = s.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(date);
        }
    }
    DateExtractor::new().extract(s).map(|m| m.value)
}

fn parse_year(s: &str) -> i32 {
    let year: i32 = s.parse().unwrap_or(0);
    if year < 100 {
        // Two-digit year: assume 2000s for 00-50, 1900s for 51-99
        if year <= 50 { 2000 + year } else { 1900 + year }
    } else {
        year
    }
}

fn month_to_number(month: &str) -> u32 {
    match month.to_lowercase().get(..3).unwrap_or("") {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => 0,
    }
}
