//! Invoice field extraction rules.

mod fallback;
pub mod rules;

pub use fallback::RegexFallbackExtractor;
