pub mod config;
pub mod error;
pub mod extractor;
pub mod ledger;
pub mod normalize;
pub mod oauth;
pub mod openai;
pub mod pipeline;
pub mod reducer;
pub mod session;
pub mod sheets;
pub mod source;
pub mod utils;

use serde::{Deserialize, Serialize};

pub use error::{AuthError, ConfigError, ExtractError, FetchError, LedgerError, PipelineError};
pub use pipeline::{PageFailure, PageOutcome, PageReport, Pipeline, RunSummary};

/// Markup exactly as a content source produced it.
#[derive(Debug, Clone)]
pub struct RawContent {
    pub identifier: String,
    pub body: String,
}

impl RawContent {
    pub fn new(identifier: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            body: body.into(),
        }
    }
}

/// Newline-delimited text left after reduction. Never contains a blank line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReducedContent {
    lines: Vec<String>,
}

impl ReducedContent {
    pub(crate) fn from_lines(lines: Vec<String>) -> Self {
        Self { lines }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn content_length(&self) -> usize {
        self.lines.iter().map(|l| l.len()).sum()
    }
}

/// One available unit as returned by the extraction service, after coercion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub unit_number: Option<String>,
    pub price: u64,
    pub size_sqft: Option<u64>,
    pub floor: Option<i64>,
    pub date_available: Option<String>,
    pub other: Option<String>,
}

impl ListingRecord {
    pub fn new(price: u64) -> Self {
        Self {
            unit_number: None,
            price,
            size_sqft: None,
            floor: None,
            date_available: None,
            other: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexName(pub String);

impl ComplexName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name derived from a page identifier: the last path segment that is
    /// not a generic page name such as `floor-plans-and-pricing`, with any
    /// extension removed.
    pub fn from_identifier(identifier: &str) -> Self {
        let stems: Vec<&str> = identifier_segments(identifier).into_iter().map(strip_extension).collect();
        let chosen = stems
            .iter()
            .rev()
            .find(|s| !GENERIC_SEGMENTS.contains(&s.to_ascii_lowercase().as_str()))
            .or_else(|| stems.last())
            .copied()
            .unwrap_or_default();
        Self(chosen.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// Trailing path segments shared by many complexes' listing pages.
const GENERIC_SEGMENTS: &[&str] = &[
    "floor-plans-and-pricing",
    "floor-plans",
    "floorplans",
    "pricing",
    "availability",
    "apartments",
    "units",
    "index",
];

/// Host and path segments of a URL or file path, without scheme, query or
/// fragment.
pub(crate) fn identifier_segments(identifier: &str) -> Vec<&str> {
    let without_query = identifier.split(['?', '#']).next().unwrap_or(identifier);
    let without_scheme = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    without_scheme
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect()
}

fn strip_extension(segment: &str) -> &str {
    match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() && ext.len() <= 4 => stem,
        _ => segment,
    }
}

impl std::fmt::Display for ComplexName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complex_name_from_url_uses_last_segment() {
        let name = ComplexName::from_identifier(
            "https://www.equityapartments.com/san-francisco-bay/soma/soma-square-apartments",
        );
        assert_eq!(name.as_str(), "soma-square-apartments");
    }

    #[test]
    fn complex_name_from_file_strips_extension_and_query() {
        assert_eq!(ComplexName::from_identifier("data/azure.html").as_str(), "azure");
        assert_eq!(
            ComplexName::from_identifier("https://example.com/mb360/pricing/?tab=2#units").as_str(),
            "mb360"
        );
    }

    #[test]
    fn generic_trailing_segments_are_skipped() {
        let bennett = ComplexName::from_identifier(
            "https://www.essexapartmenthomes.com/apartments/san-francisco/bennett-lofts/floor-plans-and-pricing",
        );
        let folsom = ComplexName::from_identifier(
            "https://www.essexapartmenthomes.com/apartments/san-francisco/500-folsom/floor-plans-and-pricing",
        );
        assert_eq!(bennett.as_str(), "bennett-lofts");
        assert_eq!(folsom.as_str(), "500-folsom");
        assert_eq!(ComplexName::from_identifier("pricing").as_str(), "pricing");
    }

    #[test]
    fn reduced_content_text_joins_lines() {
        let content = ReducedContent::from_lines(vec!["Unit 601".into(), "$3000".into()]);
        assert_eq!(content.text(), "Unit 601\n$3000");
        assert_eq!(content.content_length(), 13);
        assert!(!content.is_empty());
    }
}
