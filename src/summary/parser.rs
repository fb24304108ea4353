// src/summary/parser.rs
//! Best-effort extraction of the four named sections from the model's
//! free-text reply. The reply format is requested, not guaranteed: a section
//! is located by either heading spelling (`**HEADER**` or `HEADER:`) and runs
//! until the next recognized heading or end-of-text. Missing sections come
//! back as empty strings, never as errors.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const NEWS_HEADING: &str = "NEWS HIGHLIGHTS";
pub const TRENDS_HEADING: &str = "TRENDING TOPICS";
pub const FINANCE_HEADING: &str = "MARKET OVERVIEW";
pub const INSIGHTS_HEADING: &str = "KEY INSIGHTS";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarySections {
    pub news: String,
    pub trends: String,
    pub finance: String,
    pub insights: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    News,
    Trends,
    Finance,
    Insights,
}

static HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    // Two accepted spellings: markdown-bold "**HEADER**" (optional trailing
    // colon) or plain "HEADER:". Headings may sit mid-line.
    Regex::new(
        r"(?i)(?:\*\*\s*(?P<bold>NEWS HIGHLIGHTS|TRENDING TOPICS|MARKET OVERVIEW|KEY INSIGHTS)\s*\*\*\s*:?|(?P<plain>NEWS HIGHLIGHTS|TRENDING TOPICS|MARKET OVERVIEW|KEY INSIGHTS)\s*:)",
    )
    .expect("heading regex")
});

fn section_for(name: &str) -> Section {
    match name.to_ascii_uppercase().as_str() {
        TRENDS_HEADING => Section::Trends,
        FINANCE_HEADING => Section::Finance,
        INSIGHTS_HEADING => Section::Insights,
        _ => Section::News,
    }
}

struct FoundHeading {
    section: Section,
    start: usize,
    content_start: usize,
}

/// Extract `{news, trends, finance, insights}` from raw model output.
pub fn parse_summary(raw: &str) -> SummarySections {
    let mut headings: Vec<FoundHeading> = Vec::new();
    for caps in HEADING_RE.captures_iter(raw) {
        let whole = caps.get(0).expect("match 0");
        let name = caps
            .name("bold")
            .or_else(|| caps.name("plain"))
            .map(|m| m.as_str())
            .unwrap_or_default();
        headings.push(FoundHeading {
            section: section_for(name),
            start: whole.start(),
            content_start: whole.end(),
        });
    }

    let mut out = SummarySections::default();
    for section in [
        Section::News,
        Section::Trends,
        Section::Finance,
        Section::Insights,
    ] {
        // First occurrence wins; capture up to the next heading of any kind.
        let Some(found) = headings.iter().find(|h| h.section == section) else {
            continue;
        };
        let end = headings
            .iter()
            .map(|h| h.start)
            .filter(|s| *s >= found.content_start)
            .min()
            .unwrap_or(raw.len());
        let text = raw[found.content_start..end].trim().to_string();
        match section {
            Section::News => out.news = text,
            Section::Trends => out.trends = text,
            Section::Finance => out.finance = text,
            Section::Insights => out.insights = text,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_all_four_sections_from_bold_headings() {
        let raw = "\
Intro prose the model added anyway.

**NEWS HIGHLIGHTS**
Rates held steady.

**TRENDING TOPICS**
Everyone searched for the eclipse.

**MARKET OVERVIEW**
Tech drifted sideways.

**KEY INSIGHTS**
Stay patient.
";
        let s = parse_summary(raw);
        assert_eq!(s.news, "Rates held steady.");
        assert_eq!(s.trends, "Everyone searched for the eclipse.");
        assert_eq!(s.finance, "Tech drifted sideways.");
        assert_eq!(s.insights, "Stay patient.");
    }

    #[test]
    fn extracts_sections_from_plain_inline_headings() {
        let raw = "NEWS HIGHLIGHTS: A is notable. TRENDING TOPICS: B is trending. \
                   MARKET OVERVIEW: BTC-USD holds steady. KEY INSIGHTS: Stay informed.";
        let s = parse_summary(raw);
        assert_eq!(s.news, "A is notable.");
        assert_eq!(s.trends, "B is trending.");
        assert_eq!(s.finance, "BTC-USD holds steady.");
        assert_eq!(s.insights, "Stay informed.");
    }

    #[test]
    fn missing_section_yields_empty_string() {
        let raw = "NEWS HIGHLIGHTS: something. MARKET OVERVIEW: flat. KEY INSIGHTS: rest.";
        let s = parse_summary(raw);
        assert_eq!(s.trends, "");
        assert_eq!(s.news, "something.");
        assert_eq!(s.finance, "flat.");
        assert_eq!(s.insights, "rest.");
    }

    #[test]
    fn tolerates_non_canonical_order() {
        let raw = "KEY INSIGHTS: first, oddly. NEWS HIGHLIGHTS: then the news.";
        let s = parse_summary(raw);
        assert_eq!(s.insights, "first, oddly.");
        assert_eq!(s.news, "then the news.");
    }

    #[test]
    fn bold_heading_with_trailing_colon_and_mixed_case() {
        let raw = "**News Highlights**: upper and lower. Trending Topics: still found.";
        let s = parse_summary(raw);
        assert_eq!(s.news, "upper and lower.");
        assert_eq!(s.trends, "still found.");
    }

    #[test]
    fn empty_input_gives_all_empty() {
        assert_eq!(parse_summary(""), SummarySections::default());
    }

    #[test]
    fn prose_without_colon_is_not_a_heading() {
        let raw = "The news highlights were dull today. MARKET OVERVIEW: flat.";
        let s = parse_summary(raw);
        assert_eq!(s.news, "");
        assert_eq!(s.finance, "flat.");
    }
}
