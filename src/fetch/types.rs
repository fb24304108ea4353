// src/fetch/types.rs
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::RegionConfig;

/// One normalized news headline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headline {
    pub title: String,
    pub description: String,
    pub source: String,
}

/// One trending search, e.g. `{title: "solar eclipse", traffic: "500K+"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendEntry {
    pub title: String,
    pub traffic: String,
}

/// A single quote snapshot. Price fields are pre-formatted display strings
/// (two decimals); the stored document and the prompt both consume text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    pub price: String,
    pub change: String,
    pub change_percent: String,
}

/// Bulk-quote result partitioned the way the dashboard displays it.
/// Symbols whose fetch errored are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteBoard {
    pub nasdaq: Option<Quote>,
    pub tech_stocks: BTreeMap<String, Quote>,
    pub crypto: BTreeMap<String, Quote>,
}

impl QuoteBoard {
    pub fn is_empty(&self) -> bool {
        self.nasdaq.is_none() && self.tech_stocks.is_empty() && self.crypto.is_empty()
    }
}

/// Snapshot of all three feed sections for one region. Any field may be
/// `None` when its source fetch failed; downstream code tolerates the holes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionData {
    pub news: Option<Vec<Headline>>,
    pub trends: Option<Vec<TrendEntry>>,
    pub finance: Option<QuoteBoard>,
}

impl SectionData {
    /// True when every source failed; the pipeline treats this as
    /// "nothing to summarize yet".
    pub fn is_empty(&self) -> bool {
        self.news.is_none() && self.trends.is_none() && self.finance.is_none()
    }
}

#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    async fn top_headlines(&self, region: &RegionConfig) -> Result<Vec<Headline>>;
    fn name(&self) -> &'static str;
}

#[async_trait::async_trait]
pub trait TrendsSource: Send + Sync {
    async fn daily_trends(&self, region: &RegionConfig) -> Result<Vec<TrendEntry>>;
    fn name(&self) -> &'static str;
}

#[async_trait::async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote_board(&self) -> Result<QuoteBoard>;
    fn name(&self) -> &'static str;
}
