// src/fetch/trends.rs
//! Daily trending searches. The endpoint answers with an XSSI guard prefix
//! (`)]}',`) in front of the JSON body and groups results into per-day
//! buckets; we strip the prefix, flatten the buckets, and cap the list.

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use std::time::Duration;

use crate::config::RegionConfig;
use crate::fetch::types::{TrendEntry, TrendsSource};

const DAILY_TRENDS_URL: &str = "https://trends.google.com/trends/api/dailytrends";
const TREND_CAP: usize = 25;

#[derive(Debug, Deserialize)]
struct TrendsResponse {
    #[serde(rename = "default")]
    root: TrendsRoot,
}

#[derive(Debug, Deserialize)]
struct TrendsRoot {
    #[serde(rename = "trendingSearchesDays", default)]
    days: Vec<TrendsDay>,
}

#[derive(Debug, Deserialize)]
struct TrendsDay {
    #[serde(rename = "trendingSearches", default)]
    searches: Vec<TrendingSearch>,
}

#[derive(Debug, Deserialize)]
struct TrendingSearch {
    title: TrendTitle,
    #[serde(rename = "formattedTraffic")]
    formatted_traffic: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrendTitle {
    query: String,
}

pub struct DailyTrendsProvider {
    http: reqwest::Client,
}

impl Default for DailyTrendsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DailyTrendsProvider {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .user_agent("pulseboard/0.1 (+github.com/lumlich/pulseboard)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self { http }
    }

    /// Drop the anti-scraping prefix the endpoint prepends to its JSON.
    fn strip_xssi_prefix(body: &str) -> &str {
        let trimmed = body.trim_start();
        if let Some(rest) = trimmed.strip_prefix(")]}'") {
            return rest.trim_start_matches(',').trim_start();
        }
        trimmed
    }

    /// Parse a raw payload into a flat, capped trend list.
    pub fn parse_trends(body: &str) -> Result<Vec<TrendEntry>> {
        let json = Self::strip_xssi_prefix(body);
        let resp: TrendsResponse = serde_json::from_str(json).context("parsing trends json")?;
        let out: Vec<TrendEntry> = resp
            .root
            .days
            .into_iter()
            .flat_map(|day| day.searches)
            .map(|s| TrendEntry {
                title: s.title.query,
                traffic: s.formatted_traffic.unwrap_or_default(),
            })
            .filter(|t| !t.title.is_empty())
            .take(TREND_CAP)
            .collect();
        Ok(out)
    }
}

#[async_trait]
impl TrendsSource for DailyTrendsProvider {
    async fn daily_trends(&self, region: &RegionConfig) -> Result<Vec<TrendEntry>> {
        let hl = format!("{}-{}", region.language, region.country);
        let resp = self
            .http
            .get(DAILY_TRENDS_URL)
            .query(&[("hl", hl.as_str()), ("geo", region.country.as_str())])
            .send()
            .await
            .context("trends http get()")?;
        if !resp.status().is_success() {
            counter!("feed_fetch_errors_total", "source" => "trends").increment(1);
            anyhow::bail!("trends api returned {}", resp.status());
        }
        let body = resp.text().await.context("trends http .text()")?;
        Self::parse_trends(&body)
    }

    fn name(&self) -> &'static str {
        "trends"
    }
}
