// src/fetch/news.rs
//! Top-headlines provider (NewsAPI-compatible). Requires `NEWS_API_KEY`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use std::time::Duration;

use crate::config::RegionConfig;
use crate::fetch::normalize_text;
use crate::fetch::types::{Headline, NewsSource};

const TOP_HEADLINES_URL: &str = "https://newsapi.org/v2/top-headlines";
const HEADLINE_COUNT: usize = 5;

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    title: Option<String>,
    description: Option<String>,
    source: Option<ArticleSource>,
}

#[derive(Debug, Deserialize)]
struct ArticleSource {
    name: Option<String>,
}

pub struct NewsApiProvider {
    http: reqwest::Client,
    api_key: String,
}

impl NewsApiProvider {
    pub fn from_env() -> Self {
        let api_key = std::env::var("NEWS_API_KEY").unwrap_or_default();
        let http = reqwest::Client::builder()
            .user_agent("pulseboard/0.1 (+github.com/lumlich/pulseboard)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self { http, api_key }
    }

    /// Parse a raw API payload into normalized headlines. Separated from the
    /// HTTP call so tests can feed canned JSON.
    pub fn parse_headlines(body: &str) -> Result<Vec<Headline>> {
        let resp: NewsResponse = serde_json::from_str(body).context("parsing news json")?;
        let mut out = Vec::with_capacity(HEADLINE_COUNT);
        for art in resp.articles {
            let title = normalize_text(art.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            out.push(Headline {
                title,
                description: normalize_text(art.description.as_deref().unwrap_or_default()),
                source: art
                    .source
                    .and_then(|s| s.name)
                    .unwrap_or_else(|| "unknown".to_string()),
            });
            if out.len() == HEADLINE_COUNT {
                break;
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl NewsSource for NewsApiProvider {
    async fn top_headlines(&self, region: &RegionConfig) -> Result<Vec<Headline>> {
        if self.api_key.is_empty() {
            anyhow::bail!("NEWS_API_KEY not set");
        }
        let resp = self
            .http
            .get(TOP_HEADLINES_URL)
            .query(&[
                ("country", region.country.to_ascii_lowercase().as_str()),
                ("language", region.language.as_str()),
                ("category", "general"),
                ("pageSize", "5"),
            ])
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .context("news http get()")?;
        if !resp.status().is_success() {
            counter!("feed_fetch_errors_total", "source" => "news").increment(1);
            anyhow::bail!("news api returned {}", resp.status());
        }
        let body = resp.text().await.context("news http .text()")?;
        Self::parse_headlines(&body)
    }

    fn name(&self) -> &'static str {
        "news"
    }
}
