// src/fetch/finance.rs
//! Bulk quotes for the dashboard's fixed symbol set: the NASDAQ composite,
//! five large-cap tech equities, and four crypto pairs. One request, results
//! partitioned for display; symbols with missing data are dropped silently.

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use std::time::Duration;

use crate::fetch::types::{Quote, QuoteBoard, QuoteSource};

const BULK_QUOTE_URL: &str = "https://query1.finance.yahoo.com/v7/finance/quote";

pub const INDEX_SYMBOL: &str = "^IXIC";
pub const TECH_SYMBOLS: [&str; 5] = ["AAPL", "MSFT", "GOOGL", "AMZN", "NVDA"];
pub const CRYPTO_SYMBOLS: [&str; 4] = ["BTC-USD", "ETH-USD", "SOL-USD", "DOGE-USD"];

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteResponse,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    result: Vec<RawQuote>,
}

#[derive(Debug, Deserialize)]
struct RawQuote {
    symbol: String,
    #[serde(rename = "regularMarketPrice")]
    price: Option<f64>,
    #[serde(rename = "regularMarketChange")]
    change: Option<f64>,
    #[serde(rename = "regularMarketChangePercent")]
    change_percent: Option<f64>,
}

fn all_symbols() -> String {
    let mut syms = vec![INDEX_SYMBOL.to_string()];
    syms.extend(TECH_SYMBOLS.iter().map(|s| s.to_string()));
    syms.extend(CRYPTO_SYMBOLS.iter().map(|s| s.to_string()));
    syms.join(",")
}

pub struct BulkQuoteProvider {
    http: reqwest::Client,
}

impl Default for BulkQuoteProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl BulkQuoteProvider {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .user_agent("pulseboard/0.1 (+github.com/lumlich/pulseboard)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self { http }
    }

    /// Parse a bulk payload into the partitioned board. A quote without a
    /// price is treated as errored and omitted.
    pub fn parse_board(body: &str) -> Result<QuoteBoard> {
        let envelope: QuoteEnvelope =
            serde_json::from_str(body).context("parsing quote json")?;
        let mut board = QuoteBoard::default();
        for raw in envelope.quote_response.result {
            let Some(price) = raw.price else { continue };
            let quote = Quote {
                symbol: raw.symbol.clone(),
                price: format!("{price:.2}"),
                change: format!("{:.2}", raw.change.unwrap_or(0.0)),
                change_percent: format!("{:.2}", raw.change_percent.unwrap_or(0.0)),
            };
            if raw.symbol == INDEX_SYMBOL {
                board.nasdaq = Some(quote);
            } else if CRYPTO_SYMBOLS.contains(&raw.symbol.as_str()) {
                board.crypto.insert(raw.symbol, quote);
            } else if TECH_SYMBOLS.contains(&raw.symbol.as_str()) {
                board.tech_stocks.insert(raw.symbol, quote);
            }
            // anything else in the payload is not ours; ignore
        }
        Ok(board)
    }
}

#[async_trait]
impl QuoteSource for BulkQuoteProvider {
    async fn quote_board(&self) -> Result<QuoteBoard> {
        let resp = self
            .http
            .get(BULK_QUOTE_URL)
            .query(&[("symbols", all_symbols().as_str())])
            .send()
            .await
            .context("quote http get()")?;
        if !resp.status().is_success() {
            counter!("feed_fetch_errors_total", "source" => "finance").increment(1);
            anyhow::bail!("quote api returned {}", resp.status());
        }
        let body = resp.text().await.context("quote http .text()")?;
        Self::parse_board(&body)
    }

    fn name(&self) -> &'static str {
        "finance"
    }
}
