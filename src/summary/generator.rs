// src/summary/generator.rs
//! Turns a section snapshot into briefing prose via the chat API.
//!
//! The system instructions pin down the reply structure (four uppercase
//! headings) and the wording for market moves; the section splitter and the
//! dashboard both rely on that vocabulary staying stable.

use std::time::Duration;

use metrics::counter;
use tracing::warn;

use crate::fetch::chat::{ChatApi, ChatMessage, OpenAiChat};
use crate::fetch::types::SectionData;

const MAX_ATTEMPTS: u8 = 3;
const BACKOFF_STEP_MS: u64 = 1000;
/// Headline descriptions get clipped to keep the prompt compact.
const DESCRIPTION_CAP: usize = 150;

const SYSTEM_INSTRUCTIONS: &str = "You are writing a short daily briefing for a \
personal dashboard. Structure the reply into exactly four sections with these \
uppercase headings: NEWS HIGHLIGHTS, TRENDING TOPICS, MARKET OVERVIEW, KEY \
INSIGHTS. Describe percentage changes only as 'up', 'down' or 'slight \
movement'. Avoid dramatic words like 'soared', 'plunged' or 'crashed' unless \
a move exceeds 10%. Keep each section to a few sentences of plain prose.";

pub struct SummaryGenerator {
    chat: Box<dyn ChatApi>,
    max_attempts: u8,
}

impl SummaryGenerator {
    pub fn new(chat: Box<dyn ChatApi>) -> Self {
        Self {
            chat,
            max_attempts: MAX_ATTEMPTS,
        }
    }

    /// Wire up the live chat backend.
    pub fn from_env() -> Self {
        Self::new(Box::new(OpenAiChat::new(None)))
    }

    /// Ask the model for briefing text. Retries transient failures with a
    /// growing pause; after the attempt budget is spent, returns `None` and
    /// leaves the decision about the run to the caller.
    pub async fn generate(
        &self,
        data: &SectionData,
        is_weekend: bool,
        market_closed: bool,
    ) -> Option<String> {
        let prompt = build_prompt(data, is_weekend, market_closed);
        let messages = [
            ChatMessage::system(SYSTEM_INSTRUCTIONS),
            ChatMessage::user(prompt),
        ];

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            match self.chat.complete(&messages).await {
                Ok(text) => return Some(text),
                Err(e) => {
                    warn!(
                        backend = self.chat.name(),
                        attempt,
                        error = %e,
                        "summary generation attempt failed"
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(Duration::from_millis(
                            BACKOFF_STEP_MS * u64::from(attempt),
                        ))
                        .await;
                        continue;
                    }
                    counter!("summary_failures_total").increment(1);
                    return None;
                }
            }
        }
    }
}

/// Assemble the user prompt from whatever sections survived collection.
/// Equity figures are left out on weekends and market holidays; crypto trades
/// around the clock and is always included.
fn build_prompt(data: &SectionData, is_weekend: bool, market_closed: bool) -> String {
    let mut prompt = String::new();

    if let Some(news) = data.news.as_deref() {
        if !news.is_empty() {
            prompt.push_str("Today's news headlines:\n");
            for h in news {
                prompt.push_str("- ");
                prompt.push_str(&h.title);
                if !h.description.is_empty() {
                    prompt.push_str(": ");
                    prompt.push_str(&clip(&h.description, DESCRIPTION_CAP));
                }
                if !h.source.is_empty() {
                    prompt.push_str(&format!(" [{}]", h.source));
                }
                prompt.push('\n');
            }
            prompt.push('\n');
        }
    }

    if let Some(trends) = data.trends.as_deref() {
        if !trends.is_empty() {
            prompt.push_str("Trending searches:\n");
            for t in trends {
                if t.traffic.is_empty() {
                    prompt.push_str(&format!("- {}\n", t.title));
                } else {
                    prompt.push_str(&format!("- {} ({})\n", t.title, t.traffic));
                }
            }
            prompt.push('\n');
        }
    }

    if let Some(board) = data.finance.as_ref() {
        if !board.is_empty() {
            prompt.push_str("Market data:\n");
            let suppress_stocks = is_weekend || market_closed;
            if suppress_stocks {
                prompt.push_str(
                    "Equity markets were closed today; mention that instead of stock moves.\n",
                );
            } else {
                if let Some(q) = board.nasdaq.as_ref() {
                    prompt.push_str(&format!(
                        "- NASDAQ Composite: {} ({}%)\n",
                        q.price, q.change_percent
                    ));
                }
                for (symbol, q) in &board.tech_stocks {
                    prompt.push_str(&format!("- {}: {} ({}%)\n", symbol, q.price, q.change_percent));
                }
            }
            for (symbol, q) in &board.crypto {
                prompt.push_str(&format!("- {}: {} ({}%)\n", symbol, q.price, q.change_percent));
            }
            prompt.push('\n');
        }
    }

    prompt.push_str("Write today's briefing from the data above.");
    prompt
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::types::{Headline, Quote, QuoteBoard, TrendEntry};
    use anyhow::{anyhow, Result};
    use std::sync::atomic::{AtomicU8, Ordering};
    use std::sync::Arc;

    struct FlakyChat {
        calls: Arc<AtomicU8>,
        succeed_after: u8,
    }

    #[async_trait::async_trait]
    impl ChatApi for FlakyChat {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n > self.succeed_after {
                Ok("NEWS HIGHLIGHTS: fine.".to_string())
            } else {
                Err(anyhow!("simulated outage"))
            }
        }
        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    fn sample_data() -> SectionData {
        SectionData {
            news: Some(vec![Headline {
                title: "A".into(),
                description: "details".into(),
                source: "wire".into(),
            }]),
            trends: Some(vec![TrendEntry {
                title: "B".into(),
                traffic: "10K+".into(),
            }]),
            finance: Some(sample_board()),
        }
    }

    fn sample_board() -> QuoteBoard {
        let quote = |symbol: &str| Quote {
            symbol: symbol.to_string(),
            price: "100.00".to_string(),
            change: "1.00".to_string(),
            change_percent: "1.00".to_string(),
        };
        let mut board = QuoteBoard {
            nasdaq: Some(quote("^IXIC")),
            ..QuoteBoard::default()
        };
        board.tech_stocks.insert("AAPL".into(), quote("AAPL"));
        board.crypto.insert("BTC-USD".into(), quote("BTC-USD"));
        board
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_return_none_after_exactly_three_calls() {
        let calls = Arc::new(AtomicU8::new(0));
        let generator = SummaryGenerator::new(Box::new(FlakyChat {
            calls: calls.clone(),
            succeed_after: u8::MAX,
        }));
        let out = generator.generate(&sample_data(), false, false).await;
        assert!(out.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let calls = Arc::new(AtomicU8::new(0));
        let generator = SummaryGenerator::new(Box::new(FlakyChat {
            calls: calls.clone(),
            succeed_after: 0,
        }));
        let out = generator.generate(&sample_data(), false, false).await;
        assert_eq!(out.as_deref(), Some("NEWS HIGHLIGHTS: fine."));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let calls = Arc::new(AtomicU8::new(0));
        let generator = SummaryGenerator::new(Box::new(FlakyChat {
            calls: calls.clone(),
            succeed_after: 1,
        }));
        let out = generator.generate(&sample_data(), false, false).await;
        assert!(out.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn weekday_prompt_carries_stock_figures() {
        let prompt = build_prompt(&sample_data(), false, false);
        assert!(prompt.contains("NASDAQ Composite"));
        assert!(prompt.contains("AAPL"));
        assert!(prompt.contains("BTC-USD"));
        assert!(prompt.contains("- A: details [wire]"));
        assert!(prompt.contains("- B (10K+)"));
    }

    #[test]
    fn weekend_prompt_suppresses_stocks_but_keeps_crypto() {
        let prompt = build_prompt(&sample_data(), true, false);
        assert!(!prompt.contains("NASDAQ Composite"));
        assert!(!prompt.contains("AAPL"));
        assert!(prompt.contains("BTC-USD"));
        assert!(prompt.contains("closed today"));
    }

    #[test]
    fn market_holiday_suppresses_stocks_like_a_weekend() {
        let prompt = build_prompt(&sample_data(), false, true);
        assert!(!prompt.contains("AAPL"));
        assert!(prompt.contains("BTC-USD"));
    }

    #[test]
    fn long_descriptions_are_clipped() {
        let mut data = sample_data();
        data.news = Some(vec![Headline {
            title: "T".into(),
            description: "d".repeat(400),
            source: String::new(),
        }]);
        let prompt = build_prompt(&data, false, false);
        assert!(prompt.contains(&format!("{}...", "d".repeat(DESCRIPTION_CAP))));
        assert!(!prompt.contains(&"d".repeat(DESCRIPTION_CAP + 1)));
    }

    #[test]
    fn instructions_pin_the_movement_vocabulary() {
        assert!(SYSTEM_INSTRUCTIONS.contains("'up'"));
        assert!(SYSTEM_INSTRUCTIONS.contains("'down'"));
        assert!(SYSTEM_INSTRUCTIONS.contains("'slight movement'"));
        assert!(SYSTEM_INSTRUCTIONS.contains("10%"));
        assert!(SYSTEM_INSTRUCTIONS.contains("NEWS HIGHLIGHTS"));
        assert!(SYSTEM_INSTRUCTIONS.contains("KEY INSIGHTS"));
    }
}
