// src/summary/collector.rs
//! Gathers the three feed sections for a summary run. Fetches fire
//! concurrently; a failed source becomes a `None` field, never an error for
//! the run as a whole.

use tracing::{debug, warn};

use crate::config::RegionConfig;
use crate::fetch::finance::BulkQuoteProvider;
use crate::fetch::news::NewsApiProvider;
use crate::fetch::trends::DailyTrendsProvider;
use crate::fetch::types::{NewsSource, QuoteSource, SectionData, TrendsSource};

pub struct SectionCollector {
    news: Box<dyn NewsSource>,
    trends: Box<dyn TrendsSource>,
    quotes: Box<dyn QuoteSource>,
}

impl SectionCollector {
    pub fn new(
        news: Box<dyn NewsSource>,
        trends: Box<dyn TrendsSource>,
        quotes: Box<dyn QuoteSource>,
    ) -> Self {
        Self {
            news,
            trends,
            quotes,
        }
    }

    /// Wire up the live providers.
    pub fn from_env() -> Self {
        Self::new(
            Box::new(NewsApiProvider::from_env()),
            Box::new(DailyTrendsProvider::new()),
            Box::new(BulkQuoteProvider::new()),
        )
    }

    /// Fetch all three sections for `region`. Each failure is logged and
    /// turned into a hole; callers check `SectionData::is_empty` to decide
    /// whether a run is worth continuing.
    pub async fn collect(&self, region: &RegionConfig) -> SectionData {
        let (news, trends, finance) = tokio::join!(
            self.news.top_headlines(region),
            self.trends.daily_trends(region),
            self.quotes.quote_board(),
        );

        let news = match news {
            Ok(items) => Some(items),
            Err(e) => {
                warn!(source = self.news.name(), error = %e, "section fetch failed");
                None
            }
        };
        let trends = match trends {
            Ok(items) => Some(items),
            Err(e) => {
                warn!(source = self.trends.name(), error = %e, "section fetch failed");
                None
            }
        };
        let finance = match finance {
            Ok(board) => Some(board),
            Err(e) => {
                warn!(source = self.quotes.name(), error = %e, "section fetch failed");
                None
            }
        };

        let data = SectionData {
            news,
            trends,
            finance,
        };
        debug!(
            news = data.news.as_ref().map(Vec::len),
            trends = data.trends.as_ref().map(Vec::len),
            finance = data.finance.is_some(),
            "sections collected"
        );
        data
    }
}
