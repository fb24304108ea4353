// src/summary/scheduler.rs
//! Drives the daily pipeline: a primary evening trigger, three catch-up
//! slots for days where the primary run failed, and a manual trigger used by
//! the admin endpoint. One run at a time; a same-day rerun overwrites.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Timelike};
use metrics::{counter, gauge};
use tracing::{debug, info, warn};

use crate::config::RegionConfig;
use crate::summary::collector::SectionCollector;
use crate::summary::generator::SummaryGenerator;
use crate::summary::parser::parse_summary;
use crate::summary::store::{DailySummary, SaveOutcome, SaveRequest, SummaryStore};
use crate::summary::{is_weekend, market_open_on};

/// Daily trigger slots in the region's local time. The first is the primary
/// run; the rest only fire when no evening summary exists yet.
const TRIGGERS: [(u32, u32, bool); 4] = [
    (23, 0, true),
    (23, 5, false),
    (23, 30, false),
    (23, 59, false),
];

/// A summary stamped at or after this local hour counts as tonight's run.
const EVENING_HOUR: u32 = 23;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Another run holds the lock.
    AlreadyRunning,
    /// Every section came back empty; nothing to summarize yet.
    SkippedNoData,
    /// The model gave nothing usable within the retry budget.
    GenerationFailed,
    /// The store refused the write (date rolled over mid-run).
    StoreRejected,
    StoreFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    AlreadyRunning,
}

pub struct SummaryScheduler {
    collector: SectionCollector,
    generator: SummaryGenerator,
    store: Arc<SummaryStore>,
    region: RegionConfig,
    generating: AtomicBool,
    last_date: Mutex<Option<NaiveDate>>,
}

impl SummaryScheduler {
    pub fn new(
        collector: SectionCollector,
        generator: SummaryGenerator,
        store: Arc<SummaryStore>,
        region: RegionConfig,
    ) -> Self {
        Self {
            collector,
            generator,
            store,
            region,
            generating: AtomicBool::new(false),
            last_date: Mutex::new(None),
        }
    }

    /// Wire up live providers for `region`.
    pub fn from_env(store: Arc<SummaryStore>, region: RegionConfig) -> Self {
        Self::new(
            SectionCollector::from_env(),
            SummaryGenerator::from_env(),
            store,
            region,
        )
    }

    pub fn region(&self) -> &RegionConfig {
        &self.region
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }

    pub fn last_generation_date(&self) -> Option<String> {
        self.last_date
            .lock()
            .expect("scheduler mutex poisoned")
            .map(|d| d.format("%Y-%m-%d").to_string())
    }

    /// Admin entry point. The pipeline runs on its own task; the caller gets
    /// an immediate started/refused answer.
    pub fn trigger_manual(self: Arc<Self>) -> TriggerOutcome {
        if self.is_generating() {
            return TriggerOutcome::AlreadyRunning;
        }
        tokio::spawn(async move {
            let outcome = self.run_pipeline().await;
            info!(?outcome, "manual summary trigger finished");
        });
        TriggerOutcome::Started
    }

    /// Background loop firing the daily trigger slots.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(timezone = %self.region.timezone, "summary scheduler started");
            loop {
                let Some((at, is_primary)) = next_trigger_after(&self.region) else {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    continue;
                };
                let wait = (at - self.region.now()).to_std().unwrap_or_default();
                debug!(at = %at, primary = is_primary, "next summary trigger scheduled");
                tokio::time::sleep(wait).await;
                self.fire(is_primary).await;
            }
        })
    }

    async fn fire(&self, is_primary: bool) {
        if !is_primary && self.today_already_summarized() {
            debug!("catch-up trigger: evening summary already written, skipping");
            return;
        }
        let outcome = self.run_pipeline().await;
        debug!(?outcome, primary = is_primary, "scheduled summary trigger finished");
    }

    /// Collect, generate, split, store. Guarded so overlapping callers bail
    /// out instead of racing; the guard is released on every exit path.
    pub async fn run_pipeline(&self) -> RunOutcome {
        if self.generating.swap(true, Ordering::SeqCst) {
            return RunOutcome::AlreadyRunning;
        }
        let _guard = GeneratingGuard(&self.generating);

        let date = self.region.today();
        let date_str = date.format("%Y-%m-%d").to_string();
        counter!("summary_runs_total").increment(1);
        info!(date = %date_str, language = %self.region.language,
            country = %self.region.country, "summary run started");

        let data = self.collector.collect(&self.region).await;
        if data.is_empty() {
            counter!("summary_skips_total").increment(1);
            info!(date = %date_str, "all sections empty, nothing to summarize yet");
            return RunOutcome::SkippedNoData;
        }

        let weekend = is_weekend(date);
        let closed = !market_open_on(date);
        let Some(raw) = self.generator.generate(&data, weekend, closed).await else {
            warn!(date = %date_str, language = %self.region.language,
                country = %self.region.country, "summary generation failed, run abandoned");
            return RunOutcome::GenerationFailed;
        };

        let sections = parse_summary(&raw);
        let request = SaveRequest {
            date: date_str.clone(),
            language: self.region.language.clone(),
            country: self.region.country.clone(),
            news: sections.news,
            trends: sections.trends,
            finance: sections.finance,
            overall: sections.insights,
            automated: true,
        };
        match self.store.save(request, &self.region) {
            Ok(SaveOutcome::Saved(_)) => {
                *self.last_date.lock().expect("scheduler mutex poisoned") = Some(date);
                gauge!("summary_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
                info!(date = %date_str, "daily summary stored");
                RunOutcome::Completed
            }
            Ok(SaveOutcome::DuplicatePast(_)) => {
                warn!(date = %date_str, "store refused the write, date rolled over mid-run");
                RunOutcome::StoreRejected
            }
            Err(e) => {
                warn!(date = %date_str, error = %e, "storing the summary failed");
                RunOutcome::StoreFailed
            }
        }
    }

    fn today_already_summarized(&self) -> bool {
        let date = self.region.today().format("%Y-%m-%d").to_string();
        match self
            .store
            .load(&date, &self.region.language, &self.region.country)
        {
            Ok(Some(existing)) => written_by_evening_run(&existing),
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "could not check for an existing summary");
                false
            }
        }
    }
}

struct GeneratingGuard<'a>(&'a AtomicBool);

impl Drop for GeneratingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// True when the stored timestamp says an evening run already happened.
/// Unparseable timestamps count as "no", so the catch-up run proceeds.
fn written_by_evening_run(summary: &DailySummary) -> bool {
    DateTime::parse_from_rfc3339(&summary.timestamp)
        .map(|ts| ts.hour() >= EVENING_HOUR)
        .unwrap_or(false)
}

/// Earliest trigger slot strictly after the region's current time, searching
/// today and tomorrow.
fn next_trigger_after(region: &RegionConfig) -> Option<(DateTime<chrono_tz::Tz>, bool)> {
    let now = region.now();
    let today = now.date_naive();
    let mut best: Option<(DateTime<chrono_tz::Tz>, bool)> = None;
    for day_offset in 0..2 {
        let date = today + chrono::Duration::days(day_offset);
        for (hour, minute, primary) in TRIGGERS {
            let Some(naive) = date.and_hms_opt(hour, minute, 0) else {
                continue;
            };
            let Some(local) = region.tz().from_local_datetime(&naive).earliest() else {
                continue;
            };
            if local > now && best.map_or(true, |(b, _)| local < b) {
                best = Some((local, primary));
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::chat::{ChatApi, ChatMessage};
    use crate::fetch::types::{
        Headline, NewsSource, Quote, QuoteBoard, QuoteSource, TrendEntry, TrendsSource,
    };
    use anyhow::{anyhow, Result};
    use std::sync::atomic::AtomicU8;
    use tempfile::TempDir;

    struct StubNews(bool);
    #[async_trait::async_trait]
    impl NewsSource for StubNews {
        async fn top_headlines(&self, _region: &RegionConfig) -> Result<Vec<Headline>> {
            if self.0 {
                Ok(vec![Headline {
                    title: "A".into(),
                    description: String::new(),
                    source: String::new(),
                }])
            } else {
                Err(anyhow!("down"))
            }
        }
        fn name(&self) -> &'static str {
            "stub-news"
        }
    }

    struct StubTrends(bool);
    #[async_trait::async_trait]
    impl TrendsSource for StubTrends {
        async fn daily_trends(&self, _region: &RegionConfig) -> Result<Vec<TrendEntry>> {
            if self.0 {
                Ok(vec![TrendEntry {
                    title: "B".into(),
                    traffic: "10K+".into(),
                }])
            } else {
                Err(anyhow!("down"))
            }
        }
        fn name(&self) -> &'static str {
            "stub-trends"
        }
    }

    struct StubQuotes(bool);
    #[async_trait::async_trait]
    impl QuoteSource for StubQuotes {
        async fn quote_board(&self) -> Result<QuoteBoard> {
            if self.0 {
                let mut board = QuoteBoard::default();
                board.crypto.insert(
                    "BTC-USD".into(),
                    Quote {
                        symbol: "BTC-USD".into(),
                        price: "50000.00".into(),
                        change: "0.00".into(),
                        change_percent: "0.00".into(),
                    },
                );
                Ok(board)
            } else {
                Err(anyhow!("down"))
            }
        }
        fn name(&self) -> &'static str {
            "stub-quotes"
        }
    }

    struct CountingChat {
        calls: Arc<AtomicU8>,
        delay_ms: u64,
    }
    #[async_trait::async_trait]
    impl ChatApi for CountingChat {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            Ok("NEWS HIGHLIGHTS: A is notable. TRENDING TOPICS: B is trending. \
                MARKET OVERVIEW: BTC-USD holds steady. KEY INSIGHTS: Stay informed."
                .to_string())
        }
        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn scheduler_with(
        sources_up: bool,
        chat_calls: Arc<AtomicU8>,
        chat_delay_ms: u64,
        dir: &TempDir,
    ) -> Arc<SummaryScheduler> {
        let collector = SectionCollector::new(
            Box::new(StubNews(sources_up)),
            Box::new(StubTrends(sources_up)),
            Box::new(StubQuotes(sources_up)),
        );
        let generator = SummaryGenerator::new(Box::new(CountingChat {
            calls: chat_calls,
            delay_ms: chat_delay_ms,
        }));
        let store = Arc::new(SummaryStore::new(dir.path().join("daily_summaries.json")));
        Arc::new(SummaryScheduler::new(
            collector,
            generator,
            store,
            RegionConfig::default(),
        ))
    }

    #[tokio::test]
    async fn all_empty_sections_skip_generator_and_store() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicU8::new(0));
        let scheduler = scheduler_with(false, calls.clone(), 0, &dir);

        let outcome = scheduler.run_pipeline().await;
        assert_eq!(outcome, RunOutcome::SkippedNoData);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!dir.path().join("daily_summaries.json").exists());
        assert!(!scheduler.is_generating());
    }

    #[tokio::test]
    async fn pipeline_stores_parsed_sections_for_today() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicU8::new(0));
        let scheduler = scheduler_with(true, calls.clone(), 0, &dir);

        let outcome = scheduler.run_pipeline().await;
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let region = RegionConfig::default();
        let today = region.today().format("%Y-%m-%d").to_string();
        let stored = scheduler
            .store
            .load(&today, "en", "US")
            .unwrap()
            .expect("summary stored");
        assert_eq!(stored.news, "A is notable.");
        assert_eq!(stored.trends, "B is trending.");
        assert_eq!(stored.finance, "BTC-USD holds steady.");
        assert_eq!(stored.overall, "Stay informed.");
        assert!(stored.automated);
        assert_eq!(scheduler.last_generation_date(), Some(today));
        assert!(!scheduler.is_generating());
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_runs_are_refused() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicU8::new(0));
        let scheduler = scheduler_with(true, calls.clone(), 50, &dir);

        let (first, second) = tokio::join!(scheduler.run_pipeline(), scheduler.run_pipeline());
        let outcomes = [first, second];
        assert!(outcomes.contains(&RunOutcome::Completed));
        assert!(outcomes.contains(&RunOutcome::AlreadyRunning));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn evening_run_detection_reads_the_local_hour() {
        let summary = |ts: &str| DailySummary {
            news: String::new(),
            trends: String::new(),
            finance: String::new(),
            overall: String::new(),
            timestamp: ts.to_string(),
            language: None,
            country: None,
            automated: true,
            market_open: true,
        };
        assert!(written_by_evening_run(&summary("2024-06-01T23:04:12-04:00")));
        assert!(written_by_evening_run(&summary("2024-06-01T23:59:59Z")));
        assert!(!written_by_evening_run(&summary("2024-06-01T14:00:00-04:00")));
        assert!(!written_by_evening_run(&summary("not a timestamp")));
    }

    #[test]
    fn next_trigger_lands_in_the_evening_block() {
        let region = RegionConfig::default();
        let (at, _primary) = next_trigger_after(&region).expect("trigger within two days");
        assert!(at > region.now());
        assert_eq!(at.hour(), 23);
        assert!([0, 5, 30, 59].contains(&at.minute()));
    }

    #[tokio::test]
    async fn manual_trigger_refuses_while_running() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicU8::new(0));
        let scheduler = scheduler_with(true, calls.clone(), 0, &dir);

        scheduler.generating.store(true, Ordering::SeqCst);
        assert_eq!(
            Arc::clone(&scheduler).trigger_manual(),
            TriggerOutcome::AlreadyRunning
        );
        scheduler.generating.store(false, Ordering::SeqCst);
    }
}
