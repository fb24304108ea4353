// src/summary/store.rs
//! File-backed store for generated daily summaries.
//!
//! On disk: one JSON document mapping `YYYY-MM-DD` keys to either a list of
//! summaries (current shape, one per locale) or a bare object (legacy shape).
//! Writes go through a temp file and rename. A startup repair sweep drops
//! corrupted keys and entries, always after writing a `.backup` of the
//! original bytes.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, SecondsFormat};
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer as _, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::RegionConfig;
use crate::summary::market_open_on;

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_COUNTRY: &str = "US";

/// Hard cap on summaries stored under a single date key.
const MAX_ENTRIES_PER_DATE: usize = 10;
/// Full-document repair refuses files above this size.
const MAX_REPAIR_BYTES: u64 = 1024 * 1024;
/// Batch size (date keys) for the large-document normalization path.
const REPAIR_BATCH_KEYS: usize = 100;

static DATE_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date key regex"));

pub fn is_valid_date_key(key: &str) -> bool {
    DATE_KEY_RE.is_match(key)
}

/// One persisted summary. `language`/`country` stay optional so legacy
/// entries without them keep their implicit en/US meaning on rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    #[serde(default)]
    pub news: String,
    #[serde(default)]
    pub trends: String,
    #[serde(default)]
    pub finance: String,
    #[serde(default)]
    pub overall: String,
    #[serde(default, alias = "generatedAt")]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default)]
    pub automated: bool,
    #[serde(default)]
    pub market_open: bool,
}

impl DailySummary {
    pub fn language_or_default(&self) -> &str {
        self.language.as_deref().unwrap_or(DEFAULT_LANGUAGE)
    }

    pub fn country_or_default(&self) -> &str {
        self.country.as_deref().unwrap_or(DEFAULT_COUNTRY)
    }

    /// Locale match used by `load`. Entries without explicit locale fields
    /// only match the default (en, US).
    pub fn matches_locale(&self, language: &str, country: &str) -> bool {
        self.language_or_default() == language && self.country_or_default() == country
    }

    pub fn has_data(&self) -> bool {
        !(self.news.is_empty()
            && self.trends.is_empty()
            && self.finance.is_empty()
            && self.overall.is_empty())
    }
}

/// On-disk value under a date key: current list shape or legacy bare object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DateEntry {
    Multiple(Vec<DailySummary>),
    Single(DailySummary),
}

/// Row of the history listing, newest date first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRow {
    pub date: String,
    pub timestamp: String,
    pub market_open: bool,
    pub language: String,
    pub country: String,
    pub has_data: bool,
}

#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub date: String,
    pub language: String,
    pub country: String,
    pub news: String,
    pub trends: String,
    pub finance: String,
    pub overall: String,
    pub automated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved(DailySummary),
    /// Rejected: a summary for this past date and locale already exists.
    /// Carries the stored entry so callers can echo it back.
    DuplicatePast(DailySummary),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub kept_dates: usize,
    pub kept_entries: usize,
    pub dropped_keys: usize,
    pub dropped_entries: usize,
    /// Whole document was unparseable and had to be reset.
    pub reset: bool,
}

impl RepairReport {
    pub fn dropped_total(&self) -> usize {
        self.dropped_keys + self.dropped_entries
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// No document on disk yet.
    MissingFile,
    /// Document exceeds the in-memory repair ceiling; nothing was touched.
    SkippedTooLarge { bytes: u64 },
    Repaired(RepairReport),
    /// Result of the cheaper large-document pass: invalid keys dropped,
    /// entry contents left as-is.
    BatchNormalized { kept_dates: usize, dropped_keys: usize },
}

type StoreDocument = BTreeMap<String, Value>;

/// Store handle. All operations are read-modify-write over the whole file,
/// serialized by an internal mutex; concurrent processes are not coordinated.
#[derive(Debug)]
pub struct SummaryStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SummaryStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        self.path.with_extension("json.backup")
    }

    /// Persist one summary. Past dates are immutable once written: a second
    /// save for an existing `(past date, language, country)` key is rejected.
    /// Today's entry is overwritten unconditionally.
    pub fn save(&self, req: SaveRequest, region: &RegionConfig) -> Result<SaveOutcome> {
        if !is_valid_date_key(&req.date) {
            bail!("invalid date '{}', expected YYYY-MM-DD", req.date);
        }
        let requested = NaiveDate::parse_from_str(&req.date, "%Y-%m-%d")
            .with_context(|| format!("invalid date '{}'", req.date))?;
        let today = region.today();

        let _guard = self.lock.lock().expect("summary store mutex poisoned");
        let mut doc = self.read_document()?;
        let mut entries = doc.get(&req.date).map(entry_summaries).unwrap_or_default();

        let existing = entries
            .iter()
            .position(|s| s.matches_locale(&req.language, &req.country));
        if let Some(idx) = existing {
            if requested != today {
                counter!("store_rejects_total").increment(1);
                debug!(date = %req.date, language = %req.language, country = %req.country,
                    "rejecting save for already-written past date");
                return Ok(SaveOutcome::DuplicatePast(entries[idx].clone()));
            }
        }

        let summary = DailySummary {
            news: req.news,
            trends: req.trends,
            finance: req.finance,
            overall: req.overall,
            timestamp: region.now().to_rfc3339_opts(SecondsFormat::Secs, true),
            language: Some(req.language),
            country: Some(req.country),
            automated: req.automated,
            market_open: market_open_on(requested),
        };
        match existing {
            Some(idx) => entries[idx] = summary.clone(),
            None => entries.push(summary.clone()),
        }
        doc.insert(req.date.clone(), serde_json::to_value(&entries)?);
        self.write_document(&doc)?;
        counter!("store_saves_total").increment(1);
        info!(date = %req.date, language = %summary.language_or_default(),
            country = %summary.country_or_default(), automated = summary.automated,
            "summary saved");
        Ok(SaveOutcome::Saved(summary))
    }

    /// Look up one summary by date and locale. Handles the current list
    /// shape, single objects with explicit locale, and bare legacy objects
    /// (implicit en/US).
    pub fn load(&self, date: &str, language: &str, country: &str) -> Result<Option<DailySummary>> {
        let _guard = self.lock.lock().expect("summary store mutex poisoned");
        let doc = self.read_document()?;
        let Some(value) = doc.get(date) else {
            return Ok(None);
        };
        Ok(entry_summaries(value)
            .into_iter()
            .find(|s| s.matches_locale(language, country)))
    }

    /// Metadata rows for every stored summary, newest date first. Keys that
    /// are not `YYYY-MM-DD` are skipped.
    pub fn list_all(&self) -> Result<Vec<HistoryRow>> {
        let _guard = self.lock.lock().expect("summary store mutex poisoned");
        let doc = self.read_document()?;
        let mut rows = Vec::new();
        for (date, value) in doc.iter().rev() {
            if !is_valid_date_key(date) {
                continue;
            }
            for summary in entry_summaries(value) {
                rows.push(HistoryRow {
                    date: date.clone(),
                    timestamp: summary.timestamp.clone(),
                    market_open: summary.market_open,
                    language: summary.language_or_default().to_string(),
                    country: summary.country_or_default().to_string(),
                    has_data: summary.has_data(),
                });
            }
        }
        Ok(rows)
    }

    /// Full repair sweep: drop invalid date keys, drop entries carrying the
    /// numeric-key corruption signature or failing the typed parse, dedupe by
    /// timestamp+locale, cap entries per date, rewrite normalized. The
    /// original bytes land in `.backup` first. Files above 1MB are refused.
    pub fn repair(&self) -> Result<RepairOutcome> {
        let _guard = self.lock.lock().expect("summary store mutex poisoned");
        let meta = match fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(RepairOutcome::MissingFile)
            }
            Err(e) => {
                return Err(e).with_context(|| format!("stat {}", self.path.display()));
            }
        };
        if meta.len() > MAX_REPAIR_BYTES {
            return Ok(RepairOutcome::SkippedTooLarge { bytes: meta.len() });
        }

        let original = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        fs::write(self.backup_path(), &original)
            .with_context(|| format!("writing {}", self.backup_path().display()))?;

        let mut report = RepairReport::default();
        let parsed: StoreDocument = match serde_json::from_str(&original) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, "summary document unparseable, resetting to empty");
                report.reset = true;
                StoreDocument::new()
            }
        };

        let mut clean = StoreDocument::new();
        for (key, value) in parsed {
            if !is_valid_date_key(&key) {
                warn!(key = %key, "repair: dropping invalid date key");
                report.dropped_keys += 1;
                continue;
            }
            let kept = sanitize_entries(value, &mut report);
            if kept.is_empty() {
                report.dropped_keys += 1;
                continue;
            }
            report.kept_dates += 1;
            report.kept_entries += kept.len();
            clean.insert(key, serde_json::to_value(&kept)?);
        }

        if report.dropped_total() > 0 {
            counter!("repair_dropped_total").increment(report.dropped_total() as u64);
        }
        self.write_document(&clean)?;
        Ok(RepairOutcome::Repaired(report))
    }

    /// Cheaper pass for documents too large for `repair`: date keys are
    /// streamed straight from the reader to the rewrite, one batch at a time,
    /// so the full map is never held in memory. Invalid date keys are dropped
    /// (their values skipped unparsed), entry contents are left untouched.
    /// Backup is a straight file copy.
    pub fn repair_in_batches(&self) -> Result<RepairOutcome> {
        let _guard = self.lock.lock().expect("summary store mutex poisoned");
        if !self.path.exists() {
            return Ok(RepairOutcome::MissingFile);
        }
        fs::copy(&self.path, self.backup_path())
            .with_context(|| format!("backing up {}", self.path.display()))?;

        let file = fs::File::open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        let mut de = serde_json::Deserializer::from_reader(BufReader::new(file));

        let tmp = self.path.with_extension("json.tmp");
        let mut out = BufWriter::new(
            fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?,
        );
        out.write_all(b"{")?;
        let mut filter = StreamingKeyFilter {
            out: &mut out,
            batch: Vec::with_capacity(REPAIR_BATCH_KEYS),
            written: 0,
            dropped: 0,
        };
        let parsed = (&mut de).deserialize_map(&mut filter);
        let (mut kept_dates, mut dropped_keys) = (filter.written, filter.dropped);
        match parsed {
            Ok(()) => {
                out.write_all(b"}")?;
                out.flush()?;
                drop(out);
            }
            Err(e) => {
                warn!(error = %e, "oversized summary document unparseable, resetting to empty");
                drop(out);
                fs::write(&tmp, b"{}").with_context(|| format!("writing {}", tmp.display()))?;
                kept_dates = 0;
                dropped_keys = 0;
            }
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;

        if dropped_keys > 0 {
            counter!("repair_dropped_total").increment(dropped_keys as u64);
        }
        Ok(RepairOutcome::BatchNormalized {
            kept_dates,
            dropped_keys,
        })
    }

    /// One-time startup pass. Never fails the boot: problems are logged and
    /// the server continues with whatever is on disk.
    pub fn startup_sweep(&self) {
        match self.repair() {
            Ok(RepairOutcome::MissingFile) => {
                debug!(path = %self.path.display(), "no summary document yet, skipping repair");
            }
            Ok(RepairOutcome::Repaired(report)) if report.dropped_total() > 0 || report.reset => {
                info!(
                    kept_dates = report.kept_dates,
                    kept_entries = report.kept_entries,
                    dropped_keys = report.dropped_keys,
                    dropped_entries = report.dropped_entries,
                    reset = report.reset,
                    "summary document repaired"
                );
            }
            Ok(RepairOutcome::Repaired(_)) => {
                debug!("summary document clean");
            }
            Ok(RepairOutcome::SkippedTooLarge { bytes }) => {
                warn!(bytes, "summary document over repair ceiling, using batch pass");
                match self.repair_in_batches() {
                    Ok(RepairOutcome::BatchNormalized {
                        kept_dates,
                        dropped_keys,
                    }) => {
                        info!(kept_dates, dropped_keys, "summary document batch normalized");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "batch normalization failed; continuing as-is");
                    }
                }
            }
            Ok(RepairOutcome::BatchNormalized { .. }) => {}
            Err(e) => {
                warn!(error = %e, "summary repair failed; continuing with document as-is");
            }
        }
    }

    fn read_document(&self) -> Result<StoreDocument> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(doc) => Ok(doc),
                Err(e) => {
                    warn!(error = %e, "summary document unparseable, treating as empty");
                    Ok(StoreDocument::new())
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(StoreDocument::new()),
            Err(e) => Err(e).with_context(|| format!("reading {}", self.path.display())),
        }
    }

    fn write_document(&self, doc: &StoreDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(doc)?;
        fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

/// Parse a date key's value into summaries, tolerating both on-disk shapes.
fn entry_summaries(value: &Value) -> Vec<DailySummary> {
    match serde_json::from_value::<DateEntry>(value.clone()) {
        Ok(DateEntry::Multiple(list)) => list,
        Ok(DateEntry::Single(one)) => vec![one],
        Err(_) => Vec::new(),
    }
}

/// Digit-only object keys are the signature of a mangled serialization; such
/// entries are unusable and get dropped whole.
fn has_numeric_key(value: &Value) -> bool {
    value.as_object().is_some_and(|map| {
        map.keys()
            .any(|k| !k.is_empty() && k.bytes().all(|b| b.is_ascii_digit()))
    })
}

fn sanitize_entries(value: Value, report: &mut RepairReport) -> Vec<DailySummary> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(_) => vec![value],
        _ => {
            report.dropped_entries += 1;
            return Vec::new();
        }
    };

    let mut kept: Vec<DailySummary> = Vec::new();
    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    for item in items {
        if has_numeric_key(&item) {
            report.dropped_entries += 1;
            continue;
        }
        let Ok(summary) = serde_json::from_value::<DailySummary>(item) else {
            report.dropped_entries += 1;
            continue;
        };
        let identity = (
            summary.timestamp.clone(),
            summary.language_or_default().to_string(),
            summary.country_or_default().to_string(),
        );
        if !seen.insert(identity) {
            report.dropped_entries += 1;
            continue;
        }
        kept.push(summary);
    }
    if kept.len() > MAX_ENTRIES_PER_DATE {
        report.dropped_entries += kept.len() - MAX_ENTRIES_PER_DATE;
        kept.truncate(MAX_ENTRIES_PER_DATE);
    }
    kept
}

/// Visits an oversized document's top-level map entry by entry: invalid date
/// keys are skipped without materializing their values, kept entries flow to
/// the output writer in fixed-size batches.
struct StreamingKeyFilter<'w> {
    out: &'w mut BufWriter<fs::File>,
    batch: Vec<(String, Value)>,
    written: usize,
    dropped: usize,
}

impl<'de> Visitor<'de> for &mut StreamingKeyFilter<'_> {
    type Value = ();

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a map of date keys")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        while let Some(key) = map.next_key::<String>()? {
            if !is_valid_date_key(&key) {
                map.next_value::<IgnoredAny>()?;
                warn!(key = %key, "batch repair: dropping invalid date key");
                self.dropped += 1;
                continue;
            }
            let value: Value = map.next_value()?;
            self.batch.push((key, value));
            if self.batch.len() >= REPAIR_BATCH_KEYS {
                flush_batch(self.out, &mut self.batch, &mut self.written)
                    .map_err(serde::de::Error::custom)?;
            }
        }
        flush_batch(self.out, &mut self.batch, &mut self.written)
            .map_err(serde::de::Error::custom)?;
        Ok(())
    }
}

fn flush_batch(
    out: &mut BufWriter<fs::File>,
    batch: &mut Vec<(String, Value)>,
    written: &mut usize,
) -> Result<()> {
    for (key, value) in batch.drain(..) {
        if *written > 0 {
            out.write_all(b",")?;
        }
        serde_json::to_writer(&mut *out, &key)?;
        out.write_all(b":")?;
        serde_json::to_writer(&mut *out, &value)?;
        *written += 1;
    }
    out.flush()?;
    Ok(())
}
