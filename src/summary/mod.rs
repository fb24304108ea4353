// src/summary/mod.rs
//! Daily summary pipeline: collect section data, ask the model for prose,
//! split the reply into sections, persist keyed by date and locale.

pub mod collector;
pub mod generator;
pub mod parser;
pub mod scheduler;
pub mod store;

use chrono::{Datelike, NaiveDate, Weekday};

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Equity market calendar approximation: weekdays count as open, exchange
/// holidays are not tracked.
pub fn market_open_on(date: NaiveDate) -> bool {
    !is_weekend(date)
}
