// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod admin;
pub mod api;
pub mod cache;
pub mod config;
pub mod fetch;
pub mod metrics;
pub mod summary;

pub use crate::api::{create_router, AppState};
