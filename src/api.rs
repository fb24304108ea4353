// src/api.rs
//! HTTP surface: summary read/write endpoints, admin trigger and status,
//! cached feed proxies, static dashboard assets.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::warn;

use crate::admin::{AdminDecision, AdminGate};
use crate::cache::FeedCache;
use crate::config::{AppConfig, RegionConfig};
use crate::fetch::finance::BulkQuoteProvider;
use crate::fetch::news::NewsApiProvider;
use crate::fetch::trends::DailyTrendsProvider;
use crate::fetch::types::{NewsSource, QuoteSource, TrendsSource};
use crate::summary::scheduler::{SummaryScheduler, TriggerOutcome};
use crate::summary::store::{DailySummary, HistoryRow, SaveOutcome, SaveRequest, SummaryStore};

/// Feed sources used by the proxy endpoints, separate from the scheduler's
/// own set so tests can swap either independently.
pub struct FeedProviders {
    pub news: Box<dyn NewsSource>,
    pub trends: Box<dyn TrendsSource>,
    pub quotes: Box<dyn QuoteSource>,
}

impl FeedProviders {
    pub fn from_env() -> Self {
        Self {
            news: Box::new(NewsApiProvider::from_env()),
            trends: Box::new(DailyTrendsProvider::new()),
            quotes: Box::new(BulkQuoteProvider::new()),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<SummaryStore>,
    pub scheduler: Arc<SummaryScheduler>,
    pub gate: Arc<AdminGate>,
    pub cache: Arc<FeedCache>,
    pub feeds: Arc<FeedProviders>,
}

impl AppState {
    /// Wire the live stack for `config`.
    pub fn from_config(config: AppConfig) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(SummaryStore::new(config.summaries_path()));
        let scheduler = Arc::new(SummaryScheduler::from_env(
            Arc::clone(&store),
            config.region.clone(),
        ));
        let gate = Arc::new(AdminGate::new(config.admin.allowed_ips.clone()));
        let cache = Arc::new(FeedCache::from_env());
        let feeds = Arc::new(FeedProviders::from_env());
        Self {
            config,
            store,
            scheduler,
            gate,
            cache,
            feeds,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/summary/save", post(save_summary))
        .route("/api/summary/daily", get(daily_summary))
        .route("/api/summary/history", get(summary_history))
        .route("/api/summary/trigger-automated", post(trigger_automated))
        .route("/api/summary/automation-status", get(automation_status))
        .route("/api/feeds/news", get(feed_news))
        .route("/api/feeds/trends", get(feed_trends))
        .route("/api/feeds/quotes", get(feed_quotes))
        .fallback_service(ServeDir::new("public"))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// ---------------------------------------------------------------- summaries

#[derive(Debug, Deserialize)]
struct SaveBody {
    #[serde(default)]
    news: String,
    #[serde(default)]
    trends: String,
    #[serde(default)]
    finance: String,
    #[serde(default)]
    overall: String,
    date: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Serialize)]
struct SaveResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<DailySummary>,
}

async fn save_summary(
    State(state): State<AppState>,
    Json(body): Json<SaveBody>,
) -> impl IntoResponse {
    let region = &state.config.region;
    let request = SaveRequest {
        date: body.date,
        language: locale_or(&body.language, &region.language),
        country: locale_or(&body.country, &region.country),
        news: body.news,
        trends: body.trends,
        finance: body.finance,
        overall: body.overall,
        automated: false,
    };
    match state.store.save(request, region) {
        Ok(SaveOutcome::Saved(summary)) => (
            StatusCode::OK,
            Json(SaveResponse {
                success: true,
                message: "Summary saved.".to_string(),
                summary: Some(summary),
            }),
        ),
        Ok(SaveOutcome::DuplicatePast(existing)) => (
            StatusCode::CONFLICT,
            Json(SaveResponse {
                success: false,
                message: "A summary for this past date already exists.".to_string(),
                summary: Some(existing),
            }),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(SaveResponse {
                success: false,
                message: e.to_string(),
                summary: None,
            }),
        ),
    }
}

#[derive(Debug, Deserialize)]
struct DailyQuery {
    date: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Serialize)]
struct DailyResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<DailySummary>,
    date: String,
    language: String,
    country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

async fn daily_summary(
    State(state): State<AppState>,
    Query(query): Query<DailyQuery>,
) -> impl IntoResponse {
    let region = &state.config.region;
    let language = locale_or(&query.language, &region.language);
    let country = locale_or(&query.country, &region.country);
    match state.store.load(&query.date, &language, &country) {
        Ok(Some(summary)) => (
            StatusCode::OK,
            Json(DailyResponse {
                success: true,
                summary: Some(summary),
                date: query.date,
                language,
                country,
                message: None,
            }),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(DailyResponse {
                success: false,
                summary: None,
                date: query.date,
                language,
                country,
                message: Some("No summary for this date.".to_string()),
            }),
        ),
        Err(e) => {
            warn!(error = %e, "summary lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(DailyResponse {
                    success: false,
                    summary: None,
                    date: query.date,
                    language,
                    country,
                    message: Some("Summary lookup failed.".to_string()),
                }),
            )
        }
    }
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    success: bool,
    summaries: Vec<HistoryRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

async fn summary_history(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_all() {
        Ok(summaries) => (
            StatusCode::OK,
            Json(HistoryResponse {
                success: true,
                summaries,
                message: None,
            }),
        ),
        Err(e) => {
            warn!(error = %e, "history listing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(HistoryResponse {
                    success: false,
                    summaries: Vec::new(),
                    message: Some("History listing failed.".to_string()),
                }),
            )
        }
    }
}

// -------------------------------------------------------------------- admin

#[derive(Debug, Serialize)]
struct StatusResponse {
    success: bool,
    message: String,
}

async fn trigger_automated(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let ip = client_ip(&headers, addr);
    match state.gate.check_trigger(&ip) {
        AdminDecision::Forbidden => (
            StatusCode::FORBIDDEN,
            Json(StatusResponse {
                success: false,
                message: "Forbidden.".to_string(),
            }),
        ),
        AdminDecision::RateLimited { retry_after_secs } => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(StatusResponse {
                success: false,
                message: format!("Already triggered today, retry in {retry_after_secs}s."),
            }),
        ),
        AdminDecision::Allowed => match Arc::clone(&state.scheduler).trigger_manual() {
            TriggerOutcome::Started => (
                StatusCode::OK,
                Json(StatusResponse {
                    success: true,
                    message: "Summary generation started.".to_string(),
                }),
            ),
            TriggerOutcome::AlreadyRunning => {
                // The allowance paid for a run that never started.
                state.gate.refund_trigger(&ip);
                (
                    StatusCode::CONFLICT,
                    Json(StatusResponse {
                        success: false,
                        message: "A generation run is already in progress.".to_string(),
                    }),
                )
            }
        },
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AutomationStatus {
    success: bool,
    is_generating: bool,
    last_generation_date: Option<String>,
    configured_regions: Vec<RegionConfig>,
}

async fn automation_status(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let ip = client_ip(&headers, addr);
    if !state.gate.check_ip(&ip) {
        return (
            StatusCode::FORBIDDEN,
            Json(StatusResponse {
                success: false,
                message: "Forbidden.".to_string(),
            }),
        )
            .into_response();
    }
    Json(AutomationStatus {
        success: true,
        is_generating: state.scheduler.is_generating(),
        last_generation_date: state.scheduler.last_generation_date(),
        configured_regions: vec![state.config.region.clone()],
    })
    .into_response()
}

// -------------------------------------------------------------- feed proxies

#[derive(Debug, Clone, Copy)]
enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

fn feed_response(status: StatusCode, payload: Value, cache: CacheStatus) -> Response {
    let mut resp = (status, Json(payload)).into_response();
    resp.headers_mut()
        .insert("x-feed-cache", HeaderValue::from_static(cache.as_str()));
    resp
}

async fn feed_news(State(state): State<AppState>) -> Response {
    let key = format!("news:{}", state.config.region.country);
    if let Some(cached) = state.cache.get(&key) {
        return feed_response(StatusCode::OK, cached, CacheStatus::Hit);
    }
    match state.feeds.news.top_headlines(&state.config.region).await {
        Ok(headlines) => {
            let payload = json!({ "success": true, "headlines": headlines });
            state.cache.put(&key, payload.clone());
            feed_response(StatusCode::OK, payload, CacheStatus::Miss)
        }
        Err(e) => {
            warn!(error = %e, "news feed fetch failed");
            feed_response(
                StatusCode::BAD_GATEWAY,
                json!({ "success": false, "message": "News feed unavailable." }),
                CacheStatus::Miss,
            )
        }
    }
}

async fn feed_trends(State(state): State<AppState>) -> Response {
    let key = format!("trends:{}", state.config.region.country);
    if let Some(cached) = state.cache.get(&key) {
        return feed_response(StatusCode::OK, cached, CacheStatus::Hit);
    }
    match state.feeds.trends.daily_trends(&state.config.region).await {
        Ok(trends) => {
            let payload = json!({ "success": true, "trends": trends });
            state.cache.put(&key, payload.clone());
            feed_response(StatusCode::OK, payload, CacheStatus::Miss)
        }
        Err(e) => {
            warn!(error = %e, "trends feed fetch failed");
            feed_response(
                StatusCode::BAD_GATEWAY,
                json!({ "success": false, "message": "Trends feed unavailable." }),
                CacheStatus::Miss,
            )
        }
    }
}

async fn feed_quotes(State(state): State<AppState>) -> Response {
    let key = "quotes".to_string();
    if let Some(cached) = state.cache.get(&key) {
        return feed_response(StatusCode::OK, cached, CacheStatus::Hit);
    }
    match state.feeds.quotes.quote_board().await {
        Ok(board) => {
            let payload = json!({ "success": true, "quotes": board });
            state.cache.put(&key, payload.clone());
            feed_response(StatusCode::OK, payload, CacheStatus::Miss)
        }
        Err(e) => {
            warn!(error = %e, "quote fetch failed");
            feed_response(
                StatusCode::BAD_GATEWAY,
                json!({ "success": false, "message": "Quotes unavailable." }),
                CacheStatus::Miss,
            )
        }
    }
}

// ------------------------------------------------------------------ helpers

fn locale_or(supplied: &Option<String>, fallback: &str) -> String {
    match supplied.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => fallback.to_string(),
    }
}

/// Peer address, or the first `X-Forwarded-For` hop when explicitly told the
/// app sits behind a trusted proxy.
fn client_ip(headers: &HeaderMap, addr: SocketAddr) -> String {
    if trust_proxy() {
        if let Some(first) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
        {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    addr.ip().to_string()
}

fn trust_proxy() -> bool {
    std::env::var("DASHBOARD_TRUST_PROXY")
        .ok()
        .is_some_and(|v| v == "1")
}
