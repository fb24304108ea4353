// src/config.rs
//! Boot-time configuration: region (language/country/timezone), admin
//! allow-list, storage layout, listen port. Loaded from TOML with an env
//! override for the path; secrets (API keys) stay in the environment.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_PATH: &str = "DASHBOARD_CONFIG_PATH";
pub const ENV_DEPLOY_ENV: &str = "DASHBOARD_ENV";
const DEFAULT_CONFIG_PATH: &str = "config/dashboard.toml";

/// Locale a generated summary targets. Fixed to one region per deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    pub language: String,
    pub country: String,
    /// IANA timezone name, e.g. "America/New_York".
    pub timezone: String,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            country: "US".to_string(),
            timezone: "America/New_York".to_string(),
        }
    }
}

impl RegionConfig {
    /// Parsed timezone; malformed names fall back to America/New_York.
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone
            .parse()
            .unwrap_or(chrono_tz::America::New_York)
    }

    pub fn now(&self) -> DateTime<chrono_tz::Tz> {
        Utc::now().with_timezone(&self.tz())
    }

    /// Calendar date "today" as seen from the region's clock.
    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Clients allowed to hit the trigger/status endpoints.
    #[serde(default = "default_allowed_ips")]
    pub allowed_ips: Vec<String>,
}

fn default_allowed_ips() -> Vec<String> {
    vec!["127.0.0.1".to_string()]
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            allowed_ips: default_allowed_ips(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub region: RegionConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl AppConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Load using env var + fallbacks:
    /// 1) $DASHBOARD_CONFIG_PATH (must exist if set)
    /// 2) config/dashboard.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            anyhow::bail!("{ENV_CONFIG_PATH} points to non-existent path");
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        Ok(Self::default())
    }

    /// Where the summary document lives for the current deployment
    /// environment: `<data_dir>/<production|local>/daily_summaries.json`.
    pub fn summaries_path(&self) -> PathBuf {
        self.storage
            .data_dir
            .join(deploy_env())
            .join("daily_summaries.json")
    }
}

/// Deployment environment name; anything other than "production" is treated
/// as "local".
pub fn deploy_env() -> &'static str {
    match std::env::var(ENV_DEPLOY_ENV)
        .unwrap_or_default()
        .to_ascii_lowercase()
        .as_str()
    {
        "production" | "prod" => "production",
        _ => "local",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.region.language, "en");
        assert_eq!(cfg.region.country, "US");
        assert_eq!(cfg.region.tz(), chrono_tz::America::New_York);
        assert_eq!(cfg.admin.allowed_ips, vec!["127.0.0.1".to_string()]);
        assert_eq!(cfg.server.port, 8000);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [region]
            language = "de"
            country = "DE"
            timezone = "Europe/Berlin"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.region.country, "DE");
        assert_eq!(cfg.region.tz(), chrono_tz::Europe::Berlin);
        // untouched sections come from defaults
        assert_eq!(cfg.storage.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn bad_timezone_falls_back() {
        let region = RegionConfig {
            timezone: "Not/AZone".into(),
            ..RegionConfig::default()
        };
        assert_eq!(region.tz(), chrono_tz::America::New_York);
    }

    #[serial_test::serial]
    #[test]
    fn env_path_wins_over_default_file() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("dash.toml");
        std::fs::write(&p, "[server]\nport = 9999\n").unwrap();

        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        let cfg = AppConfig::load_default().unwrap();
        assert_eq!(cfg.server.port, 9999);
        env::remove_var(ENV_CONFIG_PATH);
    }

    #[serial_test::serial]
    #[test]
    fn deploy_env_defaults_to_local() {
        env::remove_var(ENV_DEPLOY_ENV);
        assert_eq!(deploy_env(), "local");
        env::set_var(ENV_DEPLOY_ENV, "Production");
        assert_eq!(deploy_env(), "production");
        env::remove_var(ENV_DEPLOY_ENV);
    }

    #[test]
    fn summaries_path_includes_environment() {
        let cfg = AppConfig::default();
        let p = cfg.summaries_path();
        let s = p.display().to_string();
        assert!(s.ends_with("daily_summaries.json"), "{s}");
        assert!(s.contains("local") || s.contains("production"), "{s}");
    }
}
