// src/config.rs
//! Runtime configuration: defaults, then an optional TOML file, then
//! environment variables.
//!
//! File lookup:
//! 1) $TRACKER_CONFIG_PATH (must exist)
//! 2) config/tracker.toml (optional)

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::engine::EngineOptions;
use crate::retrieval::newsapi::DEFAULT_BASE_URL;

pub const ENV_CONFIG_PATH: &str = "TRACKER_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/tracker.toml";

const DEFAULT_POLL_INTERVAL_SECS: u64 = 15 * 60;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_CYCLE_CONCURRENCY: usize = 4;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub news_api_key: Option<String>,
    pub news_api_base_url: String,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub delivery_timeout: Duration,
    pub cycle_concurrency: usize,
    /// Serve placeholder articles when retrieval fails.
    pub retrieval_fallback: bool,
    pub bind_addr: String,
    pub webhook_url: Option<String>,
    pub webhook_subjects: Vec<String>,
    /// Extra single-word query expansions.
    pub expansions: BTreeMap<String, String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            news_api_key: None,
            news_api_base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            delivery_timeout: Duration::from_millis(DEFAULT_DELIVERY_TIMEOUT_MS),
            cycle_concurrency: DEFAULT_CYCLE_CONCURRENCY,
            retrieval_fallback: true,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            webhook_url: None,
            webhook_subjects: Vec::new(),
            expansions: BTreeMap::new(),
        }
    }
}

/// On-disk shape; every key optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    news_api_key: Option<String>,
    news_api_base_url: Option<String>,
    poll_interval_secs: Option<u64>,
    fetch_timeout_secs: Option<u64>,
    delivery_timeout_ms: Option<u64>,
    cycle_concurrency: Option<usize>,
    retrieval_fallback: Option<bool>,
    bind_addr: Option<String>,
    webhook_url: Option<String>,
    #[serde(default)]
    webhook_subjects: Vec<String>,
    #[serde(default)]
    expansions: BTreeMap<String, String>,
}

impl TrackerConfig {
    /// Defaults + config file (if any) + environment.
    pub fn load() -> Result<Self> {
        let mut cfg = match config_path()? {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok())?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Defaults overlaid with one TOML file (no env).
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mut cfg = Self::from_toml_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: FileConfig = toml::from_str(s)?;
        let mut cfg = Self::default();
        if let Some(v) = file.news_api_key {
            cfg.news_api_key = Some(v);
        }
        if let Some(v) = file.news_api_base_url {
            cfg.news_api_base_url = v;
        }
        if let Some(v) = file.poll_interval_secs {
            cfg.poll_interval = Duration::from_secs(v);
        }
        if let Some(v) = file.fetch_timeout_secs {
            cfg.fetch_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.delivery_timeout_ms {
            cfg.delivery_timeout = Duration::from_millis(v);
        }
        if let Some(v) = file.cycle_concurrency {
            cfg.cycle_concurrency = v;
        }
        if let Some(v) = file.retrieval_fallback {
            cfg.retrieval_fallback = v;
        }
        if let Some(v) = file.bind_addr {
            cfg.bind_addr = v;
        }
        cfg.webhook_url = file.webhook_url;
        cfg.webhook_subjects = file.webhook_subjects;
        cfg.expansions = file.expansions;
        Ok(cfg)
    }

    /// Apply overrides from `lookup` (the process env in production).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("NEWS_API_KEY") {
            self.news_api_key = Some(v);
        }
        if let Some(v) = lookup("NEWS_API_BASE_URL") {
            self.news_api_base_url = v;
        }
        if let Some(v) = lookup("POLL_INTERVAL_SECS") {
            self.poll_interval = Duration::from_secs(parse_num("POLL_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = lookup("FETCH_TIMEOUT_SECS") {
            self.fetch_timeout = Duration::from_secs(parse_num("FETCH_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = lookup("DELIVERY_TIMEOUT_MS") {
            self.delivery_timeout = Duration::from_millis(parse_num("DELIVERY_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = lookup("CYCLE_CONCURRENCY") {
            self.cycle_concurrency = parse_num("CYCLE_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("RETRIEVAL_FALLBACK") {
            self.retrieval_fallback = parse_flag(&v);
        }
        if let Some(v) = lookup("BIND_ADDR") {
            self.bind_addr = v;
        } else if let Some(port) = lookup("PORT") {
            let port: u16 = parse_num("PORT", &port)?;
            self.bind_addr = format!("0.0.0.0:{port}");
        }
        if let Some(v) = lookup("ALERT_WEBHOOK_URL") {
            self.webhook_url = Some(v);
        }
        if let Some(v) = lookup("ALERT_WEBHOOK_SUBJECTS") {
            self.webhook_subjects = v.split(',').map(str::to_string).collect();
        }
        Ok(())
    }

    /// Replace unusable values with defaults and drop blanks.
    fn sanitize(&mut self) {
        let defaults = Self::default();
        self.news_api_key = self
            .news_api_key
            .take()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        if self.news_api_base_url.trim().is_empty() {
            self.news_api_base_url = defaults.news_api_base_url;
        }
        if self.poll_interval.is_zero() {
            self.poll_interval = defaults.poll_interval;
        }
        if self.fetch_timeout.is_zero() {
            self.fetch_timeout = defaults.fetch_timeout;
        }
        if self.delivery_timeout.is_zero() {
            self.delivery_timeout = defaults.delivery_timeout;
        }
        if self.cycle_concurrency == 0 {
            self.cycle_concurrency = defaults.cycle_concurrency;
        }
        self.webhook_url = self
            .webhook_url
            .take()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        self.webhook_subjects = self
            .webhook_subjects
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            fetch_timeout: self.fetch_timeout,
            delivery_timeout: self.delivery_timeout,
            retrieval_fallback: self.retrieval_fallback,
            cycle_concurrency: self.cycle_concurrency,
        }
    }
}

fn config_path() -> Result<Option<PathBuf>> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(Some(pb));
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    Ok(default.exists().then_some(default))
}

fn parse_num<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| anyhow!("{name} must be a non-negative integer, got {raw:?}"))
}

/// Short sha256 prefix of a secret, safe to log.
pub fn key_fingerprint(secret: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(secret.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn parse_flag(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
