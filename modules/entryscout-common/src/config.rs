use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;

use crate::error::{HarvestError, Result};

const DEFAULT_BASE_URL: &str = "https://eksisozluk.com";
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:91.0) Gecko/20100101 Firefox/91.0";
const DEFAULT_SOURCE_ZONE: Tz = chrono_tz::Europe::Istanbul;
/// Upper bound on any single wait.
const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

/// Bounds for every wait the harvester performs. None of them is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Upper bound on a single page navigation.
    pub navigation: Duration,
    /// Fixed settle delay the renderer applies after DOMContentLoaded.
    pub settle: Duration,
    /// Wait for the entry list on pages already known to exist (last page, walked pages).
    pub content_ready: Duration,
    /// Wait for the entry list when probing whether a topic exists at all.
    pub selector: Duration,
    /// Soft probe for the pagination control.
    pub pager_probe: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(40),
            settle: Duration::from_millis(200),
            content_ready: Duration::from_secs(10),
            selector: Duration::from_secs(8),
            pager_probe: Duration::from_secs(3),
        }
    }
}

/// Run-scoped harvesting configuration, passed into the scheduler at construction.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Forum root; topic slugs are appended to it.
    pub base_url: String,
    /// Identifying signature every browsing session presents.
    pub user_agent: String,
    pub timeouts: Timeouts,
    /// Cap on records per subject.
    pub records_per_subject: usize,
    /// Subjects whose sessions may be open at the same time.
    pub workers: usize,
    /// Pause between consecutive page requests within a subject.
    pub page_delay: Duration,
    /// Pause between the start of consecutive subject tasks.
    pub subject_delay: Duration,
    /// Zone the forum renders its timestamps in.
    pub source_zone: Tz,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeouts: Timeouts::default(),
            records_per_subject: 5,
            workers: 3,
            page_delay: Duration::from_millis(500),
            subject_delay: Duration::from_secs(1),
            source_zone: DEFAULT_SOURCE_ZONE,
        }
    }
}

impl HarvestConfig {
    /// Load overrides from the environment (and `.env`), falling back to defaults.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset keys keep their defaults;
    /// set but unparsable keys are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let source_zone = match get("SOURCE_TIMEZONE") {
            None => defaults.source_zone,
            Some(name) => name.trim().parse::<Tz>().map_err(|_| {
                HarvestError::Config(format!("SOURCE_TIMEZONE is not a known zone: {name:?}"))
            })?,
        };

        let config = Self {
            base_url: get("FORUM_BASE_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            user_agent: get("HARVEST_USER_AGENT").unwrap_or(defaults.user_agent),
            timeouts: Timeouts {
                navigation: millis_or(&get, "NAVIGATION_TIMEOUT_MS", defaults.timeouts.navigation)?,
                settle: millis_or(&get, "SETTLE_TIMEOUT_MS", defaults.timeouts.settle)?,
                content_ready: millis_or(&get, "CONTENT_READY_TIMEOUT_MS", defaults.timeouts.content_ready)?,
                selector: millis_or(&get, "SELECTOR_TIMEOUT_MS", defaults.timeouts.selector)?,
                pager_probe: millis_or(&get, "PAGER_PROBE_TIMEOUT_MS", defaults.timeouts.pager_probe)?,
            },
            records_per_subject: parse_or(&get, "RECORDS_PER_SUBJECT", defaults.records_per_subject)?,
            workers: parse_or(&get, "HARVEST_WORKERS", defaults.workers)?,
            page_delay: millis_or(&get, "PAGE_DELAY_MS", defaults.page_delay)?,
            subject_delay: millis_or(&get, "SUBJECT_DELAY_MS", defaults.subject_delay)?,
            source_zone,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(HarvestError::Config("HARVEST_WORKERS must be at least 1".into()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(HarvestError::Config(format!(
                "FORUM_BASE_URL must be an http(s) URL, got {}",
                self.base_url
            )));
        }
        let t = &self.timeouts;
        for (key, value) in [
            ("NAVIGATION_TIMEOUT_MS", t.navigation),
            ("SETTLE_TIMEOUT_MS", t.settle),
            ("CONTENT_READY_TIMEOUT_MS", t.content_ready),
            ("SELECTOR_TIMEOUT_MS", t.selector),
            ("PAGER_PROBE_TIMEOUT_MS", t.pager_probe),
        ] {
            if value > MAX_TIMEOUT {
                return Err(HarvestError::Config(format!(
                    "{key} must be at most {} ms, got {}",
                    MAX_TIMEOUT.as_millis(),
                    value.as_millis()
                )));
            }
        }
        Ok(())
    }

    pub fn log_summary(&self) {
        tracing::info!("Harvest config:");
        tracing::info!("  base_url: {}", self.base_url);
        tracing::info!("  records_per_subject: {}", self.records_per_subject);
        tracing::info!("  workers: {}", self.workers);
        tracing::info!(
            "  timeouts (ms): navigation={} settle={} content_ready={} selector={} pager_probe={}",
            self.timeouts.navigation.as_millis(),
            self.timeouts.settle.as_millis(),
            self.timeouts.content_ready.as_millis(),
            self.timeouts.selector.as_millis(),
            self.timeouts.pager_probe.as_millis(),
        );
        tracing::info!(
            "  pacing (ms): page={} subject={}",
            self.page_delay.as_millis(),
            self.subject_delay.as_millis()
        );
        tracing::info!("  source_zone: {}", self.source_zone);
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| HarvestError::Config(format!("{key} must be a number, got {raw:?}"))),
    }
}

fn millis_or<G>(get: &G, key: &str, default: Duration) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_or(get, key, default_ms).map(Duration::from_millis)
}
