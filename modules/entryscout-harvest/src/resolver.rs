//! Search term → canonical topic URL and its last page.

use std::sync::LazyLock;

use entryscout_common::{HarvestConfig, ResourceLocator};
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use crate::extractor::{ENTRY_ITEMS, LAST_PAGE_LINK, PAGER};
use crate::session::BrowserSession;
use crate::walker::page_url;

static PAGE_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]p=(\d+)").expect("valid regex"));

static LAST_PAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(LAST_PAGE_LINK).expect("valid selector"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(ResourceLocator),
    NotFound(NotFoundReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFoundReason {
    /// The term has no characters left after slugging.
    EmptySlug,
    /// The topic URL could not be loaded at all.
    Navigation(String),
    /// The page loaded but shows no entries.
    NoEntries,
}

impl std::fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotFoundReason::EmptySlug => write!(f, "search term is empty after slugging"),
            NotFoundReason::Navigation(e) => write!(f, "navigation failed: {e}"),
            NotFoundReason::NoEntries => write!(f, "no entries on topic page"),
        }
    }
}

/// Forum slug for a search term: Turkish letters folded to ASCII, spaces to
/// hyphens, `.` and `,` dropped.
pub fn slugify(term: &str) -> String {
    term.to_lowercase()
        .chars()
        .filter_map(|c| match c {
            'ı' => Some('i'),
            'ğ' => Some('g'),
            'ü' => Some('u'),
            'ş' => Some('s'),
            'ö' => Some('o'),
            'ç' => Some('c'),
            ' ' => Some('-'),
            // Lowercasing 'İ' leaves a combining dot above.
            '\u{0307}' | '.' | ',' => None,
            other => Some(other),
        })
        .collect()
}

pub fn topic_url(base_url: &str, slug: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), slug)
}

/// Page number carried by a pager href such as `/akbank--31337?p=12`.
pub fn last_page_from_href(href: &str) -> Option<u32> {
    PAGE_PARAM
        .captures(href)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Highest page index advertised by the pager, if any.
pub fn find_last_page(html: &str) -> Option<u32> {
    let document = Html::parse_document(html);
    document
        .select(&LAST_PAGE)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(last_page_from_href)
}

/// Resolve `term` to a topic. Never fails: every problem becomes a
/// [`Resolution::NotFound`] or a single-page fallback.
///
/// On a multi-page topic the session is left positioned on the last page.
pub async fn resolve(session: &mut BrowserSession, term: &str, config: &HarvestConfig) -> Resolution {
    let slug = slugify(term.trim());
    if slug.is_empty() {
        return Resolution::NotFound(NotFoundReason::EmptySlug);
    }

    let url = topic_url(&config.base_url, &slug);
    let timeouts = &config.timeouts;

    if let Err(e) = session.goto(&url, timeouts.navigation).await {
        warn!(url = url.as_str(), error = %e, "Topic navigation failed");
        return Resolution::NotFound(NotFoundReason::Navigation(e.to_string()));
    }
    if let Err(e) = session.wait_for_selector(ENTRY_ITEMS, timeouts.selector).await {
        info!(term, url = url.as_str(), error = %e, "No entries for search term");
        return Resolution::NotFound(NotFoundReason::NoEntries);
    }

    let canonical = match session.current_url() {
        Some(u) => u.to_string(),
        None => return Resolution::NotFound(NotFoundReason::NoEntries),
    };

    let last_page = match session.wait_for_selector(PAGER, timeouts.pager_probe).await {
        Ok(()) => session.html().and_then(find_last_page),
        Err(_) => None,
    };

    let n = match last_page {
        Some(n) if n > 1 => n,
        _ => {
            debug!(canonical = canonical.as_str(), "Single-page topic");
            return Resolution::Found(ResourceLocator::single_page(canonical));
        }
    };

    let last_url = page_url(&canonical, n);
    let positioned = match session.goto(&last_url, timeouts.navigation).await {
        Ok(()) => session
            .wait_for_selector(ENTRY_ITEMS, timeouts.content_ready)
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    match positioned {
        Ok(()) => {
            debug!(canonical = canonical.as_str(), last_page = n, "Resolved topic");
            Resolution::Found(ResourceLocator::new(canonical, n))
        }
        Err(error) => {
            warn!(url = last_url.as_str(), error = error.as_str(), "Last page unavailable, using page 1");
            Resolution::Found(ResourceLocator::single_page(canonical))
        }
    }
}
