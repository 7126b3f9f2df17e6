//! Backward walk over a topic's pages, newest first.

use chrono::{DateTime, Utc};
use entryscout_common::{HarvestConfig, Record, ResourceLocator, Subject};
use tracing::{debug, info};

use crate::extractor::{extract_page, PageContext, ENTRY_LIST};
use crate::session::BrowserSession;

/// URL of page `n` of a topic. Page 1 is the canonical URL itself.
pub fn page_url(canonical: &str, n: u32) -> String {
    if n <= 1 {
        return canonical.to_string();
    }
    let sep = if canonical.contains('?') { '&' } else { '?' };
    format!("{canonical}{sep}p={n}")
}

pub struct WalkRequest<'a> {
    pub subject: &'a Subject,
    pub search_term: &'a str,
    pub locator: &'a ResourceLocator,
    /// Records still wanted from this topic.
    pub limit: usize,
    /// Stamped on every record of the subject run.
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Collected `limit` records.
    LimitReached,
    /// A page loaded but held no entries.
    Exhausted { page: u32 },
    /// A page could not be loaded; earlier records are kept.
    PageLoadFailed { page: u32, error: String },
    /// Walked through page 1 without reaching the limit.
    FirstPageDone,
}

#[derive(Debug)]
pub struct WalkOutcome {
    pub records: Vec<Record>,
    pub pages_visited: u32,
    pub stop: StopReason,
}

/// Collect up to `request.limit` records, starting at the locator's last page
/// and moving towards page 1. Records come out newest first.
pub async fn walk(
    session: &mut BrowserSession,
    request: &WalkRequest<'_>,
    config: &HarvestConfig,
) -> WalkOutcome {
    let canonical = request.locator.canonical_url.as_str();
    let mut records: Vec<Record> = Vec::with_capacity(request.limit);
    let mut pages_visited = 0;
    let mut page = request.locator.last_page();

    if request.limit == 0 {
        return WalkOutcome {
            records,
            pages_visited,
            stop: StopReason::LimitReached,
        };
    }

    let stop = loop {
        let url = page_url(canonical, page);

        if session.current_url() != Some(url.as_str()) {
            if let Err(e) = session.goto(&url, config.timeouts.navigation).await {
                break StopReason::PageLoadFailed {
                    page,
                    error: e.to_string(),
                };
            }
        }
        if let Err(e) = session
            .wait_for_selector(ENTRY_LIST, config.timeouts.content_ready)
            .await
        {
            break StopReason::PageLoadFailed {
                page,
                error: e.to_string(),
            };
        }
        pages_visited += 1;

        let reference = Utc::now().with_timezone(&config.source_zone);
        let ctx = PageContext {
            subject: request.subject,
            search_term: request.search_term,
            page_url: &url,
            page,
            fetched_at: request.fetched_at,
            reference,
        };
        let extraction = extract_page(
            session.html().unwrap_or_default(),
            &ctx,
            request.limit - records.len(),
        );
        debug!(
            url = url.as_str(),
            page,
            items = extraction.items_seen,
            kept = extraction.records.len(),
            skipped = extraction.skipped,
            "Walked page"
        );

        if extraction.items_seen == 0 {
            break StopReason::Exhausted { page };
        }
        records.extend(extraction.records);

        if records.len() >= request.limit {
            break StopReason::LimitReached;
        }
        if page <= 1 {
            break StopReason::FirstPageDone;
        }
        page -= 1;

        if !config.page_delay.is_zero() {
            tokio::time::sleep(config.page_delay).await;
        }
    };

    if let StopReason::PageLoadFailed { page, error } = &stop {
        info!(
            subject = request.subject.id.as_str(),
            page,
            error = error.as_str(),
            kept = records.len(),
            "Stopping walk on page load failure"
        );
    }

    WalkOutcome {
        records,
        pages_visited,
        stop,
    }
}
