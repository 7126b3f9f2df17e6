// Test doubles for the harvester.
//
// - MockRenderer (PageRenderer): HashMap-based URL→HTML with redirects,
//   failures, hangs and panics, plus session bookkeeping.
// - Forum markup builders: entries, topic pages, whole multi-page topics.
// - Fixture subjects and a config with zero pacing and short timeouts.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use entryscout_common::{HarvestConfig, Subject, Timeouts};

use crate::session::{PageRenderer, RenderError, RenderRequest, RenderedPage, SessionId};

/// What an unknown topic renders as: a normal page with no entry list.
pub const NOT_FOUND_HTML: &str =
    "<html><body><h1>böyle bir şey yok</h1><p>aradığınız başlık bulunamadı.</p></body></html>";

// ---------------------------------------------------------------------------
// MockRenderer
// ---------------------------------------------------------------------------

/// Builder pattern: `.on_page()`, `.redirect()`, `.fail()`, `.hang()`, `.panic_on()`.
/// Unregistered URLs render [`NOT_FOUND_HTML`].
pub struct MockRenderer {
    pages: HashMap<String, String>,
    redirects: HashMap<String, String>,
    failures: HashSet<String>,
    hangs: HashSet<String>,
    panics: HashSet<String>,
    latency: Duration,
    requests: Mutex<Vec<RenderRequest>>,
    open: AtomicUsize,
    max_open: AtomicUsize,
    opened: AtomicUsize,
    closed: Mutex<Vec<SessionId>>,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            redirects: HashMap::new(),
            failures: HashSet::new(),
            hangs: HashSet::new(),
            panics: HashSet::new(),
            latency: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            open: AtomicUsize::new(0),
            max_open: AtomicUsize::new(0),
            opened: AtomicUsize::new(0),
            closed: Mutex::new(Vec::new()),
        }
    }

    pub fn on_page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), html.into());
        self
    }

    pub fn redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(from.to_string(), to.to_string());
        self
    }

    /// Rendering `url` returns an error.
    pub fn fail(mut self, url: &str) -> Self {
        self.failures.insert(url.to_string());
        self
    }

    /// Rendering `url` never completes; the caller's timeout has to fire.
    pub fn hang(mut self, url: &str) -> Self {
        self.hangs.insert(url.to_string());
        self
    }

    /// Rendering `url` panics inside the calling task.
    pub fn panic_on(mut self, url: &str) -> Self {
        self.panics.insert(url.to_string());
        self
    }

    /// Every render sleeps this long first, so concurrent sessions overlap.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Register a whole topic: `{base}/{slug}` redirects to `canonical`, which
    /// serves page 1; `canonical?p=N` serves page N. Multi-page topics get a
    /// pager with a last-page link on every page.
    pub fn on_topic(mut self, base_url: &str, slug: &str, canonical: &str, pages: &[Vec<MockEntry>]) -> Self {
        let last = pages.len() as u32;
        let entry_url = format!("{base_url}/{slug}");
        if entry_url != canonical {
            self = self.redirect(&entry_url, canonical);
        }
        let path = canonical
            .strip_prefix(base_url)
            .unwrap_or(canonical)
            .to_string();
        for (idx, entries) in pages.iter().enumerate() {
            let page = idx as u32 + 1;
            let pager = (last > 1).then(|| Pager {
                current: page,
                last,
                path: path.clone(),
            });
            let url = if page == 1 {
                canonical.to_string()
            } else {
                format!("{canonical}?p={page}")
            };
            self = self.on_page(&url, topic_page(entries, pager.as_ref()));
        }
        self
    }

    /// URLs requested so far, in order (including selector re-renders).
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.url.clone())
            .collect()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|u| *u == url).count()
    }

    pub fn open_sessions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn max_open_sessions(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.closed.lock().unwrap().len()
    }
}

impl Default for MockRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageRenderer for MockRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, RenderError> {
        self.requests.lock().unwrap().push(request.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let url = request.url.as_str();
        if self.panics.contains(url) {
            panic!("MockRenderer: panic registered for {url}");
        }
        if self.hangs.contains(url) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failures.contains(url) {
            return Err(RenderError::Failed(format!("MockRenderer: failure registered for {url}")));
        }

        let landed = self.redirects.get(url).map(String::as_str).unwrap_or(url);
        let html = self
            .pages
            .get(landed)
            .cloned()
            .unwrap_or_else(|| NOT_FOUND_HTML.to_string());

        Ok(RenderedPage {
            url: landed.to_string(),
            html,
        })
    }

    fn open_session(&self, _session: SessionId) {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let now_open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now_open, Ordering::SeqCst);
    }

    fn close_session(&self, session: SessionId) {
        self.open.fetch_sub(1, Ordering::SeqCst);
        self.closed.lock().unwrap().push(session);
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// Forum markup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MockEntry {
    pub id: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub date: Option<String>,
}

pub fn entry(id: &str, content: &str, author: &str, date: &str) -> MockEntry {
    MockEntry {
        id: Some(id.to_string()),
        content: Some(content.to_string()),
        author: Some(author.to_string()),
        date: Some(date.to_string()),
    }
}

/// `per_page` well-formed entries for page `page`. Ids count up across pages
/// (page 1 holds 1..=per_page), matching oldest-to-newest forum order.
pub fn numbered_entries(page: u32, per_page: u32) -> Vec<MockEntry> {
    (1..=per_page)
        .map(|i| {
            let id = (page - 1) * per_page + i;
            entry(
                &id.to_string(),
                &format!("entry number {id}"),
                &format!("author{id}"),
                "09.05.2024 12:00",
            )
        })
        .collect()
}

/// A topic with `pages` pages of `per_page` numbered entries.
pub fn numbered_topic(pages: u32, per_page: u32) -> Vec<Vec<MockEntry>> {
    (1..=pages).map(|p| numbered_entries(p, per_page)).collect()
}

pub struct Pager {
    pub current: u32,
    pub last: u32,
    /// Topic path relative to the forum root, e.g. `/turk-telekom--31337`.
    pub path: String,
}

pub fn entry_html(e: &MockEntry) -> String {
    let id_attr = e
        .id
        .as_ref()
        .map(|id| format!(r#" data-id="{id}""#))
        .unwrap_or_default();
    let content = e
        .content
        .as_ref()
        .map(|c| format!(r#"<div class="content">{c}</div>"#))
        .unwrap_or_default();
    let author = e
        .author
        .as_ref()
        .map(|a| format!(r#"<a class="entry-author" href="/biri/{a}">{a}</a>"#))
        .unwrap_or_default();
    let date = e
        .date
        .as_ref()
        .map(|d| format!(r#"<a class="entry-date permalink" href="/entry/1">{d}</a>"#))
        .unwrap_or_default();
    format!(
        r#"<li{id_attr} data-author="x">{content}<footer><div class="feedback"></div><div class="info">{author}{date}</div></footer></li>"#
    )
}

pub fn topic_page(entries: &[MockEntry], pager: Option<&Pager>) -> String {
    let items: String = entries.iter().map(entry_html).collect();
    let pager = pager
        .map(|p| {
            format!(
                r#"<div class="pager" data-currentpage="{cur}" data-pagecount="{last}"><a class="prev" href="{path}?p={prev}">«</a><a class="last" href="{path}?p={last}" title="son sayfa">{last}</a></div>"#,
                cur = p.current,
                last = p.last,
                path = p.path,
                prev = p.current.saturating_sub(1).max(1),
            )
        })
        .unwrap_or_default();
    format!(
        r#"<html><body><div id="topic"><h1 id="title">topic</h1>{pager}<ul id="entry-item-list">{items}</ul></div></body></html>"#
    )
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub const TEST_BASE_URL: &str = "https://forum.test";

pub fn subject(id: &str, term: &str) -> Subject {
    Subject {
        id: id.to_string(),
        official_name: format!("{id} A.Ş."),
        short_name: id.to_string(),
        common_names: Vec::new(),
        search_terms: vec![term.to_string()],
        category: "test".to_string(),
        is_active: true,
    }
}

/// No pacing, short timeouts, forum rooted at [`TEST_BASE_URL`].
pub fn test_config() -> HarvestConfig {
    HarvestConfig {
        base_url: TEST_BASE_URL.to_string(),
        timeouts: Timeouts {
            navigation: Duration::from_secs(2),
            settle: Duration::ZERO,
            content_ready: Duration::from_secs(1),
            selector: Duration::from_secs(1),
            pager_probe: Duration::from_millis(500),
        },
        page_delay: Duration::ZERO,
        subject_delay: Duration::ZERO,
        ..HarvestConfig::default()
    }
}
