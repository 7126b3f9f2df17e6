//! Entry markup → [`Record`].

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use entryscout_common::{Record, Subject};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::debug;

use crate::timestamp;

/// Topic entry list container.
pub const ENTRY_LIST: &str = "ul#entry-item-list";
/// One entry per list item.
pub const ENTRY_ITEMS: &str = "ul#entry-item-list > li";
pub const PAGER: &str = "div.pager";
pub const LAST_PAGE_LINK: &str = "div.pager a[title='son sayfa']";

const ID_ATTR: &str = "data-id";

struct EntrySelectors {
    items: Selector,
    content: Selector,
    author: Selector,
    date: Selector,
}

static SELECTORS: LazyLock<EntrySelectors> = LazyLock::new(|| EntrySelectors {
    items: Selector::parse(ENTRY_ITEMS).expect("valid selector"),
    content: Selector::parse("div.content").expect("valid selector"),
    author: Selector::parse("footer div.info a.entry-author").expect("valid selector"),
    date: Selector::parse("footer div.info a.entry-date").expect("valid selector"),
});

/// Everything a record carries besides the entry itself.
#[derive(Debug, Clone)]
pub struct PageContext<'a> {
    pub subject: &'a Subject,
    pub search_term: &'a str,
    pub page_url: &'a str,
    pub page: u32,
    pub fetched_at: DateTime<Utc>,
    /// "Now" in the forum's zone, for relative date markers.
    pub reference: DateTime<Tz>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("entry has no identifier")]
    MissingId,

    #[error("entry is missing its {0}")]
    MissingField(&'static str),
}

pub fn extract(item: ElementRef<'_>, ctx: &PageContext<'_>) -> Result<Record, ExtractError> {
    let item_id = item
        .value()
        .attr(ID_ATTR)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(ExtractError::MissingId)?
        .to_string();

    let content = field_text(item, &SELECTORS.content, "content")?;
    let author = field_text(item, &SELECTORS.author, "author")?;
    let date_text = field_text(item, &SELECTORS.date, "date")?;
    let published_at = timestamp::normalize(&date_text, ctx.reference);

    Ok(Record {
        subject_id: ctx.subject.id.clone(),
        subject_name: ctx.subject.display_name().to_string(),
        search_term: ctx.search_term.to_string(),
        page_url: ctx.page_url.to_string(),
        item_id,
        content,
        author,
        date_text,
        published_at,
        fetched_at: ctx.fetched_at,
        page: ctx.page,
    })
}

fn field_text(
    item: ElementRef<'_>,
    selector: &Selector,
    name: &'static str,
) -> Result<String, ExtractError> {
    item.select(selector)
        .next()
        .map(collapsed_text)
        .ok_or(ExtractError::MissingField(name))
}

fn collapsed_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result of extracting one page.
#[derive(Debug, Default)]
pub struct PageExtraction {
    /// Newest first.
    pub records: Vec<Record>,
    /// List items present on the page.
    pub items_seen: usize,
    /// Items that failed extraction.
    pub skipped: usize,
}

/// Extract up to `max` records from a topic page, walking entries from the
/// bottom of the list (newest) to the top.
pub fn extract_page(html: &str, ctx: &PageContext<'_>, max: usize) -> PageExtraction {
    let document = Html::parse_document(html);
    let items: Vec<ElementRef<'_>> = document.select(&SELECTORS.items).collect();

    let mut out = PageExtraction {
        items_seen: items.len(),
        ..Default::default()
    };

    for item in items.into_iter().rev() {
        if out.records.len() >= max {
            break;
        }
        match extract(item, ctx) {
            Ok(record) => out.records.push(record),
            Err(e) => {
                out.skipped += 1;
                debug!(page_url = ctx.page_url, page = ctx.page, error = %e, "Skipping entry");
            }
        }
    }

    out
}
