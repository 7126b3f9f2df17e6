use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Subject ---

/// A named entity (usually a listed company) whose forum coverage is harvested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Stable identifier, e.g. a ticker symbol.
    pub id: String,
    pub official_name: String,
    pub short_name: String,
    pub common_names: Vec<String>,
    /// Ordered search terms. Only the first one is used when harvesting.
    pub search_terms: Vec<String>,
    pub category: String,
    pub is_active: bool,
}

impl Subject {
    /// Name written next to each record.
    pub fn display_name(&self) -> &str {
        [&self.official_name, &self.short_name]
            .into_iter()
            .find(|name| !name.trim().is_empty())
            .map(String::as_str)
            .unwrap_or(&self.id)
    }

    pub fn primary_search_term(&self) -> Option<&str> {
        self.search_terms
            .first()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
    }
}

// --- ResourceLocator ---

/// A resolved topic: the canonical URL after redirects and its highest page index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceLocator {
    pub canonical_url: String,
    last_page: u32,
}

impl ResourceLocator {
    pub fn new(canonical_url: impl Into<String>, last_page: u32) -> Self {
        Self {
            canonical_url: canonical_url.into(),
            last_page: last_page.max(1),
        }
    }

    pub fn single_page(canonical_url: impl Into<String>) -> Self {
        Self::new(canonical_url, 1)
    }

    /// Always at least 1.
    pub fn last_page(&self) -> u32 {
        self.last_page
    }
}

// --- Record ---

/// One harvested entry. Field names double as CSV column headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "company_ticker")]
    pub subject_id: String,
    #[serde(rename = "company_official_name")]
    pub subject_name: String,
    #[serde(rename = "search_term_used")]
    pub search_term: String,
    #[serde(rename = "topic_url")]
    pub page_url: String,
    #[serde(rename = "entry_id")]
    pub item_id: String,
    #[serde(rename = "entry_content")]
    pub content: String,
    #[serde(rename = "entry_author")]
    pub author: String,
    #[serde(rename = "entry_date_str")]
    pub date_text: String,
    #[serde(rename = "entry_datetime_utc")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(rename = "fetch_timestamp_utc")]
    pub fetched_at: DateTime<Utc>,
    #[serde(rename = "page_number")]
    pub page: u32,
}
