//! Subject list loading.
//!
//! Two JSON shapes are accepted:
//! - keyed: `{"companies": {"AKBNK": {...}, ...}}` where every field is required
//!   except `is_active`;
//! - list: `[{...}, ...]` where every field is optional.
//!
//! Both normalize to [`Subject`]. A subject id appearing twice keeps its first
//! position and takes the later entry's values.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{HarvestError, Result};
use crate::types::Subject;

#[derive(Debug, Deserialize)]
struct KeyedEntry {
    ticker: String,
    official_name: String,
    short_name: String,
    common_names: Vec<String>,
    eksi_search_terms: Vec<String>,
    sector: String,
    #[serde(default = "default_active")]
    is_active: bool,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    #[serde(default)]
    ticker: String,
    #[serde(default)]
    official_name: String,
    #[serde(default)]
    short_name: String,
    #[serde(default)]
    common_names: Vec<String>,
    #[serde(default)]
    eksi_search_terms: Vec<String>,
    #[serde(default = "default_sector")]
    sector: String,
    #[serde(default = "default_active")]
    is_active: bool,
}

fn default_active() -> bool {
    true
}

fn default_sector() -> String {
    "unknown".to_string()
}

impl From<KeyedEntry> for Subject {
    fn from(e: KeyedEntry) -> Self {
        Subject {
            id: e.ticker,
            official_name: e.official_name,
            short_name: e.short_name,
            common_names: e.common_names,
            search_terms: e.eksi_search_terms,
            category: e.sector,
            is_active: e.is_active,
        }
    }
}

impl From<ListEntry> for Subject {
    fn from(e: ListEntry) -> Self {
        Subject {
            id: e.ticker,
            official_name: e.official_name,
            short_name: e.short_name,
            common_names: e.common_names,
            search_terms: e.eksi_search_terms,
            category: e.sector,
            is_active: e.is_active,
        }
    }
}

/// Read and parse a subject file. Any failure here is fatal for the run.
pub fn load_subjects(path: impl AsRef<Path>) -> Result<Vec<Subject>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| {
        HarvestError::SubjectLoad(format!("cannot read {}: {e}", path.display()))
    })?;
    let subjects = parse_subjects(&raw)?;
    info!(
        path = %path.display(),
        count = subjects.len(),
        "Loaded subjects (only the first search term of each is used)"
    );
    Ok(subjects)
}

pub fn parse_subjects(raw: &str) -> Result<Vec<Subject>> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| HarvestError::SubjectLoad(format!("invalid JSON: {e}")))?;

    let parsed: Vec<Subject> = match value {
        Value::Object(mut root) => {
            let Some(Value::Object(companies)) = root.remove("companies") else {
                return Err(HarvestError::SubjectLoad(
                    "expected a list or an object with a \"companies\" map".into(),
                ));
            };
            companies
                .into_iter()
                .map(|(key, entry)| {
                    serde_json::from_value::<KeyedEntry>(entry)
                        .map(Subject::from)
                        .map_err(|e| HarvestError::SubjectLoad(format!("entry {key}: {e}")))
                })
                .collect::<Result<_>>()?
        }
        Value::Array(entries) => entries
            .into_iter()
            .enumerate()
            .map(|(idx, entry)| {
                serde_json::from_value::<ListEntry>(entry)
                    .map(Subject::from)
                    .map_err(|e| HarvestError::SubjectLoad(format!("entry #{idx}: {e}")))
            })
            .collect::<Result<_>>()?,
        _ => {
            return Err(HarvestError::SubjectLoad(
                "expected a list or an object with a \"companies\" map".into(),
            ))
        }
    };

    Ok(dedup_by_id(parsed))
}

fn dedup_by_id(subjects: Vec<Subject>) -> Vec<Subject> {
    let mut out: Vec<Subject> = Vec::with_capacity(subjects.len());
    for subject in subjects {
        match out.iter_mut().find(|s| s.id == subject.id) {
            Some(existing) => {
                warn!(id = subject.id.as_str(), "Duplicate subject id, keeping the later entry");
                *existing = subject;
            }
            None => out.push(subject),
        }
    }
    out
}
