use std::sync::Arc;

use chrono::Utc;
use entryscout_common::{HarvestConfig, Record, Subject};
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, info, warn};

use crate::resolver::{self, NotFoundReason, Resolution};
use crate::session::{BrowserSession, PageRenderer};
use crate::walker::{self, StopReason, WalkRequest};

/// How one subject's run ended.
#[derive(Debug)]
pub enum SubjectOutcome {
    Harvested(Vec<Record>),
    NotFound(NotFoundReason),
    NoSearchTerm,
    /// The run ended early; `partial` holds what was collected before.
    Failed { error: String, partial: Vec<Record> },
}

impl SubjectOutcome {
    pub fn records(&self) -> &[Record] {
        match self {
            SubjectOutcome::Harvested(records) => records.as_slice(),
            SubjectOutcome::Failed { partial, .. } => partial.as_slice(),
            SubjectOutcome::NotFound(_) | SubjectOutcome::NoSearchTerm => &[],
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            SubjectOutcome::Harvested(records) => records,
            SubjectOutcome::Failed { partial, .. } => partial,
            SubjectOutcome::NotFound(_) | SubjectOutcome::NoSearchTerm => Vec::new(),
        }
    }
}

/// A browsing session bound to the slot it occupies. Dropping the lease closes
/// the session, then frees the slot.
pub struct SessionLease {
    session: BrowserSession,
    _permit: OwnedSemaphorePermit,
}

impl SessionLease {
    pub fn new(session: BrowserSession, permit: OwnedSemaphorePermit) -> Self {
        Self {
            session,
            _permit: permit,
        }
    }

    pub fn session(&mut self) -> &mut BrowserSession {
        &mut self.session
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        debug!(session = %self.session.id(), "Releasing session lease");
    }
}

/// Runs one subject end to end: open a session, resolve, walk, release.
#[derive(Clone)]
pub struct SubjectRunner {
    renderer: Arc<dyn PageRenderer>,
    config: Arc<HarvestConfig>,
}

impl SubjectRunner {
    pub fn new(renderer: Arc<dyn PageRenderer>, config: Arc<HarvestConfig>) -> Self {
        Self { renderer, config }
    }

    pub async fn run(&self, subject: &Subject, permit: OwnedSemaphorePermit) -> SubjectOutcome {
        let config = self.config.as_ref();
        // Later search terms are ignored.
        let Some(term) = subject.primary_search_term() else {
            warn!(subject = subject.id.as_str(), "Subject has no search term, skipping");
            return SubjectOutcome::NoSearchTerm;
        };

        let mut lease = SessionLease::new(
            BrowserSession::open(self.renderer.clone(), &config.user_agent, config.timeouts.settle),
            permit,
        );
        let fetched_at = Utc::now();
        info!(subject = subject.id.as_str(), term, "Resolving topic");

        let locator = match resolver::resolve(lease.session(), term, config).await {
            Resolution::Found(locator) => locator,
            Resolution::NotFound(reason) => {
                info!(subject = subject.id.as_str(), term, reason = %reason, "Topic not found");
                return SubjectOutcome::NotFound(reason);
            }
        };

        let request = WalkRequest {
            subject,
            search_term: term,
            locator: &locator,
            limit: config.records_per_subject,
            fetched_at,
        };
        let outcome = walker::walk(lease.session(), &request, config).await;
        info!(
            subject = subject.id.as_str(),
            url = locator.canonical_url.as_str(),
            last_page = locator.last_page(),
            pages = outcome.pages_visited,
            records = outcome.records.len(),
            stop = ?outcome.stop,
            "Walk finished"
        );

        match outcome.stop {
            StopReason::PageLoadFailed { page, error } => SubjectOutcome::Failed {
                error: format!("page {page}: {error}"),
                partial: outcome.records,
            },
            _ => SubjectOutcome::Harvested(outcome.records),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::Semaphore;

    use super::*;
    use crate::testing::{numbered_topic, subject, test_config, MockRenderer, TEST_BASE_URL};

    fn runner(renderer: &Arc<MockRenderer>) -> SubjectRunner {
        SubjectRunner::new(renderer.clone(), Arc::new(test_config()))
    }

    #[tokio::test]
    async fn harvests_up_to_the_cap_and_releases_everything() {
        let canonical = format!("{TEST_BASE_URL}/akbank--1");
        let renderer = Arc::new(MockRenderer::new().on_topic(
            TEST_BASE_URL,
            "akbank",
            &canonical,
            &numbered_topic(3, 4),
        ));
        let slots = Arc::new(Semaphore::new(1));
        let permit = slots.clone().acquire_owned().await.unwrap();

        let outcome = runner(&renderer).run(&subject("AKBNK", "akbank"), permit).await;

        let records = outcome.records();
        assert_eq!(records.len(), 5);
        let ids: Vec<_> = records.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, ["12", "11", "10", "9", "8"]);
        let fetched = records[0].fetched_at;
        assert!(records.iter().all(|r| r.fetched_at == fetched));
        assert!(records.iter().all(|r| r.search_term == "akbank"));
        assert_eq!(renderer.open_sessions(), 0);
        assert_eq!(slots.available_permits(), 1);
    }

    #[tokio::test]
    async fn only_the_first_search_term_is_used() {
        let renderer = Arc::new(MockRenderer::new().on_topic(
            TEST_BASE_URL,
            "thy",
            &format!("{TEST_BASE_URL}/thy--1"),
            &numbered_topic(1, 2),
        ));
        let mut s = subject("THYAO", "türk hava yolları");
        s.search_terms.push("thy".into());
        let permit = Arc::new(Semaphore::new(1)).acquire_owned().await.unwrap();

        let outcome = runner(&renderer).run(&s, permit).await;
        assert!(matches!(outcome, SubjectOutcome::NotFound(NotFoundReason::NoEntries)));
        assert!(renderer
            .requests()
            .iter()
            .all(|u| !u.ends_with("/thy") && !u.contains("thy--1")));
    }

    #[tokio::test]
    async fn subject_without_terms_opens_no_session() {
        let renderer = Arc::new(MockRenderer::new());
        let mut s = subject("EMPTY", "x");
        s.search_terms.clear();
        let slots = Arc::new(Semaphore::new(1));
        let permit = slots.clone().acquire_owned().await.unwrap();

        let outcome = runner(&renderer).run(&s, permit).await;
        assert!(matches!(outcome, SubjectOutcome::NoSearchTerm));
        assert_eq!(renderer.sessions_opened(), 0);
        assert_eq!(slots.available_permits(), 1);
    }

    #[tokio::test]
    async fn page_failure_reports_partial_records() {
        let canonical = format!("{TEST_BASE_URL}/sasa--1");
        let renderer = Arc::new(
            MockRenderer::new()
                .on_topic(TEST_BASE_URL, "sasa", &canonical, &numbered_topic(3, 2))
                .fail(&format!("{canonical}?p=2")),
        );
        let permit = Arc::new(Semaphore::new(1)).acquire_owned().await.unwrap();

        let outcome = runner(&renderer).run(&subject("SASA", "sasa"), permit).await;
        match outcome {
            SubjectOutcome::Failed { error, partial } => {
                assert!(error.starts_with("page 2"));
                assert_eq!(partial.len(), 2);
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(renderer.open_sessions(), 0);
    }
}
