use std::sync::Arc;
use std::time::{Duration, Instant};

use entryscout_common::{HarvestConfig, Record, Subject};
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::runner::{SubjectOutcome, SubjectRunner};
use crate::session::PageRenderer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectStatus {
    Harvested,
    NotFound(String),
    NoSearchTerm,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SubjectReport {
    pub subject_id: String,
    pub status: SubjectStatus,
    pub records: usize,
}

/// Everything a batch produced, in subject dispatch order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub records: Vec<Record>,
    pub outcomes: Vec<SubjectReport>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn records_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.records.len() as f64 / secs
        } else {
            0.0
        }
    }

    fn count(&self, pred: impl Fn(&SubjectStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

impl std::fmt::Display for BatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Harvest Complete ===")?;
        writeln!(f, "Subjects:          {}", self.outcomes.len())?;
        writeln!(f, "  harvested:       {}", self.count(|s| matches!(s, SubjectStatus::Harvested)))?;
        writeln!(f, "  not found:       {}", self.count(|s| matches!(s, SubjectStatus::NotFound(_))))?;
        writeln!(f, "  no search term:  {}", self.count(|s| matches!(s, SubjectStatus::NoSearchTerm)))?;
        writeln!(f, "  failed:          {}", self.count(|s| matches!(s, SubjectStatus::Failed(_))))?;
        writeln!(f, "Records:           {}", self.records.len())?;
        writeln!(f, "Elapsed:           {:.1}s", self.elapsed.as_secs_f64())?;
        writeln!(f, "Rate:              {:.2} records/s", self.records_per_second())?;
        Ok(())
    }
}

/// Runs subjects with at most `workers` sessions open at once.
pub struct BatchScheduler {
    runner: SubjectRunner,
    config: Arc<HarvestConfig>,
    slots: Arc<Semaphore>,
}

impl BatchScheduler {
    pub fn new(renderer: Arc<dyn PageRenderer>, config: HarvestConfig) -> Self {
        let config = Arc::new(config);
        let workers = config.workers.max(1);
        Self {
            runner: SubjectRunner::new(renderer, config.clone()),
            config,
            slots: Arc::new(Semaphore::new(workers)),
        }
    }

    /// Attempt every subject exactly once. Subject failures, including panics,
    /// are recorded in the report and never abort the batch.
    pub async fn run_all(&self, subjects: &[Subject]) -> BatchReport {
        let started = Instant::now();
        info!(
            subjects = subjects.len(),
            workers = self.config.workers,
            "Starting harvest batch"
        );

        let mut handles: Vec<(String, Option<JoinHandle<SubjectOutcome>>)> =
            Vec::with_capacity(subjects.len());
        let mut last_start: Option<tokio::time::Instant> = None;

        for subject in subjects {
            let permit = match self.slots.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(subject = subject.id.as_str(), error = %e, "No slot available");
                    handles.push((subject.id.clone(), None));
                    continue;
                }
            };

            if let Some(prev) = last_start {
                tokio::time::sleep_until(prev + self.config.subject_delay).await;
            }
            last_start = Some(tokio::time::Instant::now());

            let runner = self.runner.clone();
            let owned = subject.clone();
            let handle = tokio::spawn(async move { runner.run(&owned, permit).await });
            handles.push((subject.id.clone(), Some(handle)));
        }

        let settled = join_all(handles.into_iter().map(|(subject_id, handle)| async move {
            let outcome = match handle {
                Some(handle) => match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(subject = subject_id.as_str(), error = %e, "Subject task aborted");
                        SubjectOutcome::Failed {
                            error: format!("task aborted: {e}"),
                            partial: Vec::new(),
                        }
                    }
                },
                None => SubjectOutcome::Failed {
                    error: "no slot available".to_string(),
                    partial: Vec::new(),
                },
            };
            (subject_id, outcome)
        }))
        .await;

        let mut report = BatchReport::default();
        for (subject_id, outcome) in settled {
            report.push(subject_id, outcome);
        }

        report.elapsed = started.elapsed();
        info!(
            records = report.records.len(),
            elapsed_secs = report.elapsed.as_secs_f64(),
            "Harvest batch finished"
        );
        report
    }
}

impl BatchReport {
    fn push(&mut self, subject_id: String, outcome: SubjectOutcome) {
        let status = match &outcome {
            SubjectOutcome::Harvested(_) => SubjectStatus::Harvested,
            SubjectOutcome::NotFound(reason) => SubjectStatus::NotFound(reason.to_string()),
            SubjectOutcome::NoSearchTerm => SubjectStatus::NoSearchTerm,
            SubjectOutcome::Failed { error, partial } => {
                warn!(
                    subject = subject_id.as_str(),
                    error = error.as_str(),
                    kept = partial.len(),
                    "Subject failed"
                );
                SubjectStatus::Failed(error.clone())
            }
        };
        let records = outcome.into_records();
        self.outcomes.push(SubjectReport {
            subject_id,
            status,
            records: records.len(),
        });
        self.records.extend(records);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{numbered_topic, subject, test_config, MockRenderer, TEST_BASE_URL};

    #[tokio::test]
    async fn merges_in_dispatch_order() {
        let mut renderer = MockRenderer::new();
        let mut subjects = Vec::new();
        for name in ["alfa", "beta", "gama"] {
            renderer = renderer.on_topic(
                TEST_BASE_URL,
                name,
                &format!("{TEST_BASE_URL}/{name}--1"),
                &numbered_topic(1, 2),
            );
            subjects.push(subject(&name.to_uppercase(), name));
        }
        let scheduler = BatchScheduler::new(Arc::new(renderer), test_config());

        let report = scheduler.run_all(&subjects).await;
        let order: Vec<_> = report.records.iter().map(|r| r.subject_id.as_str()).collect();
        assert_eq!(order, ["ALFA", "ALFA", "BETA", "BETA", "GAMA", "GAMA"]);
        assert!(report
            .outcomes
            .iter()
            .all(|o| o.status == SubjectStatus::Harvested && o.records == 2));
    }

    #[tokio::test]
    async fn empty_batch() {
        let scheduler = BatchScheduler::new(Arc::new(MockRenderer::new()), test_config());
        let report = scheduler.run_all(&[]).await;
        assert!(report.records.is_empty());
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test]
    async fn subject_starts_are_paced() {
        let mut renderer = MockRenderer::new();
        let subjects: Vec<_> = (0..3).map(|i| subject(&format!("S{i}"), &format!("s{i}"))).collect();
        for i in 0..3 {
            renderer = renderer.on_topic(
                TEST_BASE_URL,
                &format!("s{i}"),
                &format!("{TEST_BASE_URL}/s{i}--1"),
                &numbered_topic(1, 1),
            );
        }
        let config = HarvestConfig {
            subject_delay: Duration::from_millis(40),
            ..test_config()
        };
        let scheduler = BatchScheduler::new(Arc::new(renderer), config);

        let report = scheduler.run_all(&subjects).await;
        assert_eq!(report.records.len(), 3);
        assert!(report.elapsed >= Duration::from_millis(80));
    }

    #[test]
    fn report_display_and_rate() {
        let report = BatchReport {
            records: Vec::new(),
            outcomes: vec![
                SubjectReport {
                    subject_id: "A".into(),
                    status: SubjectStatus::Harvested,
                    records: 0,
                },
                SubjectReport {
                    subject_id: "B".into(),
                    status: SubjectStatus::Failed("boom".into()),
                    records: 0,
                },
            ],
            elapsed: Duration::from_secs(2),
        };
        let text = report.to_string();
        assert!(text.contains("Subjects:          2"));
        assert!(text.contains("failed:          1"));
        assert_eq!(report.records_per_second(), 0.0);
    }
}
