//! Concurrent fetch-and-parse orchestration with adaptive concurrency.
//!
//! Work items are crawled in batches sliced from the pending queue: each
//! batch's tasks launch together and are awaited jointly before the next
//! batch starts. Concurrency backs off on errors and recovers on success,
//! bounded below by [`MIN_CONCURRENCY`] and above by the configured
//! ceiling. No work item is retried automatically: a failing item's error
//! surfaces through the progress callback and is excluded from the
//! aggregate; callers may re-run excluded items in a subsequent pass.

pub mod discovery;

use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::{CrawlBatchResult, HasCourseCode, TermCode, WorkItem};
use crate::portal::PortalError;
use crate::utils::fmt_duration;

/// Concurrency never drops below this, however many errors accumulate.
pub const MIN_CONCURRENCY: usize = 2;

/// Consecutive failures before the in-flight bound is halved.
const CONSECUTIVE_ERROR_THRESHOLD: u32 = 2;

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Upper bound on in-flight work items; also the starting concurrency.
    pub max_concurrency: usize,
    /// Pause between batches, to avoid overwhelming the portal.
    pub inter_batch_delay: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            inter_batch_delay: Duration::from_millis(1000),
        }
    }
}

/// Outcome of one completed work item, delivered through the progress
/// callback. Successful items carry their extracted records; the external
/// persistence collaborator consumes them from here.
#[derive(Debug, Serialize)]
pub struct ItemOutcome<T> {
    pub key: String,
    pub records: Vec<T>,
    pub error: Option<String>,
    /// Concurrency in force when the item ran.
    pub concurrency: usize,
    /// `Some(true)` when an optional prior count matches this item's record
    /// count exactly, letting callers detect "no change since last run"
    /// without a full diff. `None` when no prior count was supplied.
    pub unchanged: Option<bool>,
}

/// Drives concurrent fetch-and-parse across a set of work items.
pub struct CrawlOrchestrator {
    config: CrawlConfig,
}

impl CrawlOrchestrator {
    pub fn new(config: CrawlConfig) -> Self {
        Self { config }
    }

    /// Crawl `items`, reporting each completion through `on_progress`.
    ///
    /// `task` fetches and parses one item. `prior_counts` (keyed by
    /// [`WorkItem::key`]) enables the `unchanged` flag on outcomes. The
    /// `cancel` token aborts the crawl mid-batch: in-flight tasks are
    /// dropped and unprocessed items reported in
    /// [`CrawlBatchResult::cancelled`].
    pub async fn run<T, F, Fut>(
        &self,
        term: TermCode,
        items: Vec<WorkItem>,
        task: F,
        prior_counts: Option<&HashMap<String, usize>>,
        mut on_progress: impl FnMut(ItemOutcome<T>),
        cancel: &CancellationToken,
    ) -> CrawlBatchResult
    where
        T: HasCourseCode,
        F: Fn(WorkItem) -> Fut,
        Fut: Future<Output = Result<Vec<T>, PortalError>>,
    {
        let started = Instant::now();
        let total = items.len();
        let mut result = CrawlBatchResult {
            term: term.clone(),
            departments: Default::default(),
            failed: Vec::new(),
            cancelled: Vec::new(),
            concurrency_trace: Vec::new(),
            duration: Duration::ZERO,
        };

        let mut current = self.config.max_concurrency.max(MIN_CONCURRENCY);
        let mut consecutive_errors: u32 = 0;
        let mut pending = items.into_iter();
        let mut first_batch = true;

        info!(term = %term, items = total, concurrency = current, "crawl started");

        loop {
            if cancel.is_cancelled() {
                result.cancelled.extend(pending.map(|i| i.key()));
                break;
            }

            let batch: Vec<WorkItem> = pending.by_ref().take(current).collect();
            if batch.is_empty() {
                break;
            }
            if !first_batch {
                tokio::time::sleep(self.config.inter_batch_delay).await;
            }
            first_batch = false;
            result.concurrency_trace.push(current);

            let futures = batch.iter().cloned().map(|item| {
                let fut = task(item);
                cancel.run_until_cancelled(fut)
            });
            let outcomes = join_all(futures).await;

            let mut batch_errors = 0usize;
            for (item, outcome) in batch.into_iter().zip(outcomes) {
                let key = item.key();
                match outcome {
                    None => {
                        // Cancelled mid-flight; not processed, not failed.
                        result.cancelled.push(key);
                    }
                    Some(Ok(records)) => {
                        consecutive_errors = 0;
                        let obs = result.departments.entry(item.code.clone()).or_default();
                        for record in &records {
                            obs.observe(record.course_code());
                        }
                        let unchanged = prior_counts
                            .map(|prior| prior.get(&key) == Some(&records.len()));
                        debug!(key = %key, count = records.len(), "work item completed");
                        on_progress(ItemOutcome {
                            key,
                            records,
                            error: None,
                            concurrency: current,
                            unchanged,
                        });
                    }
                    Some(Err(e)) => {
                        batch_errors += 1;
                        consecutive_errors += 1;
                        let error_text = format!("{e:#}");
                        warn!(key = %key, error = %error_text, "work item failed");
                        if consecutive_errors >= CONSECUTIVE_ERROR_THRESHOLD {
                            let reduced = (current / 2).max(MIN_CONCURRENCY);
                            if reduced < current {
                                warn!(
                                    from = current,
                                    to = reduced,
                                    "consecutive errors, backing off concurrency"
                                );
                                current = reduced;
                            }
                        }
                        result.failed.push((key.clone(), error_text.clone()));
                        on_progress(ItemOutcome {
                            key,
                            records: Vec::new(),
                            error: Some(error_text),
                            concurrency: current,
                            unchanged: None,
                        });
                    }
                }
            }

            // A clean batch steps concurrency back up toward the ceiling.
            if batch_errors == 0 && current < self.config.max_concurrency {
                current += 1;
            }
        }

        result.duration = started.elapsed();
        info!(
            term = %term,
            completed = result.departments.len(),
            failed = result.failed.len(),
            cancelled = result.cancelled.len(),
            duration = fmt_duration(result.duration),
            "crawl finished"
        );
        result
    }
}
