//! Regression guard: sanity checks against declared baselines and drift
//! detection against the previous run's snapshot.
//!
//! The portal gives no schema errors when its markup changes; extraction
//! just silently finds fewer rows. The guard catches that by comparing each
//! run against per-department minimums declared in configuration and
//! against a persisted snapshot of the prior run. Verdicts are advisory:
//! nothing here blocks persistence, the caller decides what a `Fail` means.

use anyhow::Context;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::model::{CrawlBatchResult, DeptObservation};

/// Per-department expectations, declared in configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepartmentBaseline {
    /// Minimum plausible section count; below this is a `Fail`.
    #[serde(default)]
    pub min_sections: usize,
    /// Course-code prefixes this department's sections must carry.
    #[serde(default)]
    pub required_prefixes: Vec<String>,
}

/// Verdict of a single department check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SanityStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanityCheckResult {
    pub dept: String,
    pub status: SanityStatus,
    pub findings: Vec<String>,
}

/// Check one department's crawl aggregate against its declared baseline.
///
/// Below the minimum count is a `Fail`. Required prefixes all absent is a
/// `Fail`; some present and some absent is a `Warn`. A dominant foreign
/// prefix that looks related to the department code is flagged as possible
/// cross-department bleeding, `Warn` only since legitimate cross-listings
/// look identical.
pub fn check_department_sanity(
    dept: &str,
    observation: &DeptObservation,
    baseline: &DepartmentBaseline,
) -> SanityCheckResult {
    let mut findings = Vec::new();
    let mut status = SanityStatus::Pass;
    let raise = |status: &mut SanityStatus, to: SanityStatus| {
        if matches!(status, SanityStatus::Pass) || matches!(to, SanityStatus::Fail) {
            *status = to;
        }
    };

    if observation.count < baseline.min_sections {
        findings.push(format!(
            "section count {} below declared minimum {}",
            observation.count, baseline.min_sections
        ));
        raise(&mut status, SanityStatus::Fail);
    }

    let histogram = &observation.prefixes;

    if !baseline.required_prefixes.is_empty() {
        let present: Vec<&String> = baseline
            .required_prefixes
            .iter()
            .filter(|p| histogram.contains_key(p.as_str()))
            .collect();
        if present.is_empty() {
            findings.push(format!(
                "none of the required prefixes {:?} appear in extracted records",
                baseline.required_prefixes
            ));
            raise(&mut status, SanityStatus::Fail);
        } else if present.len() < baseline.required_prefixes.len() {
            let absent: Vec<&String> = baseline
                .required_prefixes
                .iter()
                .filter(|p| !histogram.contains_key(p.as_str()))
                .collect();
            findings.push(format!("required prefixes {absent:?} are absent"));
            raise(&mut status, SanityStatus::Warn);
        }
    }

    // Cross-department bleeding: the dominant prefix is neither required nor
    // this department's own, and shares no substring with the department
    // code at all, suggesting a mis-scoped query returned another
    // department's rows.
    if let Some((dominant, _)) = histogram.iter().max_by_key(|(_, n)| **n)
        && !dominant.is_empty()
        && !baseline.required_prefixes.iter().any(|p| p == dominant)
        && dominant.as_str() != dept
        && !shares_substring(dominant, dept, 2)
    {
        findings.push(format!(
            "dominant prefix '{dominant}' shares nothing with department '{dept}', possible cross-department bleeding"
        ));
        raise(&mut status, SanityStatus::Warn);
    }

    SanityCheckResult {
        dept: dept.to_string(),
        status,
        findings,
    }
}

/// True when `a` and `b` share any common substring of at least `min_len`.
fn shares_substring(a: &str, b: &str, min_len: usize) -> bool {
    if a.len() < min_len || b.len() < min_len {
        return false;
    }
    (0..=a.len() - min_len).any(|start| b.contains(&a[start..start + min_len]))
}

/// One persisted run, keyed by term.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineSnapshot {
    pub taken_at: DateTime<Utc>,
    pub departments: IndexMap<String, DeptObservation>,
}

/// A department whose count moved materially between runs.
#[derive(Debug, Clone, Serialize)]
pub struct DeptDelta {
    pub dept: String,
    pub baseline: usize,
    pub current: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BaselineComparison {
    pub term: String,
    /// True when no prior snapshot existed for this term; nothing is
    /// flagged, the run simply becomes the baseline.
    pub first_run: bool,
    pub regressions: Vec<DeptDelta>,
    pub improvements: Vec<DeptDelta>,
}

impl BaselineComparison {
    pub fn is_clean(&self) -> bool {
        self.regressions.is_empty()
    }
}

/// Persists per-term snapshots and flags material count movement between
/// runs.
pub struct BaselineTracker {
    path: Option<PathBuf>,
    /// Fractional drop that counts as a regression. 0.5 means a department
    /// falling below half its prior count is flagged.
    drop_threshold: f64,
    snapshots: HashMap<String, BaselineSnapshot>,
}

impl BaselineTracker {
    pub fn new(drop_threshold: f64) -> Self {
        Self {
            path: None,
            drop_threshold,
            snapshots: HashMap::new(),
        }
    }

    /// Load the tracker from a JSON snapshot file, starting empty when the
    /// file does not exist yet.
    pub fn with_path(path: PathBuf, drop_threshold: f64) -> anyhow::Result<Self> {
        let snapshots = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading baseline file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing baseline file {}", path.display()))?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path: Some(path),
            drop_threshold,
            snapshots,
        })
    }

    /// Compare a run against the stored snapshot for its term.
    ///
    /// Regressions are departments that fell below `1 - drop_threshold` of
    /// their prior count, including departments missing from the run
    /// entirely. Improvements are departments that grew past 110% of prior,
    /// reported so unexpectedly large runs get looked at too.
    pub fn compare(&self, result: &CrawlBatchResult) -> BaselineComparison {
        let term = result.term.as_str().to_string();
        let Some(prior) = self.snapshots.get(&term) else {
            return BaselineComparison {
                term,
                first_run: true,
                regressions: Vec::new(),
                improvements: Vec::new(),
            };
        };

        let mut regressions = Vec::new();
        let mut improvements = Vec::new();
        for (dept, prior_obs) in &prior.departments {
            if prior_obs.count == 0 {
                continue;
            }
            let current = result
                .departments
                .get(dept)
                .map(|obs| obs.count)
                .unwrap_or(0);
            let floor = (prior_obs.count as f64) * (1.0 - self.drop_threshold);
            if (current as f64) < floor {
                warn!(
                    dept,
                    prior = prior_obs.count,
                    current,
                    "department count regressed against baseline"
                );
                regressions.push(DeptDelta {
                    dept: dept.clone(),
                    baseline: prior_obs.count,
                    current,
                });
            } else if (current as f64) > (prior_obs.count as f64) * 1.10 {
                improvements.push(DeptDelta {
                    dept: dept.clone(),
                    baseline: prior_obs.count,
                    current,
                });
            }
        }

        BaselineComparison {
            term,
            first_run: false,
            regressions,
            improvements,
        }
    }

    /// Per-item prior counts from the stored snapshot for `term`, keyed the
    /// way [`crate::model::WorkItem::key`] keys work items, so a crawl can
    /// flag items whose record count is unchanged since the last run.
    pub fn prior_counts(&self, term: &crate::model::TermCode) -> Option<HashMap<String, usize>> {
        self.snapshots.get(term.as_str()).map(|snapshot| {
            snapshot
                .departments
                .iter()
                .map(|(dept, obs)| (format!("{term}:{dept}"), obs.count))
                .collect()
        })
    }

    /// Record a run as the new snapshot for its term, persisting when a
    /// snapshot path is configured.
    pub fn record(&mut self, result: &CrawlBatchResult) -> anyhow::Result<()> {
        self.snapshots.insert(
            result.term.as_str().to_string(),
            BaselineSnapshot {
                taken_at: Utc::now(),
                departments: result.departments.clone(),
            },
        );
        if let Some(path) = &self.path {
            let raw = serde_json::to_string_pretty(&self.snapshots)?;
            fs::write(path, raw)
                .with_context(|| format!("writing baseline file {}", path.display()))?;
            info!(path = %path.display(), term = %result.term, "baseline snapshot recorded");
        }
        Ok(())
    }
}
