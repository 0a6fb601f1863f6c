//! Typed records produced by the ingestion pipeline.
//!
//! Every record traces to exactly one [`WorkItem`] and one raw portal
//! response; extractors receive `(html, context)` and nothing else, so two
//! responses can never contribute cells to the same record.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A 5-character portal term code: semester digit followed by a 4-digit year.
///
/// The semester digit is `0` (intersession), `1` (first semester) or `2`
/// (second semester). Codes order naturally within a year: `0 < 1 < 2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermCode(String);

impl TermCode {
    /// Parse a raw term code, validating shape (`[0-2]` + 4 digits).
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.len() != 5 {
            return None;
        }
        let mut chars = raw.chars();
        let sem = chars.next()?;
        if !matches!(sem, '0' | '1' | '2') || !chars.all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    /// Build a code from its parts. `semester` outside `0..=2` is clamped.
    pub fn from_parts(semester: u8, year: u16) -> Self {
        Self(format!("{}{:04}", semester.min(2), year))
    }

    pub fn semester(&self) -> u8 {
        self.0.as_bytes()[0] - b'0'
    }

    pub fn year(&self) -> u16 {
        self.0[1..].parse().unwrap_or(0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TermCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a [`WorkItem`]'s code refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkKind {
    /// A department code for a class-schedule query.
    Department,
    /// A degree code for a curriculum query.
    Degree,
}

/// One crawlable unit: a (term, department-or-degree-code) pair.
///
/// Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub term: TermCode,
    pub code: String,
    pub kind: WorkKind,
}

impl WorkItem {
    pub fn department(term: TermCode, code: impl Into<String>) -> Self {
        Self {
            term,
            code: code.into(),
            kind: WorkKind::Department,
        }
    }

    pub fn degree(term: TermCode, code: impl Into<String>) -> Self {
        Self {
            term,
            code: code.into(),
            kind: WorkKind::Degree,
        }
    }

    /// Stable key for progress reporting and per-department aggregation.
    pub fn key(&self) -> String {
        format!("{}:{}", self.term, self.code)
    }
}

/// One meeting slot of a schedule section.
///
/// Slots have no identity outside their section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    /// Full weekday name ("Monday", "Thursday", ...).
    pub day: String,
    /// Start time as the portal renders it, e.g. "0800".
    pub start: String,
    pub end: String,
    pub room: Option<String>,
    /// Modality annotation; "ONSITE" when the portal omits one.
    pub modality: String,
}

/// A section row from the class-schedule results table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSection {
    pub course_code: String,
    pub section: String,
    pub title: String,
    pub units: f32,
    pub instructor: Option<String>,
    pub capacity: u32,
    pub free_slots: u32,
    pub slots: Vec<ScheduleSlot>,
    pub remarks: String,
    pub has_prerequisite: bool,
}

/// A course row from a curriculum page.
///
/// `year` and `semester` are inferred from surrounding document structure,
/// never from the row itself. `year == 0` means the program has no
/// year/semester structure (graduate curricula); `semester == 0` is the
/// intersession.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurriculumCourse {
    pub degree_code: String,
    pub course_code: String,
    pub title: String,
    pub units: f32,
    pub prerequisite_text: String,
    pub year: u8,
    pub semester: u8,
    pub category: String,
}

/// Status of a course on an individual plan of study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpsStatus {
    Passed,
    Credited,
    NotTaken,
    InProgress,
    Failed,
}

impl IpsStatus {
    /// Map the portal's status text. Unknown text yields `None` and the row
    /// is skipped by the extractor.
    pub fn parse(raw: &str) -> Option<Self> {
        let folded = raw.trim().to_ascii_uppercase();
        match folded.as_str() {
            "PASSED" => Some(Self::Passed),
            "CREDITED" => Some(Self::Credited),
            "NOT TAKEN" | "NOT YET TAKEN" => Some(Self::NotTaken),
            "IN PROGRESS" | "CURRENTLY ENROLLED" => Some(Self::InProgress),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeEntry {
    pub course_code: String,
    pub title: String,
    pub units: f32,
    pub grade: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpsCourse {
    pub course_code: String,
    pub title: String,
    pub units: f32,
    pub status: IpsStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldOrder {
    pub office: String,
    pub reason: String,
    pub date_imposed: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrolledClass {
    pub course_code: String,
    pub section: String,
    pub schedule: String,
    pub instructor: Option<String>,
}

/// Per-principal records, tagged by kind for exhaustive handling at the
/// persistence boundary. Scoped to one scrape invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PersonalRecord {
    Grade(GradeEntry),
    Ips(IpsCourse),
    Hold(HoldOrder),
    Enrolled(EnrolledClass),
}

/// Records that carry a course code, so crawl aggregates can build
/// prefix histograms without knowing the concrete record type.
pub trait HasCourseCode {
    fn course_code(&self) -> &str;
}

impl HasCourseCode for ScheduleSection {
    fn course_code(&self) -> &str {
        &self.course_code
    }
}

impl HasCourseCode for CurriculumCourse {
    fn course_code(&self) -> &str {
        &self.course_code
    }
}

/// Leading alphabetic prefix of a course code ("LLAW 113" -> "LLAW").
pub fn code_prefix(code: &str) -> &str {
    let end = code
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(code.len());
    &code[..end]
}

/// What one completed work item contributed to a crawl batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeptObservation {
    pub count: usize,
    /// Course-code prefix histogram, in first-seen order.
    pub prefixes: IndexMap<String, usize>,
}

impl DeptObservation {
    pub fn observe(&mut self, code: &str) {
        self.count += 1;
        let prefix = code_prefix(code);
        if !prefix.is_empty() {
            *self.prefixes.entry(prefix.to_string()).or_insert(0) += 1;
        }
    }
}

/// Aggregate result of one orchestrator run, consumed by the Regression
/// Guard and the external persistence collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlBatchResult {
    pub term: TermCode,
    pub departments: IndexMap<String, DeptObservation>,
    /// Items that errored, with the error text. Excluded from `departments`.
    pub failed: Vec<(String, String)>,
    /// Items skipped because the crawl was cancelled mid-batch.
    pub cancelled: Vec<String>,
    /// Concurrency in force for each batch, in order. Useful for auditing
    /// the adaptive backoff behavior.
    pub concurrency_trace: Vec<usize>,
    #[serde(skip)]
    pub duration: Duration,
}
