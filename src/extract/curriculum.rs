//! Curriculum page extractor.
//!
//! Year and semester are not attributes of a course row: they appear as
//! labels elsewhere in the DOM, positioned before the course tables they
//! govern. A single pass over the rows in document order with running
//! (year, semester) state is therefore required, since processing tables out of
//! order would misattribute courses. The rules live in
//! [`YearSemesterTracker`] so they stay auditable in isolation from HTML.
//!
//! Graduate curricula carry no year headings at all and are routed to a
//! flat parse that assigns year 0 / semester 0 throughout.

use ego_tree::NodeId;
use html_scraper::{ElementRef, Html, Selector};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, trace};

use super::{Extraction, cell_texts, row_text};
use crate::model::CurriculumCourse;
use crate::normalize::{collapse_whitespace, normalize_course_code};

const COL_CODE: usize = 0;
const COL_TITLE: usize = 1;
const COL_UNITS: usize = 2;
const COL_PREREQ: usize = 3;
const COL_CATEGORY: usize = 4;

static TABLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(first|second|third|fourth|fifth)\s+year\b").unwrap()
});

static SEMESTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(first|second)\s+semester|intersession)\b").unwrap()
});

/// Running (year, semester) state for the document-order pass.
///
/// A year label sets the year and resets the semester to 1; a semester
/// label updates the semester alone. Labels are matched against the first
/// line of a row's text only, since an ancestor row's text includes
/// everything nested under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearSemesterTracker {
    pub year: u8,
    pub semester: u8,
}

impl YearSemesterTracker {
    pub fn new() -> Self {
        Self {
            year: 0,
            semester: 0,
        }
    }

    /// Feed one label candidate. Returns true if the state changed.
    pub fn observe(&mut self, first_line: &str) -> bool {
        if let Some(caps) = YEAR_RE.captures(first_line) {
            self.year = match caps[1].to_ascii_lowercase().as_str() {
                "first" => 1,
                "second" => 2,
                "third" => 3,
                "fourth" => 4,
                _ => 5,
            };
            // A new year resets semester tracking until a label is seen.
            self.semester = 1;
            return true;
        }
        if let Some(caps) = SEMESTER_RE.captures(first_line) {
            self.semester = match caps.get(1).map(|m| m.as_str().to_ascii_lowercase()) {
                Some(s) if s == "first" => 1,
                Some(_) => 2,
                None => 0, // intersession
            };
            return true;
        }
        false
    }
}

impl Default for YearSemesterTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract curriculum courses from one curriculum response.
pub fn extract_curriculum(html: &str, degree_code: &str) -> Extraction<CurriculumCourse> {
    let doc = Html::parse_document(html);

    let course_row_ids = course_data_row_ids(&doc);
    if course_row_ids.is_empty() {
        debug!(degree = degree_code, "no curriculum course table found");
        return Extraction::TableMissing;
    }

    // Graduate curricula have no year heading anywhere in the document.
    let structured = doc
        .select(&ROW_SEL)
        .any(|row| first_text_line(row).is_some_and(|l| YEAR_RE.is_match(&l)));

    let mut tracker = YearSemesterTracker::new();
    let mut courses = Vec::new();

    for row in doc.select(&ROW_SEL) {
        if course_row_ids.contains(&row.id()) {
            if let Some(course) = parse_course_row(row, degree_code, &tracker, structured) {
                courses.push(course);
            }
        } else if structured
            && let Some(line) = first_text_line(row)
        {
            tracker.observe(&line);
        }
    }

    trace!(
        degree = degree_code,
        count = courses.len(),
        structured,
        "curriculum rows extracted"
    );
    Extraction::Records(courses)
}

/// Node ids of the data rows of every course table in the document.
///
/// A course table's header row must contain a "course"-like and a
/// "units"-like token. Header rows are excluded from the returned set.
fn course_data_row_ids(doc: &Html) -> HashSet<NodeId> {
    let mut ids = HashSet::new();
    for table in doc.select(&TABLE_SEL) {
        let mut rows = table.select(&ROW_SEL);
        let Some(header) = rows.next() else { continue };
        let header_text = row_text(header).to_ascii_lowercase();
        if !(header_text.contains("course") && header_text.contains("unit")) {
            continue;
        }
        for row in rows {
            // Nested tables re-yield their rows under the outer table's
            // selector; dedup happens naturally since ids are a set, but a
            // row containing a whole table is never a data row.
            if row.select(&TABLE_SEL).next().is_none() {
                ids.insert(row.id());
            }
        }
    }
    ids
}

fn parse_course_row(
    row: ElementRef<'_>,
    degree_code: &str,
    tracker: &YearSemesterTracker,
    structured: bool,
) -> Option<CurriculumCourse> {
    let cells = cell_texts(row);
    let raw_code = cells.get(COL_CODE)?;
    if raw_code.is_empty() {
        return None;
    }

    let (year, semester) = if structured {
        (tracker.year, tracker.semester)
    } else {
        (0, 0)
    };

    Some(CurriculumCourse {
        degree_code: degree_code.to_string(),
        course_code: normalize_course_code(raw_code),
        title: cells.get(COL_TITLE).cloned().unwrap_or_default(),
        units: cells
            .get(COL_UNITS)
            .and_then(|u| u.parse().ok())
            .unwrap_or(0.0),
        prerequisite_text: cells.get(COL_PREREQ).cloned().unwrap_or_default(),
        year,
        semester,
        category: cells.get(COL_CATEGORY).cloned().unwrap_or_default(),
    })
}

/// First non-blank text chunk of a row, collapsed.
///
/// For a label row this is the label itself; for a row that wraps nested
/// content the label still comes first in document order.
fn first_text_line(row: ElementRef<'_>) -> Option<String> {
    row.text()
        .find(|chunk| !chunk.trim().is_empty())
        .map(collapse_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course_table(rows: &[(&str, &str, &str)]) -> String {
        let mut html = String::from(
            "<table><tr><th>Course No</th><th>Course Title</th><th>Units</th>\
             <th>Prerequisites</th><th>Category</th></tr>",
        );
        for (code, title, units) in rows {
            html.push_str(&format!(
                "<tr><td>{code}</td><td>{title}</td><td>{units}</td><td></td><td>CORE</td></tr>"
            ));
        }
        html.push_str("</table>");
        html
    }

    // --- YearSemesterTracker ---

    #[test]
    fn test_tracker_year_resets_semester() {
        let mut t = YearSemesterTracker::new();
        assert!(t.observe("First Year"));
        assert!(t.observe("Second Semester"));
        assert_eq!((t.year, t.semester), (1, 2));

        assert!(t.observe("Second Year"));
        assert_eq!((t.year, t.semester), (2, 1));
    }

    #[test]
    fn test_tracker_intersession() {
        let mut t = YearSemesterTracker::new();
        t.observe("Third Year");
        assert!(t.observe("Intersession"));
        assert_eq!((t.year, t.semester), (3, 0));
    }

    #[test]
    fn test_tracker_ignores_unrelated_text() {
        let mut t = YearSemesterTracker::new();
        assert!(!t.observe("Bachelor of Science in Computer Science"));
        assert!(!t.observe("PHILO 101"));
        assert_eq!((t.year, t.semester), (0, 0));
    }

    // --- extract_curriculum ---

    #[test]
    fn test_curriculum_year_semester_inference() {
        let html = format!(
            r#"<html><body><table>
                <tr><td>First Year</td></tr>
                <tr><td>First Semester{t1}</td></tr>
                <tr><td>Second Semester{t2}</td></tr>
                <tr><td>Second Year</td></tr>
                <tr><td>{t3}</td></tr>
            </table></body></html>"#,
            t1 = course_table(&[("EN 11", "Communication I", "3")]),
            t2 = course_table(&[("EN 12", "Communication II", "3")]),
            t3 = course_table(&[("MA 21", "Calculus", "5")]),
        );
        let courses = extract_curriculum(&html, "BS CS").into_records();
        assert_eq!(courses.len(), 3);

        assert_eq!(courses[0].course_code, "EN 11");
        assert_eq!((courses[0].year, courses[0].semester), (1, 1));

        assert_eq!(courses[1].course_code, "EN 12");
        assert_eq!((courses[1].year, courses[1].semester), (1, 2));

        // "Second Year" resets semester tracking to 1 before any label.
        assert_eq!(courses[2].course_code, "MA 21");
        assert_eq!((courses[2].year, courses[2].semester), (2, 1));
    }

    #[test]
    fn test_curriculum_intersession_semester_zero() {
        let html = format!(
            r#"<html><body><table>
                <tr><td>Second Year</td></tr>
                <tr><td>Intersession{t}</td></tr>
            </table></body></html>"#,
            t = course_table(&[("PE 103", "Swimming", "0")]),
        );
        let courses = extract_curriculum(&html, "BS CS").into_records();
        assert_eq!(courses.len(), 1);
        assert_eq!((courses[0].year, courses[0].semester), (2, 0));
    }

    #[test]
    fn test_curriculum_graduate_flat_parse() {
        // No year heading anywhere: graduate program, everything (0, 0).
        let html = format!(
            "<html><body><p>Master of Laws</p>{t1}{t2}</body></html>",
            t1 = course_table(&[("LLAW 201", "Jurisprudence", "3")]),
            t2 = course_table(&[("LLAW 305", "Legal Writing", "2")]),
        );
        let courses = extract_curriculum(&html, "LLM").into_records();
        assert_eq!(courses.len(), 2);
        assert!(courses.iter().all(|c| c.year == 0 && c.semester == 0));
    }

    #[test]
    fn test_curriculum_normalizes_course_codes() {
        let html = format!(
            "<html><body><table><tr><td>First Year</td></tr><tr><td>First Semester{t}</td></tr></table></body></html>",
            t = course_table(&[("llaw 11312018", "Obligations", "3")]),
        );
        let courses = extract_curriculum(&html, "JD").into_records();
        assert_eq!(courses[0].course_code, "LLAW 113");
    }

    #[test]
    fn test_curriculum_no_table_is_missing() {
        let html = "<html><body><p>Select a degree program.</p></body></html>";
        assert!(extract_curriculum(html, "BS CS").is_table_missing());
    }

    #[test]
    fn test_curriculum_skips_blank_code_rows() {
        let html = format!(
            "<html><body><p>Master of Laws</p>{t}</body></html>",
            t = course_table(&[("", "", ""), ("LLAW 201", "Jurisprudence", "3")]),
        );
        let courses = extract_curriculum(&html, "LLM").into_records();
        assert_eq!(courses.len(), 1);
    }
}
