//! Per-principal record extractors: grades, individual plan of study,
//! hold orders, enrolled classes.
//!
//! Same header-keyword table discovery as the schedule extractor. Holds and
//! IPS pages render a prose sentence instead of a table when the principal
//! has no data; that is a valid zero-result outcome
//! ([`Extraction::ExplicitEmpty`]), not an error and not a missing table.

use html_scraper::Html;
use tracing::debug;

use super::{Extraction, cell_texts, data_rows, find_table_by_keywords, has_no_data_notice};
use crate::model::{EnrolledClass, GradeEntry, HoldOrder, IpsCourse, IpsStatus};
use crate::normalize::{normalize_course_code, normalize_instructor_name};

/// Extract grade rows from a grades response.
pub fn extract_grades(html: &str) -> Extraction<GradeEntry> {
    let doc = Html::parse_document(html);
    let Some(table) = find_table_by_keywords(&doc, &["course", "subject"], &["grade"]) else {
        if has_no_data_notice(&doc) {
            return Extraction::ExplicitEmpty;
        }
        debug!("no grades table found");
        return Extraction::TableMissing;
    };

    let mut grades = Vec::new();
    for row in data_rows(table) {
        let cells = cell_texts(row);
        let Some(raw_code) = cells.first().filter(|c| !c.is_empty()) else {
            continue;
        };
        grades.push(GradeEntry {
            course_code: normalize_course_code(raw_code),
            title: cells.get(1).cloned().unwrap_or_default(),
            units: cells.get(2).and_then(|u| u.parse().ok()).unwrap_or(0.0),
            grade: cells.get(3).cloned().unwrap_or_default(),
        });
    }
    Extraction::Records(grades)
}

/// Extract individual-plan-of-study rows.
///
/// Rows whose status text is unrecognized are skipped rather than failing
/// the whole page.
pub fn extract_ips(html: &str) -> Extraction<IpsCourse> {
    let doc = Html::parse_document(html);
    let Some(table) = find_table_by_keywords(&doc, &["course", "subject"], &["status"]) else {
        if has_no_data_notice(&doc) {
            return Extraction::ExplicitEmpty;
        }
        debug!("no IPS table found");
        return Extraction::TableMissing;
    };

    let mut courses = Vec::new();
    for row in data_rows(table) {
        let cells = cell_texts(row);
        let Some(raw_code) = cells.first().filter(|c| !c.is_empty()) else {
            continue;
        };
        let Some(status) = cells.get(3).and_then(|s| IpsStatus::parse(s)) else {
            continue;
        };
        courses.push(IpsCourse {
            course_code: normalize_course_code(raw_code),
            title: cells.get(1).cloned().unwrap_or_default(),
            units: cells.get(2).and_then(|u| u.parse().ok()).unwrap_or(0.0),
            status,
        });
    }
    Extraction::Records(courses)
}

/// Extract hold orders.
pub fn extract_holds(html: &str) -> Extraction<HoldOrder> {
    let doc = Html::parse_document(html);
    let Some(table) = find_table_by_keywords(&doc, &["office", "hold"], &["reason"]) else {
        if has_no_data_notice(&doc) {
            return Extraction::ExplicitEmpty;
        }
        debug!("no hold-order table found");
        return Extraction::TableMissing;
    };

    let mut holds = Vec::new();
    for row in data_rows(table) {
        let cells = cell_texts(row);
        let Some(office) = cells.first().filter(|c| !c.is_empty()) else {
            continue;
        };
        holds.push(HoldOrder {
            office: office.clone(),
            reason: cells.get(1).cloned().unwrap_or_default(),
            date_imposed: cells.get(2).cloned().unwrap_or_default(),
        });
    }
    Extraction::Records(holds)
}

/// Extract the principal's currently enrolled classes.
pub fn extract_enrolled(html: &str) -> Extraction<EnrolledClass> {
    let doc = Html::parse_document(html);
    let Some(table) = find_table_by_keywords(&doc, &["subject", "course"], &["section"]) else {
        if has_no_data_notice(&doc) {
            return Extraction::ExplicitEmpty;
        }
        debug!("no enrolled-classes table found");
        return Extraction::TableMissing;
    };

    let mut classes = Vec::new();
    for row in data_rows(table) {
        let cells = cell_texts(row);
        let Some(raw_code) = cells.first().filter(|c| !c.is_empty()) else {
            continue;
        };
        classes.push(EnrolledClass {
            course_code: normalize_course_code(raw_code),
            section: cells.get(1).cloned().unwrap_or_default(),
            schedule: cells.get(2).cloned().unwrap_or_default(),
            instructor: cells
                .get(3)
                .map(|i| normalize_instructor_name(i))
                .filter(|i| !i.is_empty()),
        });
    }
    Extraction::Records(classes)
}
