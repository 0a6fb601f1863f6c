//! Class-schedule results extractor.
//!
//! The results table is located by header keywords (a "subject"-like and a
//! "section"-like token must both appear) because the portal does not
//! guarantee table order. Column positions are fixed once the table is
//! found. Day/time strings use compact day-letter codes that must be
//! exploded into individual weekday entries.

use html_scraper::Html;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, trace};

use super::{Extraction, cell_texts, data_rows, find_table_by_keywords};
use crate::model::{ScheduleSection, ScheduleSlot};
use crate::normalize::{normalize_course_code, normalize_instructor_name};

/// Fixed column positions within the discovered results table.
const COL_CODE: usize = 0;
const COL_SECTION: usize = 1;
const COL_TITLE: usize = 2;
const COL_UNITS: usize = 3;
const COL_TIME: usize = 4;
const COL_ROOM: usize = 5;
const COL_INSTRUCTOR: usize = 6;
const COL_CAPACITY: usize = 7;
const COL_FREE: usize = 8;
const COL_REMARKS: usize = 9;
const COL_PREREQ: usize = 10;

/// `DAYS HHMM-HHMM` followed by zero or more parenthesized annotations.
static SLOT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<days>[A-Z][A-Z\-]*)\s+(?P<start>\d{3,4})-(?P<end>\d{3,4})(?P<rest>.*)$")
        .unwrap()
});

static ANNOTATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^)]*)\)").unwrap());

/// Extract schedule sections from one class-schedule response.
///
/// Never fails: a response without a recognizable results table yields
/// [`Extraction::TableMissing`]; malformed rows are skipped.
pub fn extract_schedule(html: &str, term: &str, dept: &str) -> Extraction<ScheduleSection> {
    let doc = Html::parse_document(html);

    let Some(table) = find_table_by_keywords(&doc, &["subject"], &["section"]) else {
        debug!(term, dept, "no schedule results table found");
        return Extraction::TableMissing;
    };

    let mut sections = Vec::new();
    for row in data_rows(table) {
        let cells = cell_texts(row);
        let code = match cells.get(COL_CODE) {
            Some(c) if !c.is_empty() => normalize_course_code(c),
            _ => continue,
        };
        let section = cells.get(COL_SECTION).cloned().unwrap_or_default();
        if section.is_empty() {
            continue;
        }

        let room = cells.get(COL_ROOM).map(String::as_str).unwrap_or("");
        let instructor = cells
            .get(COL_INSTRUCTOR)
            .map(|i| normalize_instructor_name(i))
            .filter(|i| !i.is_empty() && i != "TBA");

        sections.push(ScheduleSection {
            course_code: code,
            section,
            title: cells.get(COL_TITLE).cloned().unwrap_or_default(),
            units: cells
                .get(COL_UNITS)
                .and_then(|u| u.parse().ok())
                .unwrap_or(0.0),
            instructor,
            capacity: cells
                .get(COL_CAPACITY)
                .and_then(|c| c.parse().ok())
                .unwrap_or(0),
            free_slots: cells
                .get(COL_FREE)
                .and_then(|c| c.parse().ok())
                .unwrap_or(0),
            slots: parse_slots(cells.get(COL_TIME).map(String::as_str).unwrap_or(""), room),
            remarks: cells.get(COL_REMARKS).cloned().unwrap_or_default(),
            has_prerequisite: cells
                .get(COL_PREREQ)
                .map(|p| !p.is_empty())
                .unwrap_or(false),
        });
    }

    trace!(term, dept, count = sections.len(), "schedule rows extracted");
    Extraction::Records(sections)
}

/// Parse a time cell into meeting slots.
///
/// Multiple slot groups are separated by `;` ("M-TH 0800-0930 (ONLINE); F
/// 1000-1100"). The room cell may carry `;`-aligned values per group, or a
/// single value applying to every group. Unparseable groups (e.g. "TBA")
/// produce no slots.
fn parse_slots(time_cell: &str, room_cell: &str) -> Vec<ScheduleSlot> {
    let rooms: Vec<&str> = room_cell.split(';').map(str::trim).collect();
    let mut slots = Vec::new();

    for (group_idx, group) in time_cell.split(';').map(str::trim).enumerate() {
        let Some(caps) = SLOT_RE.captures(group) else {
            continue;
        };

        let annotations: Vec<String> = ANNOTATION_RE
            .captures_iter(&caps["rest"])
            .map(|a| a[1].trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        let modality = if annotations.is_empty() {
            "ONSITE".to_string()
        } else {
            annotations.join("/")
        };

        let room = rooms
            .get(group_idx)
            .or_else(|| rooms.first())
            .map(|r| r.to_string())
            .filter(|r| !r.is_empty());

        for day in expand_days(&caps["days"]) {
            slots.push(ScheduleSlot {
                day,
                start: caps["start"].to_string(),
                end: caps["end"].to_string(),
                room: room.clone(),
                modality: modality.clone(),
            });
        }
    }

    slots
}

/// Explode a compact day-letter code into full weekday names.
///
/// `-` is a separator, not a range: "M-TH" means Monday and Thursday. The
/// two-letter tokens TH and SU take priority over single-letter matches so
/// "TH" never parses as Tuesday + an unknown "H".
pub fn expand_days(code: &str) -> Vec<String> {
    let compact: String = code.chars().filter(char::is_ascii_alphabetic).collect();
    let bytes = compact.as_bytes();
    let mut days = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if compact[i..].starts_with("TH") {
            days.push("Thursday".to_string());
            i += 2;
        } else if compact[i..].starts_with("SU") {
            days.push("Sunday".to_string());
            i += 2;
        } else {
            let name = match bytes[i] {
                b'M' => Some("Monday"),
                b'T' => Some("Tuesday"),
                b'W' => Some("Wednesday"),
                b'F' => Some("Friday"),
                b'S' => Some("Saturday"),
                _ => None,
            };
            if let Some(name) = name {
                days.push(name.to_string());
            }
            i += 1;
        }
    }

    days
}
