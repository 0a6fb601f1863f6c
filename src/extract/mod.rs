//! Heuristic extraction of tabular data from inconsistent portal HTML.
//!
//! The portal has no stable markup contract: table order, column count, and
//! surrounding structure vary by academic level, curriculum era, and page
//! state. Extractors therefore locate tables by header keywords rather than
//! position, tolerate missing cells, and never fail: a malformed response
//! degrades to [`Extraction::TableMissing`] and the Regression Guard catches
//! systemic breakage at the batch level.

pub mod curriculum;
pub mod personal;
pub mod schedule;

use html_scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

use crate::normalize::collapse_whitespace;

/// Three-way extraction outcome.
///
/// The distinction between "no matching table anywhere" and "table found
/// with zero rows" and "the portal rendered a prose no-data sentence" is
/// load-bearing: the Regression Guard must tell "portal returned nothing"
/// apart from "legitimately no holds/grades".
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction<T> {
    /// A matching table was found; zero rows is a valid outcome.
    Records(Vec<T>),
    /// The portal rendered its prose "no data" page instead of a table.
    ExplicitEmpty,
    /// No matching table anywhere in the document. Possible contract
    /// breakage; counts as zero records but is distinguishable.
    TableMissing,
}

impl<T> Extraction<T> {
    /// Records if present, empty slice otherwise.
    pub fn records(&self) -> &[T] {
        match self {
            Self::Records(v) => v,
            _ => &[],
        }
    }

    pub fn into_records(self) -> Vec<T> {
        match self {
            Self::Records(v) => v,
            _ => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    pub fn is_table_missing(&self) -> bool {
        matches!(self, Self::TableMissing)
    }
}

static TABLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th, td").unwrap());

/// Locate the first table whose header row contains at least one token from
/// each keyword group (case-insensitive substring match).
///
/// Table order is not guaranteed by the portal (layout tables, navigation
/// tables, and the result table appear in varying order), so discovery by
/// header content is the only reliable strategy.
pub fn find_table_by_keywords<'a>(
    html: &'a Html,
    group_a: &[&str],
    group_b: &[&str],
) -> Option<ElementRef<'a>> {
    for table in html.select(&TABLE_SEL) {
        let Some(header_row) = table.select(&ROW_SEL).next() else {
            continue;
        };
        let header_text = row_text(header_row).to_ascii_lowercase();
        let hit_a = group_a.iter().any(|kw| header_text.contains(kw));
        let hit_b = group_b.iter().any(|kw| header_text.contains(kw));
        if hit_a && hit_b {
            return Some(table);
        }
    }
    None
}

/// Data rows of a table, skipping the header row.
pub fn data_rows(table: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    table.select(&ROW_SEL).skip(1)
}

/// Entity-decoded, whitespace-collapsed text of each cell in a row.
pub fn cell_texts(row: ElementRef<'_>) -> Vec<String> {
    row.select(&CELL_SEL)
        .map(|cell| {
            let raw: String = cell.text().collect();
            collapse_whitespace(&htmlize::unescape(&raw))
        })
        .collect()
}

/// Collapsed text of an entire row.
pub fn row_text(row: ElementRef<'_>) -> String {
    let raw: String = row.text().collect();
    collapse_whitespace(&htmlize::unescape(&raw))
}

/// Prose sentences the portal renders instead of a table when a principal
/// legitimately has no data. Matched case-insensitively against the whole
/// document text.
const NO_DATA_PHRASES: &[&str] = &[
    "no hold order",
    "no holds found",
    "no grades are available",
    "no records found",
    "you have no",
    "nothing to display",
];

/// True when the document carries a recognized "no data" notice.
pub fn has_no_data_notice(html: &Html) -> bool {
    let text: String = html.root_element().text().collect();
    let folded = collapse_whitespace(&text).to_ascii_lowercase();
    NO_DATA_PHRASES.iter().any(|p| folded.contains(p))
}
