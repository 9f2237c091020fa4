//! Best-effort line-item table extraction.

use tracing::debug;

use super::patterns::{LINE_ITEM_HEADING, LINE_ITEM_ROW, SUMMARY_LINE};
use crate::models::invoice::LineItem;

/// Outcome of looking for a line-item table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineItemTable {
    /// No table heading was found.
    NotFound,
    /// A heading was found; rows may still be empty.
    Found(Vec<LineItem>),
}

impl LineItemTable {
    /// Rows of the table, `None` when no table was found.
    pub fn into_items(self) -> Option<Vec<LineItem>> {
        match self {
            LineItemTable::NotFound => None,
            LineItemTable::Found(items) => Some(items),
        }
    }
}

/// Scan normalized lines for a line-item table.
///
/// Rows are read from the line after the heading up to the first totals
/// line; lines that do not look like a row are skipped.
pub fn extract_line_items<S: AsRef<str>>(lines: &[S]) -> LineItemTable {
    let Some(heading) = lines
        .iter()
        .position(|line| LINE_ITEM_HEADING.is_match(line.as_ref()))
    else {
        return LineItemTable::NotFound;
    };

    let items: Vec<LineItem> = lines[heading + 1..]
        .iter()
        .map(|line| line.as_ref())
        .take_while(|line| !SUMMARY_LINE.is_match(line))
        .filter_map(parse_row)
        .collect();

    if items.is_empty() {
        debug!("Line-item heading found without matching rows");
    }

    LineItemTable::Found(items)
}

fn parse_row(line: &str) -> Option<LineItem> {
    let caps = LINE_ITEM_ROW.captures(line)?;
    Some(LineItem {
        description: caps[1].trim().to_string(),
        qty: caps[2].to_string(),
        unit_price: caps[3].to_string(),
        line_total: caps[4].to_string(),
    })
}
