//! Invoice field location module.

mod line_items;
mod locator;
mod normalize;
pub mod patterns;

pub use line_items::{extract_line_items, LineItemTable};
pub use locator::{extract_with_patterns, FieldLocator, EXTRACTION_METHOD};
pub use normalize::{normalize_lines, normalize_text};
pub use patterns::InvoiceField;
