//! Invoice record produced by field location and refined by validation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field names that are stored outside the flat field map.
pub const LINE_ITEMS_FIELD: &str = "line_items";
pub const METADATA_FIELD: &str = "metadata";

/// An extracted invoice.
///
/// Serializes as a flat JSON object: every extracted field at the top
/// level, plus optional `line_items` and a `metadata` object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    /// Extracted (and later validated) field values keyed by field name.
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,

    /// Table rows; `None` when no line-item table was found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_items: Option<Vec<LineItem>>,

    /// Provenance and validation results.
    #[serde(default)]
    pub metadata: RecordMetadata,
}

/// One row of the line-item table. Values are kept as found in the text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub qty: String,
    pub unit_price: String,
    pub line_total: String,
}

/// Metadata about how a record was produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Extraction method (e.g. `regex_heuristics`).
    #[serde(default)]
    pub extraction_method: String,

    /// When the fields were extracted.
    #[serde(default)]
    pub extraction_timestamp: DateTime<Utc>,

    /// Mean OCR confidence of the merged transcript.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f32>,

    /// OCR source (`primary` or `hybrid`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_engine: Option<String>,

    /// Input file name, when processed from a file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,

    /// Schema validation outcome.
    #[serde(flatten)]
    pub validation: ValidationReport,
}

/// Result of checking a record against its schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// `None` until the record has been validated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_passed: Option<bool>,

    #[serde(default)]
    pub validation_errors: Vec<ValidationIssue>,

    #[serde(default)]
    pub validation_warnings: Vec<ValidationIssue>,
}

/// A single validation error or warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Dotted path of the offending value, or `root`.
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl InvoiceRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the record carries a value for `name`.
    pub fn contains(&self, name: &str) -> bool {
        match name {
            LINE_ITEMS_FIELD => self.line_items.is_some(),
            METADATA_FIELD => true,
            _ => self.fields.contains_key(name),
        }
    }

    /// Get a field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Get a field value when it is a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Set a field value.
    ///
    /// `line_items` only accepts arrays of line items and `metadata` is
    /// never stored in the flat map; both return `false` when ignored.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> bool {
        let name = name.into();
        let value = value.into();
        match name.as_str() {
            LINE_ITEMS_FIELD => match serde_json::from_value::<Vec<LineItem>>(value) {
                Ok(items) => {
                    self.line_items = Some(items);
                    true
                }
                Err(_) => false,
            },
            METADATA_FIELD => false,
            _ => {
                self.fields.insert(name, value);
                true
            }
        }
    }

    /// Number of extracted top-level fields, line items included.
    pub fn field_count(&self) -> usize {
        self.fields.len() + usize::from(self.line_items.is_some())
    }

    /// JSON view of the record without its metadata, as checked by the
    /// schema validator.
    pub fn to_value_without_metadata(&self) -> Value {
        let mut object = serde_json::Map::new();
        for (name, value) in &self.fields {
            object.insert(name.clone(), value.clone());
        }
        if let Some(items) = &self.line_items {
            let items = items
                .iter()
                .map(|item| {
                    serde_json::json!({
                        "description": item.description,
                        "qty": item.qty,
                        "unit_price": item.unit_price,
                        "line_total": item.line_total,
                    })
                })
                .collect();
            object.insert(LINE_ITEMS_FIELD.to_string(), Value::Array(items));
        }
        Value::Object(object)
    }
}
