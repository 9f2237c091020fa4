//! Record completion, formatting and schema validation.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, ValidationError};
use crate::models::invoice::{InvoiceRecord, ValidationIssue, LINE_ITEMS_FIELD};

use super::format::{format_currency, format_date};
use super::schema::SchemaDescriptor;

/// Validates invoice records against a schema.
///
/// Violations are recorded in the record metadata; only strict mode turns
/// them into errors.
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    schema: SchemaDescriptor,
    strict_mode: bool,
}

impl SchemaValidator {
    /// Create a non-strict validator for `schema`.
    pub fn new(schema: SchemaDescriptor) -> Self {
        Self {
            schema,
            strict_mode: false,
        }
    }

    /// Set strict mode.
    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    /// Validate a record, returning a completed and formatted copy.
    ///
    /// Missing required fields are filled with type defaults and reported
    /// as errors. Fields are never removed.
    pub fn validate(&self, record: &InvoiceRecord) -> Result<InvoiceRecord> {
        info!("Validating extracted invoice data against schema");

        let mut validated = record.clone();
        let report = &mut validated.metadata.validation;
        report.validation_passed = None;
        report.validation_errors.clear();
        report.validation_warnings.clear();

        self.complete_required(&mut validated);
        self.format_fields(&mut validated);
        self.collect_warnings(&mut validated);

        let instance = validated.to_value_without_metadata();
        match self.schema.check(&instance) {
            None => {
                info!("Schema validation passed");
                validated.metadata.validation.validation_passed = Some(true);
            }
            Some(violation) => {
                warn!(
                    "Schema validation failed: {} - {}",
                    violation.path, violation.message
                );
                if self.strict_mode {
                    return Err(ValidationError::Strict {
                        path: violation.path,
                        message: violation.message,
                    }
                    .into());
                }
                let report = &mut validated.metadata.validation;
                report.validation_passed = Some(false);
                report.validation_errors.push(violation);
            }
        }

        Ok(validated)
    }

    fn complete_required(&self, record: &mut InvoiceRecord) {
        for field in self.schema.required() {
            if record.contains(field) {
                continue;
            }

            let message = format!("Required field '{}' is missing", field);
            warn!("{}", message);

            let default = if field == LINE_ITEMS_FIELD {
                Value::Array(Vec::new())
            } else {
                self.schema.default_for(field)
            };
            if record.insert(field.clone(), default) {
                record
                    .metadata
                    .validation
                    .validation_errors
                    .push(ValidationIssue::new(field.clone(), message));
            }
        }
    }

    fn format_fields(&self, record: &mut InvoiceRecord) {
        for (name, value) in record.fields.iter_mut() {
            if !self.schema.declares(name) {
                continue;
            }
            let Value::String(text) = value else {
                continue;
            };

            let formatted = if name == "issue_date" {
                format_date(text)
            } else if is_currency_field(name) {
                format_currency(text)
            } else {
                continue;
            };

            if formatted != *text {
                debug!("Formatted {}: {} -> {}", name, text, formatted);
                *text = formatted;
            }
        }
    }

    fn collect_warnings(&self, record: &mut InvoiceRecord) {
        let mut undeclared: Vec<String> = record
            .fields
            .keys()
            .filter(|name| !self.schema.declares(name))
            .cloned()
            .collect();
        if record.line_items.is_some() && !self.schema.declares(LINE_ITEMS_FIELD) {
            undeclared.push(LINE_ITEMS_FIELD.to_string());
        }

        for name in undeclared {
            debug!("Field {} is not declared in the schema", name);
            let message = format!("Field '{}' is not declared in the schema", name);
            record
                .metadata
                .validation
                .validation_warnings
                .push(ValidationIssue::new(name, message));
        }
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new(SchemaDescriptor::default_invoice())
    }
}

fn is_currency_field(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("total") || lower.contains("price") || lower == "vat_amount"
}
