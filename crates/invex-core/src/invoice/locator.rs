//! Regex-driven field locator.

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, info};

use crate::models::invoice::InvoiceRecord;

use super::line_items::extract_line_items;
use super::normalize::{normalize_lines, normalize_text};
use super::patterns::{InvoiceField, FIELD_PATTERNS};

/// Extraction method recorded in record metadata.
pub const EXTRACTION_METHOD: &str = "regex_heuristics";

/// Locates invoice fields in OCR text using ordered heuristic patterns.
#[derive(Debug, Clone)]
pub struct FieldLocator {
    /// Whether to look for a line-item table.
    detect_line_items: bool,
}

impl FieldLocator {
    /// Create a locator with line-item detection enabled.
    pub fn new() -> Self {
        Self {
            detect_line_items: true,
        }
    }

    /// Enable or disable line-item detection.
    pub fn with_line_items(mut self, detect: bool) -> Self {
        self.detect_line_items = detect;
        self
    }

    /// Compiled patterns for `field`, in priority order.
    pub fn patterns_for(field: InvoiceField) -> &'static [Regex] {
        FIELD_PATTERNS
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, patterns)| patterns.as_slice())
            .unwrap_or(&[])
    }

    /// Extract fields, stamping the current time.
    pub fn extract_fields(&self, text: &str) -> InvoiceRecord {
        self.extract_fields_at(text, Utc::now())
    }

    /// Extract fields with an explicit extraction timestamp.
    pub fn extract_fields_at(&self, text: &str, timestamp: DateTime<Utc>) -> InvoiceRecord {
        debug!("Extracting fields from {} characters of OCR text", text.len());
        let normalized = normalize_text(text);

        let mut record = InvoiceRecord::new();
        for (field, patterns) in FIELD_PATTERNS.iter() {
            if let Some(value) = extract_with_patterns(&normalized, patterns) {
                debug!("Extracted {}: {}", field, value);
                record.insert(field.as_str(), value);
            }
        }

        if self.detect_line_items {
            record.line_items = extract_line_items(&normalize_lines(text)).into_items();
            if let Some(items) = &record.line_items {
                debug!("Extracted {} line items", items.len());
            }
        }

        record.metadata.extraction_method = EXTRACTION_METHOD.to_string();
        record.metadata.extraction_timestamp = timestamp;

        info!("Extracted {} invoice fields", record.field_count());
        record
    }
}

impl Default for FieldLocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Return the trimmed group 1 of the first pattern that yields a
/// non-empty value.
pub fn extract_with_patterns(text: &str, patterns: &[Regex]) -> Option<String> {
    patterns.iter().find_map(|pattern| {
        let caps = pattern.captures(text)?;
        let value = caps.get(1)?.as_str().trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::invoice::LineItem;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = "ACME SOLUCIONES S.L.\n\
        CIF: B12345678\n\
        Calle Mayor 1, Madrid\n\
        FACTURA Nº: F2023-1234\n\
        Fecha: 15/06/2023\n\
        Cliente: Juan Pérez\n\
        NIF: 12345678Z\n\
        Descripción Cantidad Precio Total\n\
        Diseño web 1 800,00 € 800,00 €\n\
        Hosting anual 2 100,00 € 200,00 €\n\
        Subtotal: 1.000,00 €\n\
        IVA 21%: 210,00 €\n\
        Total: 1.210,00 €\n\
        Forma de pago: Transferencia bancaria\n";

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_invoice_number_with_colon() {
        let record = FieldLocator::new().extract_fields("Factura Nº: F2023-1234");
        assert_eq!(record.get_str("invoice_number"), Some("F2023-1234"));
        assert_eq!(record.fields.len(), 1);
        assert_eq!(record.line_items, None);
    }

    #[test]
    fn test_full_sample() {
        let record = FieldLocator::new().extract_fields_at(SAMPLE, fixed_time());

        assert_eq!(record.get_str("invoice_number"), Some("F2023-1234"));
        assert_eq!(record.get_str("issue_date"), Some("15/06/2023"));
        assert_eq!(record.get_str("total_eur"), Some("1.210,00"));
        assert_eq!(record.get_str("vat_rate"), Some("21%"));
        assert_eq!(record.get_str("vat_amount"), Some("210,00"));
        assert_eq!(record.get_str("vendor_name"), Some("ACME SOLUCIONES S.L."));
        assert_eq!(record.get_str("vendor_tax_id"), Some("B12345678"));
        assert_eq!(record.get_str("buyer_name"), Some("Juan Pérez"));
        assert_eq!(
            record.get_str("payment_terms"),
            Some("Transferencia bancaria")
        );

        let items = record.line_items.as_ref().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0],
            LineItem {
                description: "Diseño web".to_string(),
                qty: "1".to_string(),
                unit_price: "800,00".to_string(),
                line_total: "800,00".to_string(),
            }
        );

        assert_eq!(record.metadata.extraction_method, EXTRACTION_METHOD);
        assert_eq!(record.metadata.extraction_timestamp, fixed_time());
    }

    #[test]
    fn test_deterministic_with_fixed_timestamp() {
        let locator = FieldLocator::new();
        let first = locator.extract_fields_at(SAMPLE, fixed_time());
        let second = locator.extract_fields_at(SAMPLE, fixed_time());
        assert_eq!(first, second);
    }

    #[test]
    fn test_line_items_disabled() {
        let record = FieldLocator::new()
            .with_line_items(false)
            .extract_fields(SAMPLE);
        assert_eq!(record.line_items, None);
    }

    #[test]
    fn test_heading_without_rows_yields_empty_list() {
        let text = "Factura Nº F-7\nConcepto Cantidad Precio Total\nTotal: 0,00 €";
        let record = FieldLocator::new().extract_fields(text);
        assert_eq!(record.line_items, Some(Vec::new()));
    }

    #[test]
    fn test_only_table_fields_emitted() {
        let record = FieldLocator::new().extract_fields(SAMPLE);
        for name in record.fields.keys() {
            assert!(InvoiceField::from_name(name).is_some(), "unexpected {}", name);
        }
    }

    #[test]
    fn test_empty_text() {
        let record = FieldLocator::new().extract_fields("");
        assert!(record.fields.is_empty());
        assert_eq!(record.line_items, None);
    }

    #[test]
    fn test_extract_with_patterns() {
        let patterns = FieldLocator::patterns_for(InvoiceField::InvoiceNumber);
        assert_eq!(
            extract_with_patterns("Factura Nº : ABC123", patterns),
            Some("ABC123".to_string())
        );
        assert_eq!(extract_with_patterns("Document ID : ABC123", patterns), None);
    }

    #[test]
    fn test_english_labels() {
        let text = "Invoice number: INV-42\nInvoice date: 03-02-2024\nTotal: 99.50 EUR\nVAT rate: 20%";
        let record = FieldLocator::new().extract_fields(text);
        assert_eq!(record.get_str("invoice_number"), Some("INV-42"));
        assert_eq!(record.get_str("issue_date"), Some("03-02-2024"));
        assert_eq!(record.get_str("total_eur"), Some("99.50"));
        assert_eq!(record.get_str("vat_rate"), Some("20%"));
    }
}
