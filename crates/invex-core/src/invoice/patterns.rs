//! Heuristic regex table for Spanish and English invoices.
//!
//! Patterns run against normalized text (single line, ` : ` around colons)
//! and always capture the field value in group 1.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

/// Invoice fields located by pattern, in extraction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvoiceField {
    InvoiceNumber,
    IssueDate,
    TotalEur,
    VatRate,
    VatAmount,
    VendorName,
    VendorTaxId,
    BuyerName,
    PaymentTerms,
}

impl InvoiceField {
    /// All fields in table order.
    pub const ALL: [InvoiceField; 9] = [
        InvoiceField::InvoiceNumber,
        InvoiceField::IssueDate,
        InvoiceField::TotalEur,
        InvoiceField::VatRate,
        InvoiceField::VatAmount,
        InvoiceField::VendorName,
        InvoiceField::VendorTaxId,
        InvoiceField::BuyerName,
        InvoiceField::PaymentTerms,
    ];

    /// Record key of the field.
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceField::InvoiceNumber => "invoice_number",
            InvoiceField::IssueDate => "issue_date",
            InvoiceField::TotalEur => "total_eur",
            InvoiceField::VatRate => "vat_rate",
            InvoiceField::VatAmount => "vat_amount",
            InvoiceField::VendorName => "vendor_name",
            InvoiceField::VendorTaxId => "vendor_tax_id",
            InvoiceField::BuyerName => "buyer_name",
            InvoiceField::PaymentTerms => "payment_terms",
        }
    }

    /// Look up a field by its record key.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == name)
    }
}

impl fmt::Display for InvoiceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Shared fragments, substituted into the patterns below.
const FRAGMENTS: [(&str, &str); 8] = [
    ("@ID", r"([A-Za-z0-9][A-Za-z0-9\-/]*)"),
    ("@DATE", r"(\d{1,2}[/\-]\d{1,2}[/\-]\d{2,4})"),
    (
        "@AMOUNT",
        r"(\d{1,3}(?:[ .]\d{3})+(?:[,.]\d{1,2})?|\d+(?:[,.]\d{1,2})?)",
    ),
    (
        "@DECIMAL",
        r"(\d{1,3}(?:[ .]\d{3})+[,.]\d{1,2}|\d+[,.]\d{1,2})",
    ),
    ("@RATE", r"(\d{1,2}(?:[,.]\d{1,2})?\s*%)"),
    ("@NAME", r"([\p{L}\p{N}][\p{L}\p{N}&.,'\- ]*?)"),
    (
        "@STOP",
        r"(?:\s+(?:nif|cif|dni|n\.i\.f|c\.i\.f|direcci[oó]n|domicilio|tel[eé]fono|tel|email|e-mail|address|cliente|factura|fecha|descripci[oó]n|concepto)\b|\s+\S+\s*:|\s*:|$)",
    ),
    ("@TAXID", r"\b([A-Z0-9]\d{7}[A-Z0-9])\b"),
];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| {
            let expanded = FRAGMENTS
                .iter()
                .fold(pattern.to_string(), |acc, (token, fragment)| {
                    acc.replace(token, fragment)
                });
            Regex::new(&format!("(?i){}", expanded)).unwrap()
        })
        .collect()
}

lazy_static! {
    /// Ordered pattern alternatives per field. The first pattern whose
    /// group 1 is non-empty wins.
    pub static ref FIELD_PATTERNS: Vec<(InvoiceField, Vec<Regex>)> = vec![
        (InvoiceField::InvoiceNumber, compile(&[
            r"\b(?:factura|fact|fra)\.?\s+n[º°o]?\.?(?:\s*:\s*|\s+)@ID",
            r"\bn[º°o]\.?\s*(?::\s*)?(?:factura|fact|fra)\b\.?\s*(?::\s*)?@ID",
            r"\bn[º°o]\.?\s*(?::\s*)?(?:de\s+factura|del\s+documento)\s*(?::\s*)?@ID",
            r"\b(?:n[úu]mero\s+de\s+factura|n[úu]m\.?\s+factura)\s*(?::\s*)?@ID",
            r"\binvoice\s+(?:number|no\.?|#)\s*(?::\s*)?@ID",
            r"\b(?:factura|fact|fra)\b[^:]{0,40}?:\s*@ID",
        ])),
        (InvoiceField::IssueDate, compile(&[
            r"\bfecha(?:(?:\s+de)?\s+(?:factura|emisi[oó]n|expedici[oó]n))?\s*(?::\s*)?@DATE",
            r"\b(?:invoice\s+date|emission\s+date|date)\s*(?::\s*)?@DATE",
            r"\bemitid[oa]\s+el\s*(?::\s*)?@DATE",
            r"\b(?:factura|fact|fra)\b.*?@DATE",
        ])),
        (InvoiceField::TotalEur, compile(&[
            r"\b(?:total\s+factura|importe\s+total|total\s+a\s+pagar|total)\s*(?::\s*)?@AMOUNT(?:\s*€|\s*EUR)?",
            r"\b(?:total|importe)\b.*?\b@AMOUNT\s*(?:€|EUR)",
            r"\ba\s+pagar\b.*?\b@AMOUNT",
            r"\b@AMOUNT\s*(?:€|EUR)\s*(?:total|a\s+pagar)\b",
        ])),
        (InvoiceField::VatRate, compile(&[
            r"(?:\biva\b|\bi\.v\.a\.?|\bimpuesto\b).*?\b@RATE",
            r"\b@RATE\s*(?:\biva\b|\bi\.v\.a\.?|\bimpuesto\b)",
            r"\btipo(?:\s+de)?\s+(?:iva|impuesto)\s*(?::\s*)?@RATE",
            r"\b(?:vat|tax)\s+rate\s*(?::\s*)?@RATE",
        ])),
        (InvoiceField::VatAmount, compile(&[
            r"(?:\biva\b|\bi\.v\.a\.?|\bimpuesto\b)(?:\s*\(?\s*\d{1,2}(?:[,.]\d{1,2})?\s*%\s*\)?)?\s*(?::\s*)?\b@DECIMAL",
            r"\bcuota(?:\s+de)?\s+(?:iva|impuesto)\b.*?\b@DECIMAL",
            r"\b(?:vat|tax)\s+amount\s*(?::\s*)?\b@AMOUNT",
        ])),
        (InvoiceField::VendorName, compile(&[
            r"\b(?:emisor|proveedor|vendedor|expedidor|vendor|seller|supplier)\b\s*(?::\s*)?@NAME@STOP",
            r"^([\p{L}][\p{L}\p{N}&.,'\- ]*?)\s+(?:nif|cif|n\.i\.f|c\.i\.f)\b",
        ])),
        (InvoiceField::VendorTaxId, compile(&[
            r"(?:\bnif\b|\bcif\b|\bn\.i\.f\.?|\bc\.i\.f\.?|\bdni\b).{0,30}?@TAXID",
            r"\b(?:tax\s+id|fiscal\s+id|id\s+fiscal)\b.{0,30}?@TAXID",
        ])),
        (InvoiceField::BuyerName, compile(&[
            r"\b(?:cliente|destinatario|comprador|receptor)\b\s*(?::\s*)?@NAME@STOP",
            r"\b(?:customer|client|buyer|recipient)\b\s*(?::\s*)?@NAME@STOP",
        ])),
        (InvoiceField::PaymentTerms, compile(&[
            r"\b(?:forma(?:\s+de)?\s+pago|condiciones(?:\s+de)?\s+pago|pago)\b\s*(?::\s*)?([^:]+?)(?:\s+\S+\s*:|$)",
            r"\bpayment(?:\s+(?:terms|method))?\b\s*(?::\s*)?([^:]+?)(?:\s+\S+\s*:|$)",
        ])),
    ];

    /// Heading of a line-item table: description, quantity, price and
    /// total columns, in that order.
    pub static ref LINE_ITEM_HEADING: Regex = Regex::new(
        r"(?i)\b(?:descripci[oó]n|concepto|art[ií]culo|producto|servicio|description|item|product|service)\b.*?\b(?:cantidad|cant|uds?|qty|quantity)\b.*?(?:\b(?:precio|importe|price|amount|rate)\b|\bp\.\s?u\.).*?\btotal\b"
    ).unwrap();

    /// A table row: description, quantity, unit price, line total.
    pub static ref LINE_ITEM_ROW: Regex = Regex::new(
        r"(?i)^(.+?)\s+(\d+(?:[.,]\d+)?)\s+(\d{1,3}(?:\.\d{3})+(?:,\d{1,2})?|\d+(?:[.,]\d{1,2})?)\s*(?:€|EUR)?\s+(\d{1,3}(?:\.\d{3})+(?:,\d{1,2})?|\d+(?:[.,]\d{1,2})?)\s*(?:€|EUR)?$"
    ).unwrap();

    /// A totals line that ends the line-item table.
    pub static ref SUMMARY_LINE: Regex = Regex::new(
        r"(?i)^(?:sub\s*total|total|base\s+imponible|iva|i\.v\.a|vat|suma)\b"
    ).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_table_covers_every_field_in_order() {
        let fields: Vec<InvoiceField> = FIELD_PATTERNS.iter().map(|(field, _)| *field).collect();
        assert_eq!(fields, InvoiceField::ALL.to_vec());
        assert!(FIELD_PATTERNS.iter().all(|(_, patterns)| !patterns.is_empty()));
    }

    #[test]
    fn test_field_names() {
        assert_eq!(InvoiceField::VendorTaxId.as_str(), "vendor_tax_id");
        assert_eq!(
            InvoiceField::from_name("payment_terms"),
            Some(InvoiceField::PaymentTerms)
        );
        assert_eq!(InvoiceField::from_name("metadata"), None);
    }

    #[test]
    fn test_line_item_heading() {
        assert!(LINE_ITEM_HEADING.is_match("Descripción Cantidad Precio Total"));
        assert!(LINE_ITEM_HEADING.is_match("Concepto Uds P. U. Total"));
        assert!(LINE_ITEM_HEADING.is_match("Item Qty Price Total"));
        assert!(!LINE_ITEM_HEADING.is_match("Total : 1.210,00 €"));
    }

    #[test]
    fn test_line_item_row() {
        let caps = LINE_ITEM_ROW
            .captures("Diseño web 2 500,00 € 1.000,00 €")
            .unwrap();
        assert_eq!(&caps[1], "Diseño web");
        assert_eq!(&caps[2], "2");
        assert_eq!(&caps[3], "500,00");
        assert_eq!(&caps[4], "1.000,00");
    }

    #[test]
    fn test_summary_line() {
        assert!(SUMMARY_LINE.is_match("Subtotal 1.000,00 €"));
        assert!(SUMMARY_LINE.is_match("Base imponible 1.000,00"));
        assert!(SUMMARY_LINE.is_match("IVA 21 % 210,00"));
        assert!(!SUMMARY_LINE.is_match("Hosting anual 1 120,00 120,00"));
    }
}
