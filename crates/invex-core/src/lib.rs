//! Core library for invoice extraction from OCR output.
//!
//! This crate provides:
//! - OCR word merging across a primary and a fallback engine pass
//! - Heuristic field location for Spanish and English invoices
//! - Schema completion, formatting and validation of extracted records
//! - A pipeline wiring the three together from configuration

pub mod error;
pub mod invoice;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod validation;

pub use error::{InvexError, Result, SchemaError, ValidationError};
pub use invoice::{FieldLocator, InvoiceField, LineItemTable};
pub use models::config::InvexConfig;
pub use models::invoice::{InvoiceRecord, LineItem, RecordMetadata, ValidationIssue, ValidationReport};
pub use ocr::{BoundingBox, MergeResult, MergeStrategy, OcrMerger, OcrWord};
pub use pipeline::InvoicePipeline;
pub use validation::{SchemaDescriptor, SchemaValidator};
