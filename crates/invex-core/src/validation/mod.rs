//! Schema validation of extracted invoice records.

mod format;
mod schema;
mod validator;

pub use format::{format_currency, format_date};
pub use schema::{FieldType, PropertySchema, SchemaDescriptor};
pub use validator::SchemaValidator;
