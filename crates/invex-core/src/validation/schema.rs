//! JSON-Schema subset used to describe invoice records.
//!
//! Supported keywords: `type` (single or list), `enum`, `pattern`,
//! `minLength`/`maxLength`, `minimum`/`maximum` and their exclusive forms,
//! `required`, `properties`, `additionalProperties`, `items` and
//! `minItems`/`maxItems`. Annotations (`title`, `description`, ...) are
//! accepted; any other keyword is rejected when the schema is loaded.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use regex::Regex;
use serde_json::{Map, Number, Value};
use tracing::warn;

use crate::error::{InvexError, Result, SchemaError};
use crate::models::invoice::ValidationIssue;

/// Built-in invoice schema.
const DEFAULT_INVOICE_SCHEMA: &str = include_str!("../../schemas/invoice.json");

const ANNOTATION_KEYWORDS: &[&str] = &[
    "$schema", "$id", "$comment", "title", "description", "default", "examples",
];

const CONSTRAINT_KEYWORDS: &[&str] = &[
    "type",
    "enum",
    "pattern",
    "minLength",
    "maxLength",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "required",
    "properties",
    "additionalProperties",
    "items",
    "minItems",
    "maxItems",
];

/// JSON value types a property may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Null,
}

impl FieldType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(FieldType::String),
            "number" => Some(FieldType::Number),
            "integer" => Some(FieldType::Integer),
            "boolean" => Some(FieldType::Boolean),
            "array" => Some(FieldType::Array),
            "object" => Some(FieldType::Object),
            "null" => Some(FieldType::Null),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Null => "null",
        }
    }

    /// Whether `value` is an instance of this type.
    ///
    /// `integer` accepts any whole number and `number` accepts integers.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Number, Value::Number(_)) => true,
            (FieldType::Integer, Value::Number(n)) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Array, Value::Array(_)) => true,
            (FieldType::Object, Value::Object(_)) => true,
            (FieldType::Null, Value::Null) => true,
            _ => false,
        }
    }

    /// Placeholder inserted for a missing required field.
    pub fn default_value(&self) -> Value {
        match self {
            FieldType::String => Value::String("N/A".to_string()),
            FieldType::Number | FieldType::Integer => Value::from(0),
            FieldType::Boolean => Value::Bool(false),
            FieldType::Array => Value::Array(Vec::new()),
            FieldType::Object => Value::Object(serde_json::Map::new()),
            FieldType::Null => Value::Null,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constraints on one value in a record.
#[derive(Debug, Clone, Default)]
pub struct PropertySchema {
    /// Accepted types; empty means any type.
    pub types: Vec<FieldType>,
    pub description: Option<String>,
    pub pattern: Option<Regex>,
    pub enum_values: Option<Vec<Value>>,
    /// Required keys when the value is an object.
    pub required: Vec<String>,
    /// Nested properties when the value is an object.
    pub properties: BTreeMap<String, PropertySchema>,
    /// Keys outside `properties` when the value is an object.
    pub additional_properties: AdditionalProperties,
    /// Element schema when the value is an array.
    pub items: Option<Box<PropertySchema>>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub minimum: Option<Number>,
    pub maximum: Option<Number>,
    pub exclusive_minimum: Option<Number>,
    pub exclusive_maximum: Option<Number>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
}

/// What an object schema says about keys not listed in `properties`.
#[derive(Debug, Clone, Default)]
pub enum AdditionalProperties {
    #[default]
    Allowed,
    Forbidden,
    Schema(Box<PropertySchema>),
}

impl PropertySchema {
    fn parse(name: &str, value: &Value) -> std::result::Result<Self, SchemaError> {
        let object = value.as_object().ok_or(SchemaError::NotAnObject)?;
        if let Some(keyword) = object.keys().find(|k| {
            !ANNOTATION_KEYWORDS.contains(&k.as_str()) && !CONSTRAINT_KEYWORDS.contains(&k.as_str())
        }) {
            return Err(SchemaError::UnsupportedKeyword {
                field: field_label(name),
                keyword: keyword.clone(),
            });
        }
        let mut schema = PropertySchema::default();

        match object.get("type") {
            Some(Value::String(type_name)) => {
                schema.types = parse_types(name, [type_name.as_str()])
            }
            Some(Value::Array(names)) => {
                schema.types = parse_types(name, names.iter().filter_map(Value::as_str))
            }
            _ => {}
        }

        schema.description = object
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some(pattern) = object.get("pattern").and_then(Value::as_str) {
            let regex = Regex::new(pattern).map_err(|e| SchemaError::InvalidPattern {
                field: name.to_string(),
                reason: e.to_string(),
            })?;
            schema.pattern = Some(regex);
        }

        schema.enum_values = object.get("enum").and_then(Value::as_array).cloned();

        if let Some(required) = object.get("required").and_then(Value::as_array) {
            schema.required = required
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }

        if let Some(properties) = object.get("properties").and_then(Value::as_object) {
            for (key, property) in properties {
                let path = join_path(name, key);
                schema
                    .properties
                    .insert(key.clone(), PropertySchema::parse(&path, property)?);
            }
        }

        match object.get("additionalProperties") {
            None | Some(Value::Bool(true)) => {}
            Some(Value::Bool(false)) => {
                schema.additional_properties = AdditionalProperties::Forbidden
            }
            Some(nested) => {
                let path = join_path(name, "additionalProperties");
                schema.additional_properties =
                    AdditionalProperties::Schema(Box::new(PropertySchema::parse(&path, nested)?));
            }
        }

        if let Some(items) = object.get("items") {
            let path = join_path(name, "items");
            schema.items = Some(Box::new(PropertySchema::parse(&path, items)?));
        }

        schema.min_length = count_keyword(object, name, "minLength")?;
        schema.max_length = count_keyword(object, name, "maxLength")?;
        schema.min_items = count_keyword(object, name, "minItems")?;
        schema.max_items = count_keyword(object, name, "maxItems")?;
        schema.minimum = number_keyword(object, name, "minimum")?;
        schema.maximum = number_keyword(object, name, "maximum")?;
        schema.exclusive_minimum = number_keyword(object, name, "exclusiveMinimum")?;
        schema.exclusive_maximum = number_keyword(object, name, "exclusiveMaximum")?;

        Ok(schema)
    }

    /// First declared type, used to pick a default value.
    pub fn primary_type(&self) -> Option<FieldType> {
        self.types.first().copied()
    }

    /// Check `value` and return the first violation found.
    pub fn check(&self, value: &Value) -> Option<ValidationIssue> {
        let mut path = Vec::new();
        self.check_at(value, &mut path)
    }

    fn check_at(&self, value: &Value, path: &mut Vec<String>) -> Option<ValidationIssue> {
        if !self.types.is_empty() && !self.types.iter().any(|t| t.matches(value)) {
            let expected: Vec<String> = self.types.iter().map(|t| format!("'{}'", t)).collect();
            return Some(issue(
                path,
                format!("{} is not of type {}", repr(value), expected.join(", ")),
            ));
        }

        if let Some(allowed) = &self.enum_values {
            if !allowed.contains(value) {
                let options: Vec<String> = allowed.iter().map(repr).collect();
                return Some(issue(
                    path,
                    format!("{} is not one of [{}]", repr(value), options.join(", ")),
                ));
            }
        }

        match value {
            Value::String(s) => self.check_string(s, value, path),
            Value::Number(n) => self.check_number(n, value, path),
            Value::Object(object) => {
                if let Some(missing) = self.required.iter().find(|key| !object.contains_key(*key)) {
                    return Some(issue(path, format!("'{}' is a required property", missing)));
                }

                let mut unexpected = Vec::new();
                for (key, child) in object {
                    let schema = match (self.properties.get(key), &self.additional_properties) {
                        (Some(schema), _) => schema,
                        (None, AdditionalProperties::Schema(schema)) => schema.as_ref(),
                        (None, AdditionalProperties::Forbidden) => {
                            unexpected.push(format!("'{}'", key));
                            continue;
                        }
                        (None, AdditionalProperties::Allowed) => continue,
                    };
                    path.push(key.clone());
                    let found = schema.check_at(child, path);
                    path.pop();
                    if found.is_some() {
                        return found;
                    }
                }

                if unexpected.is_empty() {
                    return None;
                }
                let verb = if unexpected.len() == 1 { "was" } else { "were" };
                Some(issue(
                    path,
                    format!(
                        "Additional properties are not allowed ({} {} unexpected)",
                        unexpected.join(", "),
                        verb
                    ),
                ))
            }
            Value::Array(elements) => {
                let count = elements.len() as u64;
                if self.min_items.is_some_and(|min| count < min) {
                    return Some(issue(path, format!("{} is too short", repr(value))));
                }
                if self.max_items.is_some_and(|max| count > max) {
                    return Some(issue(path, format!("{} is too long", repr(value))));
                }

                let schema = self.items.as_deref()?;
                for (index, element) in elements.iter().enumerate() {
                    path.push(index.to_string());
                    let found = schema.check_at(element, path);
                    path.pop();
                    if found.is_some() {
                        return found;
                    }
                }
                None
            }
            _ => None,
        }
    }

    fn check_string(&self, s: &str, value: &Value, path: &[String]) -> Option<ValidationIssue> {
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(s) {
                return Some(issue(
                    path,
                    format!("{} does not match '{}'", repr(value), pattern.as_str()),
                ));
            }
        }

        let length = s.chars().count() as u64;
        if self.min_length.is_some_and(|min| length < min) {
            return Some(issue(path, format!("{} is too short", repr(value))));
        }
        if self.max_length.is_some_and(|max| length > max) {
            return Some(issue(path, format!("{} is too long", repr(value))));
        }
        None
    }

    fn check_number(&self, n: &Number, value: &Value, path: &[String]) -> Option<ValidationIssue> {
        let x = n.as_f64()?;
        let message = if let Some(limit) = violated(&self.minimum, |l| x < l) {
            format!("{} is less than the minimum of {}", value, limit)
        } else if let Some(limit) = violated(&self.exclusive_minimum, |l| x <= l) {
            format!("{} is less than or equal to the minimum of {}", value, limit)
        } else if let Some(limit) = violated(&self.maximum, |l| x > l) {
            format!("{} is greater than the maximum of {}", value, limit)
        } else if let Some(limit) = violated(&self.exclusive_maximum, |l| x >= l) {
            format!("{} is greater than or equal to the maximum of {}", value, limit)
        } else {
            return None;
        };
        Some(issue(path, message))
    }
}

/// `limit` when it is set and `fails` holds for it.
fn violated(limit: &Option<Number>, fails: impl Fn(f64) -> bool) -> Option<&Number> {
    limit
        .as_ref()
        .filter(|l| l.as_f64().is_some_and(|l| fails(l)))
}

fn count_keyword(
    object: &Map<String, Value>,
    name: &str,
    keyword: &str,
) -> std::result::Result<Option<u64>, SchemaError> {
    match object.get(keyword) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| invalid_keyword(name, keyword)),
    }
}

fn number_keyword(
    object: &Map<String, Value>,
    name: &str,
    keyword: &str,
) -> std::result::Result<Option<Number>, SchemaError> {
    match object.get(keyword) {
        None => Ok(None),
        Some(Value::Number(n)) => Ok(Some(n.clone())),
        Some(_) => Err(invalid_keyword(name, keyword)),
    }
}

fn invalid_keyword(name: &str, keyword: &str) -> SchemaError {
    SchemaError::InvalidKeyword {
        field: field_label(name),
        keyword: keyword.to_string(),
    }
}

fn field_label(name: &str) -> String {
    if name.is_empty() {
        "root".to_string()
    } else {
        name.to_string()
    }
}

fn parse_types<'a, I>(name: &str, names: I) -> Vec<FieldType>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .filter_map(|type_name| {
            let parsed = FieldType::from_name(type_name);
            if parsed.is_none() {
                warn!("Ignoring unknown type '{}' for {}", type_name, name);
            }
            parsed
        })
        .collect()
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn issue(path: &[String], message: String) -> ValidationIssue {
    let path = if path.is_empty() {
        "root".to_string()
    } else {
        path.join(".")
    };
    ValidationIssue::new(path, message)
}

/// Render a value the way schema messages quote instances.
fn repr(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        other => other.to_string(),
    }
}

/// A parsed schema describing a whole invoice record.
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    root: PropertySchema,
}

impl SchemaDescriptor {
    /// Parse a schema from a JSON string.
    pub fn from_str(json: &str) -> std::result::Result<Self, SchemaError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    /// Parse a schema from a JSON value.
    pub fn from_value(value: &Value) -> std::result::Result<Self, SchemaError> {
        if !value.is_object() {
            return Err(SchemaError::NotAnObject);
        }
        Ok(Self {
            root: PropertySchema::parse("", value)?,
        })
    }

    /// Load a schema file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content).map_err(InvexError::from)
    }

    /// The built-in invoice schema.
    pub fn default_invoice() -> Self {
        Self::from_str(DEFAULT_INVOICE_SCHEMA).unwrap_or_else(|e| {
            warn!("Built-in invoice schema failed to load: {}", e);
            Self {
                root: PropertySchema::default(),
            }
        })
    }

    /// Top-level required field names, in declaration order.
    pub fn required(&self) -> &[String] {
        &self.root.required
    }

    /// Schema of a top-level property.
    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.root.properties.get(name)
    }

    /// Whether a top-level property is declared.
    pub fn declares(&self, name: &str) -> bool {
        self.root.properties.contains_key(name)
    }

    /// Default value for a missing required field; undeclared fields are
    /// treated as strings.
    pub fn default_for(&self, name: &str) -> Value {
        match self.property(name) {
            Some(property) => property
                .primary_type()
                .map_or(Value::Null, |t| t.default_value()),
            None => FieldType::String.default_value(),
        }
    }

    /// Check a record instance and return the first violation.
    pub fn check(&self, instance: &Value) -> Option<ValidationIssue> {
        self.root.check(instance)
    }
}

impl Default for SchemaDescriptor {
    fn default() -> Self {
        Self::default_invoice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_default_schema_loads() {
        let schema = SchemaDescriptor::from_str(DEFAULT_INVOICE_SCHEMA).unwrap();
        assert!(schema.required().contains(&"invoice_number".to_string()));
        assert!(schema.declares("line_items"));
        assert!(schema.property("issue_date").unwrap().pattern.is_some());
    }

    #[test]
    fn test_type_messages() {
        let schema = SchemaDescriptor::from_value(&json!({
            "properties": {
                "total": {"type": "integer"},
                "name": {"type": ["string", "null"]}
            }
        }))
        .unwrap();

        assert_eq!(schema.check(&json!({"total": 3.0, "name": null})), None);
        assert_eq!(
            schema.check(&json!({"total": "3"})),
            Some(ValidationIssue::new("total", "'3' is not of type 'integer'"))
        );
        assert_eq!(
            schema.check(&json!({"name": 1})),
            Some(ValidationIssue::new("name", "1 is not of type 'string', 'null'"))
        );
    }

    #[test]
    fn test_integer_and_number() {
        assert!(FieldType::Integer.matches(&json!(2)));
        assert!(!FieldType::Integer.matches(&json!(2.5)));
        assert!(FieldType::Number.matches(&json!(2)));
        assert!(!FieldType::Number.matches(&json!(true)));
    }

    #[test]
    fn test_pattern_is_unanchored() {
        let schema = SchemaDescriptor::from_value(&json!({
            "properties": {"code": {"type": "string", "pattern": "\\d+"}}
        }))
        .unwrap();
        assert_eq!(schema.check(&json!({"code": "AB-12"})), None);
        assert_eq!(
            schema.check(&json!({"code": "AB"})),
            Some(ValidationIssue::new("code", "'AB' does not match '\\d+'"))
        );
    }

    #[test]
    fn test_enum_and_required() {
        let schema = SchemaDescriptor::from_value(&json!({
            "required": ["currency"],
            "properties": {"currency": {"enum": ["EUR", "USD"]}}
        }))
        .unwrap();

        assert_eq!(
            schema.check(&json!({})),
            Some(ValidationIssue::new("root", "'currency' is a required property"))
        );
        assert_eq!(
            schema.check(&json!({"currency": "PLN"})),
            Some(ValidationIssue::new(
                "currency",
                "'PLN' is not one of ['EUR', 'USD']"
            ))
        );
    }

    #[test]
    fn test_nested_items_path() {
        let schema = SchemaDescriptor::default_invoice();
        let instance = json!({
            "line_items": [
                {"description": "a", "qty": "1", "unit_price": "1", "line_total": "1"},
                {"description": "b", "qty": 2, "unit_price": "1", "line_total": "2"}
            ]
        });
        let violation = schema.root.properties["line_items"].check(&instance["line_items"]);
        assert_eq!(
            violation,
            Some(ValidationIssue::new("1.qty", "2 is not of type 'string'"))
        );
    }

    #[test]
    fn test_default_for() {
        let schema = SchemaDescriptor::from_value(&json!({
            "properties": {
                "total_amount": {"type": "integer"},
                "paid": {"type": "boolean"},
                "anything": {}
            }
        }))
        .unwrap();
        assert_eq!(schema.default_for("total_amount"), json!(0));
        assert_eq!(schema.default_for("paid"), json!(false));
        assert_eq!(schema.default_for("anything"), Value::Null);
        assert_eq!(schema.default_for("undeclared"), json!("N/A"));
    }

    #[test]
    fn test_invalid_schemas() {
        assert!(matches!(
            SchemaDescriptor::from_str("[1, 2]"),
            Err(SchemaError::NotAnObject)
        ));
        assert!(matches!(
            SchemaDescriptor::from_str("{not json"),
            Err(SchemaError::Parse(_))
        ));
        assert!(matches!(
            SchemaDescriptor::from_value(&json!({"properties": {"a": {"pattern": "("}}})),
            Err(SchemaError::InvalidPattern { field, .. }) if field == "a"
        ));
    }

    #[test]
    fn test_unsupported_keywords_rejected() {
        assert!(matches!(
            SchemaDescriptor::from_value(&json!({"anyOf": [{"type": "string"}]})),
            Err(SchemaError::UnsupportedKeyword { field, keyword })
                if field == "root" && keyword == "anyOf"
        ));
        assert!(matches!(
            SchemaDescriptor::from_value(&json!({
                "properties": {"total": {"type": "number", "multipleOf": 0.01}}
            })),
            Err(SchemaError::UnsupportedKeyword { field, keyword })
                if field == "total" && keyword == "multipleOf"
        ));
        assert!(matches!(
            SchemaDescriptor::from_value(&json!({
                "properties": {"code": {"minLength": "five"}}
            })),
            Err(SchemaError::InvalidKeyword { field, keyword })
                if field == "code" && keyword == "minLength"
        ));
        assert!(SchemaDescriptor::from_value(&json!({
            "$id": "invoice",
            "title": "Invoice",
            "properties": {"a": {"description": "x", "default": 1, "examples": [1]}}
        }))
        .is_ok());
    }

    #[test]
    fn test_length_and_range_constraints() {
        let schema = SchemaDescriptor::from_value(&json!({
            "properties": {
                "invoice_number": {"type": "string", "minLength": 5, "maxLength": 8},
                "total_amount": {"type": "number", "minimum": 0, "exclusiveMaximum": 1000}
            }
        }))
        .unwrap();

        assert_eq!(
            schema.check(&json!({"invoice_number": "A"})),
            Some(ValidationIssue::new("invoice_number", "'A' is too short"))
        );
        assert_eq!(
            schema.check(&json!({"invoice_number": "F-2023-0001"})),
            Some(ValidationIssue::new("invoice_number", "'F-2023-0001' is too long"))
        );
        assert_eq!(
            schema.check(&json!({"total_amount": -3})),
            Some(ValidationIssue::new(
                "total_amount",
                "-3 is less than the minimum of 0"
            ))
        );
        assert_eq!(
            schema.check(&json!({"total_amount": 1000})),
            Some(ValidationIssue::new(
                "total_amount",
                "1000 is greater than or equal to the maximum of 1000"
            ))
        );
        assert_eq!(
            schema.check(&json!({"invoice_number": "F-001", "total_amount": 0})),
            None
        );
    }

    #[test]
    fn test_additional_properties() {
        let closed = SchemaDescriptor::from_value(&json!({
            "additionalProperties": false,
            "properties": {"invoice_number": {"type": "string"}}
        }))
        .unwrap();
        assert_eq!(
            closed.check(&json!({"invoice_number": "A", "unexpected": "x"})),
            Some(ValidationIssue::new(
                "root",
                "Additional properties are not allowed ('unexpected' was unexpected)"
            ))
        );
        assert_eq!(closed.check(&json!({"invoice_number": "A"})), None);

        let typed = SchemaDescriptor::from_value(&json!({
            "properties": {"invoice_number": {"type": "string"}},
            "additionalProperties": {"type": "string"}
        }))
        .unwrap();
        assert_eq!(
            typed.check(&json!({"notes": 3})),
            Some(ValidationIssue::new("notes", "3 is not of type 'string'"))
        );
    }

    #[test]
    fn test_item_count() {
        let schema = SchemaDescriptor::from_value(&json!({
            "properties": {"line_items": {"type": "array", "minItems": 1, "maxItems": 2}}
        }))
        .unwrap();
        assert_eq!(
            schema.check(&json!({"line_items": []})),
            Some(ValidationIssue::new("line_items", "[] is too short"))
        );
        assert_eq!(
            schema.check(&json!({"line_items": [1, 2, 3]})),
            Some(ValidationIssue::new("line_items", "[1,2,3] is too long"))
        );
    }
}
