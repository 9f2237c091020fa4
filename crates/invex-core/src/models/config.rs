//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{InvexError, Result};
use crate::ocr::MergeStrategy;

/// Prefix of environment variables that override configuration values.
///
/// Path segments are separated by a double underscore, e.g.
/// `INVEX__OCR__MERGE_STRATEGY=word_by_word`.
pub const ENV_PREFIX: &str = "INVEX__";

/// Main configuration for the invex pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvexConfig {
    /// OCR merge configuration.
    pub ocr: OcrConfig,

    /// Field extraction configuration.
    pub extraction: ExtractionConfig,

    /// Schema validation configuration.
    pub validation: ValidationConfig,

    /// Export configuration.
    pub export: ExportConfig,
}

/// OCR merge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Merge strategy name: `highest_confidence`, `line_by_line` or `word_by_word`.
    pub merge_strategy: String,

    /// Merged confidence below which a warning is logged (0.0 - 1.0).
    pub confidence_threshold: f32,

    /// Vertical distance in pixels that starts a new transcript line.
    pub line_tolerance: f32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            merge_strategy: "highest_confidence".to_string(),
            confidence_threshold: 0.85,
            line_tolerance: 10.0,
        }
    }
}

impl OcrConfig {
    /// Parsed merge strategy; unknown names map to the default strategy.
    pub fn strategy(&self) -> MergeStrategy {
        MergeStrategy::from_name(&self.merge_strategy)
    }
}

/// Field extraction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Look for a line-item table.
    pub detect_line_items: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            detect_line_items: true,
        }
    }
}

/// Schema validation configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Schema file; the built-in invoice schema is used when unset.
    pub schema: Option<PathBuf>,

    /// Treat any schema violation as fatal.
    pub strict_mode: bool,
}

/// Export configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Default output format: `json`, `csv` or `text`.
    pub default_format: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_format: "json".to_string(),
        }
    }
}

impl InvexConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> std::result::Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> std::result::Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)
    }

    /// Load from `path` (or defaults when `None`) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(std::env::vars())?;
        Ok(config)
    }

    /// Apply `INVEX__SECTION__KEY=value` overrides.
    ///
    /// Variables without the prefix are ignored.
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(path) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let path: Vec<String> = path.split("__").map(str::to_lowercase).collect();
            self.set_path(&path, parse_value(&value))
                .map_err(|e| InvexError::Config(format!("{}: {}", key, e)))?;
            debug!("Applied configuration override {}", key);
        }
        Ok(())
    }

    /// Look up a value by dotted key (e.g. `ocr.merge_strategy`).
    pub fn get(&self, key: &str) -> Option<Value> {
        let json = serde_json::to_value(self).ok()?;
        key.split('.')
            .try_fold(&json, |current, part| current.get(part))
            .cloned()
    }

    /// Set a value by dotted key. Only existing keys can be set.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let path: Vec<String> = key.split('.').map(str::to_string).collect();
        self.set_path(&path, value).map_err(InvexError::Config)
    }

    fn set_path(&mut self, path: &[String], value: Value) -> std::result::Result<(), String> {
        let mut json = serde_json::to_value(&*self).map_err(|e| e.to_string())?;
        set_value(&mut json, path, value)?;
        *self = serde_json::from_value(json)
            .map_err(|e| format!("invalid value for {}: {}", path.join("."), e))?;
        Ok(())
    }
}

/// Parse a raw setting as JSON, falling back to a plain string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn set_value(json: &mut Value, path: &[String], value: Value) -> std::result::Result<(), String> {
    let Some((last, parents)) = path.split_last() else {
        return Err("empty configuration path".to_string());
    };

    let mut current = json;
    for part in parents {
        current = current
            .get_mut(part.as_str())
            .ok_or_else(|| format!("configuration path not found: {}", part))?;
    }

    let object = current
        .as_object_mut()
        .ok_or_else(|| "cannot set value at non-object path".to_string())?;
    if !object.contains_key(last.as_str()) {
        return Err(format!("unknown configuration key: {}", last));
    }
    object.insert(last.clone(), value);
    Ok(())
}
