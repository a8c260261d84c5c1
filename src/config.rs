//! Layered configuration and per-call options.
//!
//! Configuration is a JSON object with three layers: the compiled defaults
//! returned by [`Config::default`], the instance configuration merged in when
//! a [`crate::Router`] is built (or replaced through
//! [`crate::Router::set_config`]), and the per-call [`Options`] which are
//! never persisted.
//!
//! Merging is shallow: top-level keys of the newer layer replace the older
//! ones wholesale, so `{"typeset": {"format": "A3"}}` replaces the entire
//! `typeset` section rather than patching one key inside it.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;

/// Formats handled by the office engine, each keyed by file extension.
pub const OFFICE_FORMATS: &[&str] = &[
    "doc", "docx", "odt", "rtf", "xls", "xlsx", "ods", "ppt", "pptx", "odp",
];

/// Every input extension accepted by default.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[
    "txt", "html", "htm", "csv", "doc", "docx", "odt", "rtf", "xls", "xlsx", "ods", "ppt",
    "pptx", "odp",
];

/// Hardcoded backend ordering used when `converter_priority[format]` is
/// absent or empty.
pub fn default_priority(format: &str) -> &'static [&'static str] {
    match format {
        "text" => &["typeset", "wkhtmltopdf"],
        "html" => &["wkhtmltopdf", "typeset"],
        "csv" => &["typeset", "wkhtmltopdf"],
        f if OFFICE_FORMATS.contains(&f) => &["libreoffice"],
        _ => &[],
    }
}

/// Router configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    values: Map<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        let priority: Map<String, Value> = ["text", "html", "csv"]
            .iter()
            .chain(OFFICE_FORMATS.iter())
            .map(|f| (f.to_string(), json!(default_priority(f))))
            .collect();

        let defaults = json!({
            "default_converter": "typeset",
            "converter_priority": priority,
            "typeset": {
                "format": "A4",
                "orientation": "P",
                "font": { "family": "Helvetica", "size": 12 },
                "margins": {
                    "left": 15, "top": 20, "right": 15, "bottom": 20,
                    "header": 9, "footer": 9
                },
                "title": "Generated PDF",
                "author": "topdf",
            },
            "wkhtmltopdf": {
                "bin": null,
                "format": "A4",
                "orientation": "P",
                "margins": { "left": 15, "top": 16, "right": 15, "bottom": 16 },
                "encoding": "UTF-8",
                "timeout": 60,
            },
            "libreoffice": {
                "bin": null,
                "temp_dir": null,
                "output_dir": null,
                "timeout": 120,
            },
            "validation": ValidationConfig::default(),
            "logging": LoggingConfig::default(),
        });

        match defaults {
            Value::Object(values) => Self { values },
            _ => Self::empty(),
        }
    }
}

impl Config {
    /// Create the compiled default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration with no keys at all, for use as a partial
    /// layer.
    pub fn empty() -> Self {
        Self { values: Map::new() }
    }

    /// Build a configuration from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            other => Err(Error::InvalidConfig(format!(
                "expected a JSON object, found {}",
                json_type(&other)
            ))),
        }
    }

    /// Parse a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Self::from_value(value)
    }

    /// Read a configuration from a JSON file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Set a top-level key, replacing any previous value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a top-level key in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Get a top-level value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Borrow the underlying mapping.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Convert into a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    /// Merge `partial` into this configuration (shallow, newer wins).
    pub fn merge(&mut self, partial: &Config) {
        for (key, value) in &partial.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Consume this configuration and return it merged with `partial`.
    pub fn merged(mut self, partial: &Config) -> Self {
        self.merge(partial);
        self
    }

    /// Apply `TOPDF_*` environment variable overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Recognized variables: `TOPDF_DEFAULT_CONVERTER`, `TOPDF_MAX_FILE_SIZE`,
    /// `TOPDF_MAX_TEXT_LENGTH`, `TOPDF_LOGGING_ENABLED`, `TOPDF_LOG_LEVEL`,
    /// `TOPDF_LIBREOFFICE_BIN`, `TOPDF_WKHTMLTOPDF_BIN`. Unparseable numbers
    /// and booleans are ignored with a warning.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("TOPDF_DEFAULT_CONVERTER") {
            self.set("default_converter", name);
        }
        if let Some(v) = lookup("TOPDF_MAX_FILE_SIZE") {
            match v.trim().parse::<u64>() {
                Ok(n) => self.set_nested("validation", "max_file_size", json!(n)),
                Err(_) => log::warn!("Ignoring TOPDF_MAX_FILE_SIZE={v:?}: not a number"),
            }
        }
        if let Some(v) = lookup("TOPDF_MAX_TEXT_LENGTH") {
            match v.trim().parse::<u64>() {
                Ok(n) => self.set_nested("validation", "max_text_length", json!(n)),
                Err(_) => log::warn!("Ignoring TOPDF_MAX_TEXT_LENGTH={v:?}: not a number"),
            }
        }
        if let Some(v) = lookup("TOPDF_LOGGING_ENABLED") {
            match parse_bool(&v) {
                Some(b) => self.set_nested("logging", "enabled", json!(b)),
                None => log::warn!("Ignoring TOPDF_LOGGING_ENABLED={v:?}: not a boolean"),
            }
        }
        if let Some(v) = lookup("TOPDF_LOG_LEVEL") {
            self.set_nested("logging", "level", json!(v));
        }
        if let Some(v) = lookup("TOPDF_LIBREOFFICE_BIN") {
            self.set_nested("libreoffice", "bin", json!(v));
        }
        if let Some(v) = lookup("TOPDF_WKHTMLTOPDF_BIN") {
            self.set_nested("wkhtmltopdf", "bin", json!(v));
        }
        self
    }

    fn set_nested(&mut self, section: &str, key: &str, value: Value) {
        let entry = self
            .values
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(map) = entry {
            map.insert(key.to_string(), value);
        }
    }

    /// The configured default backend, if any.
    pub fn default_converter(&self) -> Option<&str> {
        self.values
            .get("default_converter")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Ordered backend names to try for `format`.
    ///
    /// Falls back to [`default_priority`] when the entry is absent or empty.
    pub fn converter_priority(&self, format: &str) -> Vec<String> {
        let configured: Vec<String> = self
            .values
            .get("converter_priority")
            .and_then(|p| p.get(format))
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|s| s.to_lowercase())
                    .collect()
            })
            .unwrap_or_default();

        if configured.is_empty() {
            default_priority(format)
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            configured
        }
    }

    /// The sub-configuration for a backend (an empty object if absent).
    pub fn backend_section(&self, name: &str) -> Value {
        match self.values.get(name) {
            Some(v @ Value::Object(_)) => v.clone(),
            _ => Value::Object(Map::new()),
        }
    }

    /// Validation limits.
    pub fn validation(&self) -> Result<ValidationConfig> {
        self.section("validation")
    }

    /// Logging settings.
    pub fn logging(&self) -> Result<LoggingConfig> {
        self.section("logging")
    }

    fn section<T: for<'de> Deserialize<'de> + Default>(&self, key: &str) -> Result<T> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(T::default()),
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|e| Error::InvalidConfig(format!("{key}: {e}"))),
        }
    }

    /// Check that every typed section can be interpreted.
    pub fn check(&self) -> Result<()> {
        self.validation()?;
        self.logging()?.level_filter()?;
        if let Some(p) = self.values.get("converter_priority") {
            if !p.is_object() {
                return Err(Error::InvalidConfig(format!(
                    "converter_priority: expected an object, found {}",
                    json_type(p)
                )));
            }
        }
        Ok(())
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Input validation limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Maximum input file size in bytes. Default: 50 MiB.
    pub max_file_size: u64,

    /// Maximum text length in bytes. Default: 1 MiB.
    pub max_text_length: usize,

    /// Accepted input extensions, compared case-insensitively.
    pub allowed_extensions: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            max_text_length: 1024 * 1024,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Event logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Whether conversion events are emitted at all.
    pub enabled: bool,

    /// Minimum level of emitted events (`error`, `warn`, `info`, `debug`, `trace`, `off`).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Parse the configured level.
    pub fn level_filter(&self) -> Result<log::LevelFilter> {
        self.level
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("logging.level: unknown level '{}'", self.level)))
    }
}

/// Per-call options. They override configuration for one call only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    values: Map<String, Value>,
}

impl Options {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a specific backend. No fallback is attempted if it cannot
    /// serve the call.
    pub fn with_converter(self, name: impl Into<String>) -> Self {
        self.with("converter", name.into())
    }

    /// Set the CSV delimiter. Default: `,`.
    pub fn with_csv_delimiter(self, delimiter: char) -> Self {
        self.with("csv_delimiter", delimiter.to_string())
    }

    /// Set an arbitrary option.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Get an option value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// The explicitly requested backend, lower-cased.
    pub fn converter(&self) -> Option<String> {
        self.values
            .get("converter")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    /// The CSV delimiter (first character of `csv_delimiter`, default `,`).
    pub fn csv_delimiter(&self) -> char {
        self.values
            .get("csv_delimiter")
            .and_then(Value::as_str)
            .and_then(|s| s.chars().next())
            .unwrap_or(',')
    }

    /// Whether the first CSV row is a header: `csv_header`, or its alias
    /// `csv_has_header`. Default: `true`.
    pub fn csv_header(&self) -> bool {
        ["csv_header", "csv_has_header"]
            .iter()
            .find_map(|key| match self.values.get(*key)? {
                Value::Bool(b) => Some(*b),
                Value::String(s) => parse_bool(s),
                _ => None,
            })
            .unwrap_or(true)
    }
}

impl From<Map<String, Value>> for Options {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

/// Setting lookup over one call's options and a backend's sub-configuration.
///
/// Options use flat keys (`font_size`, `margin_left`); sections use nested
/// paths (`font.size`, `margins.left`). Options win.
#[derive(Debug, Clone, Copy)]
pub struct Settings<'a> {
    options: &'a Options,
    section: &'a Value,
}

impl<'a> Settings<'a> {
    /// Create a lookup over `options` layered on `section`.
    pub fn new(options: &'a Options, section: &'a Value) -> Self {
        Self { options, section }
    }

    fn lookup(&self, option_key: &str, path: &[&str]) -> Option<&'a Value> {
        if let Some(v) = self.options.get(option_key).filter(|v| !v.is_null()) {
            return Some(v);
        }
        let mut node = self.section;
        for key in path {
            node = node.get(key)?;
        }
        (!node.is_null()).then_some(node)
    }

    /// A string setting.
    pub fn string(&self, option_key: &str, path: &[&str]) -> Option<String> {
        self.lookup(option_key, path).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// A numeric setting, accepting numbers or numeric strings.
    pub fn number(&self, option_key: &str, path: &[&str]) -> Option<f64> {
        self.lookup(option_key, path).and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    /// A boolean setting, accepting booleans or boolean-like strings.
    pub fn flag(&self, option_key: &str, path: &[&str]) -> Option<bool> {
        self.lookup(option_key, path).and_then(|v| match v {
            Value::Bool(b) => Some(*b),
            Value::String(s) => parse_bool(s),
            _ => None,
        })
    }
}
