//! Structured conversion events.
//!
//! The router reports every conversion through an [`EventLogger`]: a
//! `start` event once a backend is chosen, then exactly one of `success`,
//! `error` or `validation-error`. Backend availability probes are reported
//! as [`ConverterCheck`] records.
//!
//! Events are handed to an [`EventSink`]. The default [`LogSink`] writes
//! them through the `log` facade under the `topdf` target; [`MemoryEventSink`]
//! keeps them in memory.
//!
//! Logged inputs are always sanitized: an input naming an existing file is
//! reduced to its base name, anything else to at most 100 characters with
//! card numbers and e-mail addresses redacted. Error messages have
//! absolute paths reduced to their last component.

use crate::error::{Error, ErrorKind};
use chrono::Utc;
use log::{Level, LevelFilter};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

/// Maximum number of characters of inline content kept in a log event.
pub const MAX_LOGGED_CHARS: usize = 100;

/// Phase of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// A backend was chosen and is about to run.
    Start,
    /// The backend produced a PDF.
    Success,
    /// Selection or the backend failed.
    Error,
    /// The input was rejected before any backend was involved.
    ValidationError,
}

impl Phase {
    /// Log level the phase is emitted at.
    pub fn level(&self) -> Level {
        match self {
            Phase::Start | Phase::Success => Level::Info,
            Phase::ValidationError => Level::Warn,
            Phase::Error => Level::Error,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Phase::Start => "PDF conversion started",
            Phase::Success => "PDF conversion completed successfully",
            Phase::Error => "PDF conversion failed",
            Phase::ValidationError => "Input validation failed",
        }
    }
}

/// Error details attached to `error` and `validation-error` events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDetail {
    /// Taxonomy kind.
    pub kind: ErrorKind,
    /// Message with absolute paths reduced to file names.
    pub message: String,
}

/// One conversion event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    /// Conversion phase.
    pub phase: Phase,
    /// Conversion type (`text`, `html`, `csv`, `document`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    /// Sanitized input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Backend name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converter: Option<String>,
    /// Output file name, or a byte count for in-memory output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Wall-clock duration, rounded to milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Size of the produced PDF.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,
    /// Failure details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl LogEvent {
    fn new(phase: Phase, kind: &str) -> Self {
        Self {
            phase,
            kind: kind.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            input: None,
            converter: None,
            output: None,
            duration_seconds: None,
            file_size_bytes: None,
            error: None,
        }
    }
}

/// Result of a backend availability probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConverterCheck {
    /// Backend name.
    pub converter: String,
    /// Whether the backend can be used.
    pub available: bool,
    /// Why it cannot, when it cannot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// RFC 3339 timestamp.
    pub timestamp: String,
}

impl ConverterCheck {
    /// Log level the check is emitted at.
    pub fn level(&self) -> Level {
        if self.available {
            Level::Info
        } else {
            Level::Warn
        }
    }
}

/// Where events go.
pub trait EventSink: Send + Sync {
    /// Record a conversion event.
    fn record(&self, event: &LogEvent);

    /// Record an availability probe.
    fn record_check(&self, check: &ConverterCheck);
}

/// Sink writing through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn record(&self, event: &LogEvent) {
        let context = serde_json::to_string(event).unwrap_or_default();
        log::log!(target: "topdf", event.phase.level(), "{} {}", event.phase.message(), context);
    }

    fn record_check(&self, check: &ConverterCheck) {
        let message = if check.available {
            "Converter is available"
        } else {
            "Converter is not available"
        };
        let context = serde_json::to_string(check).unwrap_or_default();
        log::log!(target: "topdf", check.level(), "{message} {context}");
    }
}

/// Sink keeping every event in memory.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<LogEvent>>,
    checks: Mutex<Vec<ConverterCheck>>,
}

impl MemoryEventSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded conversion events, oldest first.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Recorded availability probes, oldest first.
    pub fn checks(&self) -> Vec<ConverterCheck> {
        self.checks.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Phases of the recorded events, oldest first.
    pub fn phases(&self) -> Vec<Phase> {
        self.events().iter().map(|e| e.phase).collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
        if let Ok(mut checks) = self.checks.lock() {
            checks.clear();
        }
    }
}

impl EventSink for MemoryEventSink {
    fn record(&self, event: &LogEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }

    fn record_check(&self, check: &ConverterCheck) {
        if let Ok(mut checks) = self.checks.lock() {
            checks.push(check.clone());
        }
    }
}

/// Description of a conversion's output for the success event.
#[derive(Debug, Clone, Copy)]
pub enum OutputSummary<'a> {
    /// PDF written to a file.
    File(&'a Path),
    /// PDF returned in memory.
    Bytes(usize),
}

/// Guarded front end to an [`EventSink`].
#[derive(Clone)]
pub struct EventLogger {
    sink: Arc<dyn EventSink>,
    enabled: bool,
    level: LevelFilter,
}

impl std::fmt::Debug for EventLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLogger")
            .field("enabled", &self.enabled)
            .field("level", &self.level)
            .finish()
    }
}

impl Default for EventLogger {
    fn default() -> Self {
        Self::new(Arc::new(LogSink))
    }
}

impl EventLogger {
    /// Create an enabled logger emitting `info` and above to `sink`.
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            enabled: true,
            level: LevelFilter::Info,
        }
    }

    /// Set the minimum level.
    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    /// Enable or disable the logger.
    pub fn set_enabled(&mut self, enabled: bool) -> &mut Self {
        self.enabled = enabled;
        self
    }

    /// Set the minimum level in place.
    pub fn set_level(&mut self, level: LevelFilter) -> &mut Self {
        self.level = level;
        self
    }

    /// Replace the sink.
    pub fn set_sink(&mut self, sink: Arc<dyn EventSink>) -> &mut Self {
        self.sink = sink;
        self
    }

    /// Whether the logger emits anything.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn emits(&self, level: Level) -> bool {
        self.enabled && level <= self.level
    }

    /// A backend was chosen for `input`.
    pub fn conversion_start(&self, kind: &str, input: &str, converter: &str) {
        if !self.emits(Phase::Start.level()) {
            return;
        }
        let mut event = LogEvent::new(Phase::Start, kind);
        event.input = Some(sanitize_input(input));
        event.converter = Some(converter.to_string());
        self.sink.record(&event);
    }

    /// The backend produced a PDF.
    pub fn conversion_success(
        &self,
        kind: &str,
        converter: &str,
        output: OutputSummary<'_>,
        duration: Duration,
        file_size: u64,
    ) {
        if !self.emits(Phase::Success.level()) {
            return;
        }
        let mut event = LogEvent::new(Phase::Success, kind);
        event.converter = Some(converter.to_string());
        event.output = Some(match output {
            OutputSummary::File(path) => base_name(path),
            OutputSummary::Bytes(n) => format!("<{n} bytes>"),
        });
        event.duration_seconds = Some((duration.as_secs_f64() * 1000.0).round() / 1000.0);
        event.file_size_bytes = Some(file_size);
        self.sink.record(&event);
    }

    /// Selection or the backend failed.
    pub fn conversion_error(&self, kind: &str, converter: Option<&str>, error: &Error) {
        if !self.emits(Phase::Error.level()) {
            return;
        }
        let mut event = LogEvent::new(Phase::Error, kind);
        event.converter = converter.map(str::to_string);
        event.error = Some(detail(error));
        self.sink.record(&event);
    }

    /// The input was rejected before any backend was involved.
    pub fn validation_error(&self, kind: &str, error: &Error) {
        if !self.emits(Phase::ValidationError.level()) {
            return;
        }
        let mut event = LogEvent::new(Phase::ValidationError, kind);
        event.error = Some(detail(error));
        self.sink.record(&event);
    }

    /// A backend's availability was probed.
    pub fn converter_check(&self, converter: &str, available: bool, error: Option<&str>) {
        let level = if available { Level::Info } else { Level::Warn };
        if !self.emits(level) {
            return;
        }
        let check = ConverterCheck {
            converter: converter.to_string(),
            available,
            error: error.map(redact_paths),
            timestamp: Utc::now().to_rfc3339(),
        };
        self.sink.record_check(&check);
    }
}

fn detail(error: &Error) -> ErrorDetail {
    ErrorDetail {
        kind: error.kind(),
        message: redact_paths(&error.to_string()),
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn card_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b").expect("card pattern")
    })
}

fn email_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email pattern")
    })
}

fn path_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(^|[\s'"(=])(?:[A-Za-z]:)?(?:[\\/][^\\/\s'"]*)+[\\/]([^\\/\s'"]+)"#)
            .expect("path pattern")
    })
}

/// Reduce `input` to something safe to log.
///
/// An input naming an existing file becomes its base name. Anything else is
/// cut to [`MAX_LOGGED_CHARS`] characters with card-like digit runs replaced
/// by `[CARD]` and e-mail addresses by `[EMAIL]`; `...` marks truncation.
pub fn sanitize_input(input: &str) -> String {
    if looks_like_path(input) {
        let path = PathBuf::from(input);
        if path.exists() {
            return base_name(&path);
        }
    }

    let truncated = match input.char_indices().nth(MAX_LOGGED_CHARS) {
        Some((cut, _)) => &input[..cut],
        None => input,
    };
    let redacted = card_pattern().replace_all(truncated, "[CARD]");
    let redacted = email_pattern().replace_all(&redacted, "[EMAIL]");

    if truncated.len() < input.len() {
        format!("{redacted}...")
    } else {
        redacted.into_owned()
    }
}

fn looks_like_path(input: &str) -> bool {
    !input.is_empty() && input.len() <= 4096 && !input.contains(['\n', '\0'])
}

/// Replace absolute paths in `message` with their last component.
pub fn redact_paths(message: &str) -> String {
    path_pattern().replace_all(message, "${1}${2}").into_owned()
}
