//! The conversion router.
//!
//! [`Router`] is the facade over validation, backend selection, the
//! backends themselves and event logging. Every typed operation runs the
//! same pipeline:
//!
//! 1. validate the input (and the output path, when one is given);
//! 2. select a backend;
//! 3. log `start`, delegate, time the call;
//! 4. check the result is a PDF and log `success`.
//!
//! Failures before step 2 are logged as `validation-error` and never touch a
//! backend. Failures from step 2 on are logged as `error`; anything outside
//! the error taxonomy is wrapped as [`Error::Conversion`] tagged with the
//! backend name, a panicking backend becomes [`Error::Fatal`], and a PDF
//! left behind by a failed call is removed.
//!
//! Backend handles are created lazily and cached per configuration
//! generation. [`Router::set_config`] bumps the generation, so the next call
//! resolves backends against the new configuration.

use crate::backend::discovery::{discover_libreoffice, Discovery};
use crate::backend::{office, BackendContext, BackendHandle, BackendRegistry, Capability, PdfOutput};
use crate::config::{Config, Options};
use crate::detect::{extension_of, is_pdf_bytes, pdf_version, InputKind};
use crate::error::{Error, Result};
use crate::logging::{EventLogger, EventSink, OutputSummary};
use crate::selector::{BackendSelector, Selection};
use crate::sink::{FsSink, OutputSink};
use crate::validate::{display_name, InputValidator};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Extensions reported by [`Router::supported_formats`] regardless of
/// backend availability.
const RAW_FORMATS: &[&str] = &["txt", "htm"];

/// Outcome of a successful conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionResult {
    /// The PDF, as a file path or in memory.
    pub output: PdfOutput,
    /// Backend that produced it.
    pub converter: String,
    /// Wall-clock time spent in the backend.
    pub duration: Duration,
    /// Size of the PDF in bytes.
    pub file_size: u64,
}

impl ConversionResult {
    /// Duration in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.duration.as_secs_f64()
    }

    /// The PDF bytes, for in-memory output.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self.output {
            PdfOutput::Bytes(bytes) => Some(bytes),
            PdfOutput::File(_) => None,
        }
    }
}

/// Availability report for one backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConverterStatus {
    /// Whether the backend can be used right now.
    pub available: bool,
    /// Supported formats, for available backends.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub formats: Vec<String>,
    /// Engine version, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Why the backend is unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConverterStatus {
    fn unavailable(reason: String) -> Self {
        Self {
            available: false,
            formats: Vec::new(),
            version: None,
            error: Some(reason),
        }
    }
}

type Resolved = std::result::Result<BackendHandle, String>;

#[derive(Debug, Default)]
struct HandleCache {
    generation: u64,
    handles: HashMap<String, Resolved>,
}

/// PDF conversion router.
///
/// Conversions take `&self` and may run concurrently; configuration changes
/// take `&mut self`.
///
/// # Example
///
/// ```no_run
/// use topdf::{Config, Options, Router};
///
/// fn main() -> topdf::Result<()> {
///     let router = Router::new(Config::default())?;
///
///     let result = router.convert_csv("Name,Age\nJohn,25", None, &Options::new())?;
///     println!("{} bytes from {}", result.file_size, result.converter);
///
///     router.convert_file(
///         std::path::Path::new("report.docx"),
///         Some(std::path::Path::new("out/report.pdf")),
///         &Options::new(),
///     )?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Router {
    config: Config,
    generation: u64,
    validator: InputValidator,
    logger: EventLogger,
    registry: BackendRegistry,
    sink: Arc<dyn OutputSink>,
    cache: Mutex<HandleCache>,
}

impl Router {
    /// Create a router with the bundled backends. `config` is merged over
    /// the compiled defaults.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_registry(config, BackendRegistry::with_defaults())
    }

    /// Create a router over a custom set of backends.
    pub fn with_registry(config: Config, registry: BackendRegistry) -> Result<Self> {
        let config = Config::default().merged(&config);
        config.check()?;

        let validator = InputValidator::new(config.validation()?);
        let logging = config.logging()?;
        let mut logger = EventLogger::default();
        logger
            .set_enabled(logging.enabled)
            .set_level(logging.level_filter()?);

        log::debug!("Router created with converters: {:?}", registry.names());

        Ok(Self {
            config,
            generation: 0,
            validator,
            logger,
            registry,
            sink: Arc::new(FsSink::new()),
            cache: Mutex::new(HandleCache::default()),
        })
    }

    /// Write outputs through `sink` instead of the filesystem.
    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self.generation += 1;
        self
    }

    /// Send conversion events to `sink`.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.logger.set_sink(sink);
        self
    }

    /// The effective configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The registered backends.
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Current configuration generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Merge `partial` into the configuration and drop every cached backend.
    ///
    /// The merge is shallow: a top-level key in `partial` replaces the whole
    /// value, including nested backend sections. On error the router keeps
    /// its previous configuration.
    pub fn set_config(&mut self, partial: Config) -> Result<()> {
        let merged = self.config.clone().merged(&partial);
        merged.check()?;
        let validation = merged.validation()?;
        let logging = merged.logging()?;
        let level = logging.level_filter()?;

        self.validator = InputValidator::new(validation);
        self.logger.set_enabled(logging.enabled).set_level(level);
        self.config = merged;
        self.generation += 1;
        log::debug!("Configuration replaced, generation {}", self.generation);
        Ok(())
    }

    /// Render plain text.
    pub fn convert_text(
        &self,
        content: &str,
        output: Option<&Path>,
        options: &Options,
    ) -> Result<ConversionResult> {
        self.convert_content(InputKind::Text, content, content, output, options)
    }

    /// Render HTML.
    pub fn convert_html(
        &self,
        content: &str,
        output: Option<&Path>,
        options: &Options,
    ) -> Result<ConversionResult> {
        self.convert_content(InputKind::Html, content, content, output, options)
    }

    /// Render CSV as a table. Every non-blank line must have the same
    /// number of columns.
    pub fn convert_csv(
        &self,
        content: &str,
        output: Option<&Path>,
        options: &Options,
    ) -> Result<ConversionResult> {
        self.convert_content(InputKind::Csv, content, content, output, options)
    }

    /// Render a word-processor document (doc, docx, odt, rtf).
    pub fn convert_document(
        &self,
        input: &Path,
        output: Option<&Path>,
        options: &Options,
    ) -> Result<ConversionResult> {
        self.convert_office(InputKind::Document, input, output, options)
    }

    /// Render a spreadsheet (xls, xlsx, ods).
    pub fn convert_spreadsheet(
        &self,
        input: &Path,
        output: Option<&Path>,
        options: &Options,
    ) -> Result<ConversionResult> {
        self.convert_office(InputKind::Spreadsheet, input, output, options)
    }

    /// Render a slide deck (ppt, pptx, odp).
    pub fn convert_presentation(
        &self,
        input: &Path,
        output: Option<&Path>,
        options: &Options,
    ) -> Result<ConversionResult> {
        self.convert_office(InputKind::Presentation, input, output, options)
    }

    /// Render any supported file, dispatching on its extension.
    ///
    /// Text, HTML and CSV files are read as UTF-8 and rendered like
    /// in-memory content.
    pub fn convert_file(
        &self,
        input: &Path,
        output: Option<&Path>,
        options: &Options,
    ) -> Result<ConversionResult> {
        let ext = extension_of(input).unwrap_or_default();
        let Some(kind) = InputKind::from_extension(&ext) else {
            return Err(self.unsupported("file", ext));
        };

        if !kind.is_textual() {
            return self.convert_office(kind, input, output, options);
        }

        let label = kind.as_str();
        self.preflight(label, self.validator.validate_file(input), None)?;
        let content = fs::read_to_string(input).map_err(|e| {
            let err = Error::validation(format!(
                "File is not valid UTF-8 text: {} ({e})",
                display_name(input)
            ));
            self.logger.validation_error(label, &err);
            err
        })?;
        self.convert_content(kind, &content, &input.to_string_lossy(), output, options)
    }

    /// Formats of every currently available backend, plus `txt` and `htm`.
    /// Unavailable backends are skipped.
    pub fn supported_formats(&self) -> Vec<String> {
        let mut formats: BTreeSet<String> = RAW_FORMATS.iter().map(|f| f.to_string()).collect();
        for name in self.registry.names() {
            if let Ok(handle) = self.handle(&name) {
                if probe(|| handle.is_available()).unwrap_or(false) {
                    formats.extend(handle.supported_formats());
                }
            }
        }
        formats.into_iter().collect()
    }

    /// Availability of every registered backend. Never fails; each probe is
    /// reported as a converter check event.
    pub fn available_converters(&self) -> BTreeMap<String, ConverterStatus> {
        self.registry
            .names()
            .into_iter()
            .map(|name| {
                let status = self.status(&name);
                self.logger
                    .converter_check(&name, status.available, status.error.as_deref());
                (name, status)
            })
            .collect()
    }

    fn status(&self, name: &str) -> ConverterStatus {
        let handle = match self.handle(name) {
            Ok(handle) => handle,
            Err(Error::ConverterNotAvailable { reason, .. }) => {
                return ConverterStatus::unavailable(reason)
            }
            Err(e) => return ConverterStatus::unavailable(e.to_string()),
        };

        let report = probe(|| {
            if handle.is_available() {
                ConverterStatus {
                    available: true,
                    formats: handle.supported_formats(),
                    version: handle.version(),
                    error: None,
                }
            } else {
                ConverterStatus::unavailable(
                    handle
                        .unavailable_reason()
                        .unwrap_or_else(|| "engine is not installed".to_string()),
                )
            }
        });
        report.unwrap_or_else(|e| ConverterStatus::unavailable(e.to_string()))
    }

    /// Locate the office engine binary, honouring `libreoffice.bin`.
    pub fn discover_office_engine(&self) -> Discovery {
        let section = self.config.backend_section(office::NAME);
        let configured = section.get("bin").and_then(Value::as_str).map(PathBuf::from);
        discover_libreoffice(configured.as_deref())
    }

    fn cache(&self) -> MutexGuard<'_, HandleCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The backend registered as `name`, created on first use in the
    /// current generation.
    fn handle(&self, name: &str) -> Result<BackendHandle> {
        let name = name.to_lowercase();
        let mut cache = self.cache();
        if cache.generation != self.generation {
            cache.handles.clear();
            cache.generation = self.generation;
        }

        let resolved = match cache.handles.get(&name) {
            Some(resolved) => resolved.clone(),
            None => {
                let factory = self
                    .registry
                    .get(&name)
                    .ok_or_else(|| Error::conversion(None, format!("unknown converter '{name}'")))?;
                let ctx = BackendContext {
                    section: self.config.backend_section(&name),
                    sink: Arc::clone(&self.sink),
                };
                let resolved = probe(|| factory.create(&ctx))
                    .and_then(|created| created)
                    .map_err(|e| e.to_string());
                if let Err(reason) = &resolved {
                    log::warn!("Converter '{name}' could not be created: {reason}");
                }
                cache.handles.insert(name.clone(), resolved.clone());
                resolved
            }
        };

        resolved.map_err(|reason| Error::not_available(&name, reason))
    }

    fn select(
        &self,
        label: &str,
        format: &str,
        capability: Capability,
        options: &Options,
    ) -> Result<Selection> {
        let requested = options.converter();
        BackendSelector::new(&self.config, &self.registry)
            .select(format, capability, requested.as_deref(), |name| self.handle(name))
            .map_err(|e| {
                self.logger
                    .conversion_error(label, requested.as_deref(), &e);
                e
            })
    }

    fn unsupported(&self, label: &str, format: String) -> Error {
        let err = Error::unsupported(format, self.supported_formats());
        self.logger.conversion_error(label, None, &err);
        err
    }

    /// Log and return a failed input check, then check the output path.
    fn preflight(&self, label: &str, checked: Result<()>, output: Option<&Path>) -> Result<()> {
        let checked = checked.and_then(|()| match output {
            Some(path) => self
                .validator
                .validate_output_path(path, self.sink.as_ref()),
            None => Ok(()),
        });
        if let Err(e) = &checked {
            self.logger.validation_error(label, e);
        }
        checked
    }

    fn convert_content(
        &self,
        kind: InputKind,
        content: &str,
        input: &str,
        output: Option<&Path>,
        options: &Options,
    ) -> Result<ConversionResult> {
        let label = kind.as_str();
        let checked = match kind {
            InputKind::Csv => self.validator.validate_csv(content, options),
            _ => self.validator.validate_text(content),
        };
        self.preflight(label, checked, output)?;

        let selection = self.select(label, label, Capability::Text, options)?;
        self.execute(label, input, &selection, output, || {
            let Some(backend) = selection.handle.as_text() else {
                return Err(Error::Fatal(format!(
                    "{} cannot render in-memory content",
                    selection.name()
                )));
            };
            match kind {
                InputKind::Html => backend.convert_html(content, output, options),
                InputKind::Csv => backend.convert_csv(content, output, options),
                _ => backend.convert_text(content, output, options),
            }
        })
    }

    fn convert_office(
        &self,
        kind: InputKind,
        input: &Path,
        output: Option<&Path>,
        options: &Options,
    ) -> Result<ConversionResult> {
        let label = kind.as_str();
        let ext = extension_of(input).unwrap_or_default();
        let accepted = kind.extensions().contains(&ext.as_str());

        // Documents and spreadsheets are held to their own extensions before
        // anything else; presentations go through the general file checks.
        if kind != InputKind::Presentation && !accepted {
            return Err(self.unsupported(label, ext));
        }
        self.preflight(label, self.validator.validate_file(input), output)?;
        if !accepted {
            return Err(self.unsupported(label, ext));
        }

        let selection = self.select(label, &ext, Capability::File, options)?;
        self.execute(label, &input.to_string_lossy(), &selection, output, || {
            let Some(backend) = selection.handle.as_file() else {
                return Err(Error::Fatal(format!(
                    "{} cannot render document files",
                    selection.name()
                )));
            };
            match kind {
                InputKind::Document => backend.convert_document(input, output, options),
                InputKind::Spreadsheet => backend.convert_spreadsheet(input, output, options),
                _ => backend.convert_presentation(input, output, options),
            }
            .map(PdfOutput::File)
        })
    }

    fn execute<F>(
        &self,
        label: &str,
        input: &str,
        selection: &Selection,
        output: Option<&Path>,
        run: F,
    ) -> Result<ConversionResult>
    where
        F: FnOnce() -> Result<PdfOutput>,
    {
        let name = selection.name().to_string();
        self.logger.conversion_start(label, input, &name);

        let existed = output.is_some_and(|path| self.sink.exists(path));
        let started = Instant::now();
        let outcome = probe(run)
            .and_then(|produced| produced)
            .and_then(|produced| self.verify(&name, produced));
        let duration = started.elapsed();

        match outcome {
            Ok((pdf, file_size)) => {
                let summary = match &pdf {
                    PdfOutput::File(path) => OutputSummary::File(path),
                    PdfOutput::Bytes(bytes) => OutputSummary::Bytes(bytes.len()),
                };
                self.logger
                    .conversion_success(label, &name, summary, duration, file_size);
                Ok(ConversionResult {
                    output: pdf,
                    converter: name,
                    duration,
                    file_size,
                })
            }
            Err(e) => {
                let err = e.into_conversion(Some(name.as_str()));
                if let Some(path) = output {
                    if !existed && self.sink.exists(path) {
                        self.discard(path);
                    }
                }
                self.logger.conversion_error(label, Some(name.as_str()), &err);
                Err(err)
            }
        }
    }

    /// Check the backend really produced a PDF and measure it.
    fn verify(&self, name: &str, produced: PdfOutput) -> Result<(PdfOutput, u64)> {
        let (data, path) = match &produced {
            PdfOutput::Bytes(bytes) => (bytes.clone(), None),
            PdfOutput::File(path) => {
                let data = self.sink.read(path).map_err(|e| {
                    Error::conversion_with(
                        Some(name),
                        format!("output file was not written: {}", display_name(path)),
                        e,
                    )
                })?;
                (data, Some(path.as_path()))
            }
        };

        if !is_pdf_bytes(&data) {
            if let Some(path) = path {
                self.discard(path);
            }
            return Err(Error::conversion(
                Some(name),
                "backend output is not a PDF document",
            ));
        }

        log::debug!(
            "{name} produced PDF {}",
            pdf_version(&data).unwrap_or_else(|| "(unknown version)".to_string())
        );
        let size = path
            .and_then(|p| self.sink.file_size(p))
            .unwrap_or(data.len() as u64);
        Ok((produced, size))
    }

    fn discard(&self, path: &Path) {
        if let Err(e) = self.sink.remove(path) {
            log::warn!("Could not remove failed output {}: {e}", display_name(path));
        }
    }
}

/// Run a backend call, turning a panic into [`Error::Fatal`].
fn probe<T, F: FnOnce() -> T>(f: F) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| Error::Fatal(panic_message(&*payload)))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "backend panicked".to_string()
    }
}
