//! Rendering backends and the registry the router resolves them from.
//!
//! A backend exposes exactly one capability:
//!
//! - [`TextBackend`] accepts in-memory text, HTML or CSV and returns either
//!   the path it wrote or the PDF bytes.
//! - [`FileBackend`] accepts a document path and returns the path of the PDF
//!   it produced.
//!
//! Both extend [`Backend`], which reports the backend's name, supported
//! formats, availability and version. The router never looks past these
//! traits.
//!
//! Backends are created lazily from a [`BackendFactory`] registered under a
//! unique name in a [`BackendRegistry`]. The set of names is fixed once the
//! registry is handed to a router.
//!
//! # Example
//!
//! ```no_run
//! use topdf::backend::BackendRegistry;
//! use topdf::{Config, Router};
//!
//! fn main() -> topdf::Result<()> {
//!     let registry = BackendRegistry::with_defaults();
//!     let router = Router::with_registry(Config::default(), registry)?;
//!     let pdf = router.convert_text("Hello", None, &Default::default())?;
//!     assert!(pdf.output.as_bytes().is_some());
//!     Ok(())
//! }
//! ```

pub mod discovery;
pub mod office;
pub mod process;
pub mod typeset;
pub mod wkhtmltopdf;

pub use office::{OfficeBackend, OfficeFactory};
pub use typeset::{TypesetBackend, TypesetFactory};
pub use wkhtmltopdf::{WkhtmltopdfBackend, WkhtmltopdfFactory};

use crate::config::Options;
use crate::error::Result;
use crate::sink::OutputSink;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A converted PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfOutput {
    /// Written to this path.
    File(PathBuf),
    /// Returned in memory.
    Bytes(Vec<u8>),
}

impl PdfOutput {
    /// The output path, for file output.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            PdfOutput::File(path) => Some(path),
            PdfOutput::Bytes(_) => None,
        }
    }

    /// The PDF bytes, for in-memory output.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PdfOutput::File(_) => None,
            PdfOutput::Bytes(bytes) => Some(bytes),
        }
    }
}

/// The capability a backend provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// In-memory text, HTML and CSV.
    Text,
    /// Document files.
    File,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Text => f.write_str("text"),
            Capability::File => f.write_str("file"),
        }
    }
}

/// Operations shared by every backend.
pub trait Backend: Send + Sync {
    /// Unique, lower-case backend name.
    fn name(&self) -> &str;

    /// Formats this backend accepts: `text`, `html`, `csv` for text
    /// backends, lower-case file extensions for file backends.
    fn supported_formats(&self) -> Vec<String>;

    /// Whether the underlying engine is present and usable right now.
    fn is_available(&self) -> bool;

    /// Version of the underlying engine, if it can be determined.
    fn version(&self) -> Option<String>;

    /// Why [`Backend::is_available`] returns `false`.
    fn unavailable_reason(&self) -> Option<String> {
        None
    }

    /// Check if this backend supports `format` (case-insensitive).
    fn supports(&self, format: &str) -> bool {
        let format = format.to_lowercase();
        self.supported_formats().iter().any(|f| *f == format)
    }
}

/// Backend rendering in-memory content.
pub trait TextBackend: Backend {
    /// Render plain text.
    fn convert_text(&self, content: &str, output: Option<&Path>, options: &Options)
        -> Result<PdfOutput>;

    /// Render HTML.
    fn convert_html(&self, content: &str, output: Option<&Path>, options: &Options)
        -> Result<PdfOutput>;

    /// Render CSV as a table.
    fn convert_csv(&self, content: &str, output: Option<&Path>, options: &Options)
        -> Result<PdfOutput>;
}

/// Backend rendering document files.
///
/// Every method returns the path of the produced PDF, which is `output`
/// when given.
pub trait FileBackend: Backend {
    /// Render a word-processor document.
    fn convert_document(&self, input: &Path, output: Option<&Path>, options: &Options)
        -> Result<PathBuf>;

    /// Render a spreadsheet.
    fn convert_spreadsheet(
        &self,
        input: &Path,
        output: Option<&Path>,
        options: &Options,
    ) -> Result<PathBuf>;

    /// Render a slide deck.
    fn convert_presentation(
        &self,
        input: &Path,
        output: Option<&Path>,
        options: &Options,
    ) -> Result<PathBuf>;

    /// Render any supported file, dispatching on its extension.
    fn convert(&self, input: &Path, output: Option<&Path>, options: &Options) -> Result<PathBuf>;
}

/// A created backend, tagged with its capability.
#[derive(Clone)]
pub enum BackendHandle {
    /// Text-capable backend.
    Text(Arc<dyn TextBackend>),
    /// File-capable backend.
    File(Arc<dyn FileBackend>),
}

impl BackendHandle {
    /// Backend name.
    pub fn name(&self) -> &str {
        match self {
            BackendHandle::Text(b) => b.name(),
            BackendHandle::File(b) => b.name(),
        }
    }

    /// Capability of the wrapped backend.
    pub fn capability(&self) -> Capability {
        match self {
            BackendHandle::Text(_) => Capability::Text,
            BackendHandle::File(_) => Capability::File,
        }
    }

    /// Supported formats of the wrapped backend.
    pub fn supported_formats(&self) -> Vec<String> {
        match self {
            BackendHandle::Text(b) => b.supported_formats(),
            BackendHandle::File(b) => b.supported_formats(),
        }
    }

    /// Whether the wrapped backend supports `format`.
    pub fn supports(&self, format: &str) -> bool {
        match self {
            BackendHandle::Text(b) => b.supports(format),
            BackendHandle::File(b) => b.supports(format),
        }
    }

    /// Availability of the wrapped backend.
    pub fn is_available(&self) -> bool {
        match self {
            BackendHandle::Text(b) => b.is_available(),
            BackendHandle::File(b) => b.is_available(),
        }
    }

    /// Why the wrapped backend is unavailable.
    pub fn unavailable_reason(&self) -> Option<String> {
        match self {
            BackendHandle::Text(b) => b.unavailable_reason(),
            BackendHandle::File(b) => b.unavailable_reason(),
        }
    }

    /// Engine version of the wrapped backend.
    pub fn version(&self) -> Option<String> {
        match self {
            BackendHandle::Text(b) => b.version(),
            BackendHandle::File(b) => b.version(),
        }
    }

    /// The text capability, if that is what this backend provides.
    pub fn as_text(&self) -> Option<&Arc<dyn TextBackend>> {
        match self {
            BackendHandle::Text(b) => Some(b),
            BackendHandle::File(_) => None,
        }
    }

    /// The file capability, if that is what this backend provides.
    pub fn as_file(&self) -> Option<&Arc<dyn FileBackend>> {
        match self {
            BackendHandle::File(b) => Some(b),
            BackendHandle::Text(_) => None,
        }
    }
}

impl fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendHandle")
            .field("name", &self.name())
            .field("capability", &self.capability())
            .finish()
    }
}

/// What a factory gets to build a backend from.
#[derive(Debug, Clone)]
pub struct BackendContext {
    /// The backend's configuration section (an object, possibly empty).
    pub section: Value,
    /// Where the backend writes PDFs.
    pub sink: Arc<dyn OutputSink>,
}

/// Creates backends on demand.
pub trait BackendFactory: Send + Sync {
    /// Name of the backends this factory creates.
    fn name(&self) -> &str;

    /// Create a backend for the given configuration.
    ///
    /// An error here marks the backend as unavailable for the current
    /// configuration.
    fn create(&self, ctx: &BackendContext) -> Result<BackendHandle>;
}

type CreateFn = dyn Fn(&BackendContext) -> Result<BackendHandle> + Send + Sync;

/// Factory wrapping a closure.
pub struct FnFactory {
    name: String,
    create: Box<CreateFn>,
}

impl FnFactory {
    /// Create a factory named `name` calling `create`.
    pub fn new<F>(name: impl Into<String>, create: F) -> Self
    where
        F: Fn(&BackendContext) -> Result<BackendHandle> + Send + Sync + 'static,
    {
        Self {
            name: name.into().to_lowercase(),
            create: Box::new(create),
        }
    }
}

impl BackendFactory for FnFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, ctx: &BackendContext) -> Result<BackendHandle> {
        (self.create)(ctx)
    }
}

/// Registry of backend factories, keyed by lower-case name.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, Arc<dyn BackendFactory>>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the bundled backends (`typeset`,
    /// `wkhtmltopdf`, `libreoffice`).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TypesetFactory));
        registry.register(Arc::new(WkhtmltopdfFactory));
        registry.register(Arc::new(OfficeFactory));
        registry
    }

    /// Register a factory, replacing any factory with the same name.
    pub fn register(&mut self, factory: Arc<dyn BackendFactory>) -> &mut Self {
        self.factories.insert(factory.name().to_lowercase(), factory);
        self
    }

    /// Register a closure as a factory.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, create: F) -> &mut Self
    where
        F: Fn(&BackendContext) -> Result<BackendHandle> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnFactory::new(name, create)))
    }

    /// Get a factory by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn BackendFactory>> {
        self.factories.get(&name.to_lowercase())
    }

    /// Check if a backend name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_lowercase())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether no factory is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("names", &self.names())
            .finish()
    }
}
