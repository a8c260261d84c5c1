//! # topdf
//!
//! Convert text, HTML, CSV and office documents to PDF through
//! interchangeable rendering backends.
//!
//! A [`Router`] validates each input, picks a backend for it (the one the
//! call asks for, the configured default, or the first available entry of a
//! per-format priority list), runs the backend and reports the outcome as a
//! typed [`Error`] or a [`ConversionResult`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use topdf::{Config, Options, Router};
//! use std::path::Path;
//!
//! fn main() -> topdf::Result<()> {
//!     let router = Router::new(Config::default().with_env_overrides())?;
//!
//!     // In-memory output
//!     let result = router.convert_text("Hello, World!", None, &Options::new())?;
//!     assert!(result.output.as_bytes().is_some());
//!
//!     // File output, forcing a backend
//!     let options = Options::new().with_converter("wkhtmltopdf");
//!     router.convert_html("<h1>Report</h1>", Some(Path::new("out/report.pdf")), &options)?;
//!
//!     // Office documents go through LibreOffice
//!     router.convert_file(Path::new("slides.pptx"), Some(Path::new("out/slides.pdf")), &Options::new())?;
//!     Ok(())
//! }
//! ```
//!
//! ## Backends
//!
//! - **typeset**: in-process engine for text, HTML and CSV. Always available.
//! - **wkhtmltopdf**: text, HTML and CSV through the `wkhtmltopdf` program.
//! - **libreoffice**: doc, docx, odt, rtf, xls, xlsx, ods, ppt, pptx, odp
//!   through headless LibreOffice.
//!
//! Custom backends implement [`backend::TextBackend`] or
//! [`backend::FileBackend`] and are registered in a
//! [`backend::BackendRegistry`].

pub mod backend;
pub mod config;
pub mod detect;
pub mod error;
pub mod logging;
pub mod router;
pub mod selector;
pub mod sink;
pub mod validate;

// Re-export commonly used types
pub use backend::{
    Backend, BackendFactory, BackendHandle, BackendRegistry, Capability, FileBackend, PdfOutput,
    TextBackend,
};
pub use config::{Config, LoggingConfig, Options, ValidationConfig};
pub use detect::{is_pdf_bytes, InputKind};
pub use error::{Error, ErrorKind, Result};
pub use logging::{EventLogger, EventSink, LogEvent, LogSink, MemoryEventSink, Phase};
pub use router::{ConversionResult, ConverterStatus, Router};
pub use selector::{BackendSelector, Selection, SelectionSource};
pub use sink::{FsSink, MemorySink, OutputSink};
pub use validate::InputValidator;

use std::path::Path;

/// Render plain text to PDF bytes with the default configuration.
///
/// # Example
///
/// ```no_run
/// let pdf = topdf::text_to_pdf("Hello, World!").unwrap();
/// assert!(pdf.starts_with(b"%PDF"));
/// ```
pub fn text_to_pdf(text: &str) -> Result<Vec<u8>> {
    let router = Router::new(Config::default())?;
    into_bytes(router.convert_text(text, None, &Options::new())?)
}

/// Render HTML to PDF bytes with the default configuration.
pub fn html_to_pdf(html: &str) -> Result<Vec<u8>> {
    let router = Router::new(Config::default())?;
    into_bytes(router.convert_html(html, None, &Options::new())?)
}

/// Render CSV to PDF bytes with the default configuration.
///
/// # Example
///
/// ```no_run
/// let pdf = topdf::csv_to_pdf("Name,Age\nJohn,25").unwrap();
/// std::fs::write("people.pdf", pdf).unwrap();
/// ```
pub fn csv_to_pdf(csv: &str) -> Result<Vec<u8>> {
    let router = Router::new(Config::default())?;
    into_bytes(router.convert_csv(csv, None, &Options::new())?)
}

/// Convert any supported file to a PDF at `output`.
///
/// # Example
///
/// ```no_run
/// topdf::convert_file("report.docx", "report.pdf").unwrap();
/// ```
pub fn convert_file<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> Result<ConversionResult> {
    let router = Router::new(Config::default())?;
    router.convert_file(input.as_ref(), Some(output.as_ref()), &Options::new())
}

fn into_bytes(result: ConversionResult) -> Result<Vec<u8>> {
    let converter = result.converter.clone();
    result
        .into_bytes()
        .ok_or_else(|| Error::conversion(Some(converter.as_str()), "expected in-memory output"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_to_pdf() {
        let pdf = text_to_pdf("Hello, World!").unwrap();
        assert!(is_pdf_bytes(&pdf));
    }

    #[test]
    fn test_csv_to_pdf_rejects_ragged_rows() {
        let err = csv_to_pdf("a,b\n1,2,3").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_empty_inputs_rejected() {
        assert!(matches!(text_to_pdf(""), Err(Error::Validation(_))));
        assert!(matches!(html_to_pdf("   "), Err(Error::Validation(_))));
    }

    #[test]
    fn test_convert_file_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.xyz");
        std::fs::write(&input, "x").unwrap();

        let err = convert_file(&input, dir.path().join("out.pdf")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }
}
