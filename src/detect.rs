//! Input kind detection and PDF output sniffing.

use std::fmt;
use std::path::Path;

/// Logical kind of a conversion input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    /// Plain text
    Text,
    /// HTML markup
    Html,
    /// Comma- (or otherwise) separated values
    Csv,
    /// Word-processor document
    Document,
    /// Spreadsheet
    Spreadsheet,
    /// Slide deck
    Presentation,
}

/// Extensions routed to [`InputKind::Document`].
pub const DOCUMENT_EXTENSIONS: &[&str] = &["doc", "docx", "odt", "rtf"];
/// Extensions routed to [`InputKind::Spreadsheet`].
pub const SPREADSHEET_EXTENSIONS: &[&str] = &["xls", "xlsx", "ods"];
/// Extensions routed to [`InputKind::Presentation`].
pub const PRESENTATION_EXTENSIONS: &[&str] = &["ppt", "pptx", "odp"];

impl InputKind {
    /// Map a file extension (case-insensitive, without the dot) to its kind.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        match ext.as_str() {
            "txt" => Some(InputKind::Text),
            "html" | "htm" => Some(InputKind::Html),
            "csv" => Some(InputKind::Csv),
            e if DOCUMENT_EXTENSIONS.contains(&e) => Some(InputKind::Document),
            e if SPREADSHEET_EXTENSIONS.contains(&e) => Some(InputKind::Spreadsheet),
            e if PRESENTATION_EXTENSIONS.contains(&e) => Some(InputKind::Presentation),
            _ => None,
        }
    }

    /// Map a path to its kind by extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        extension_of(path.as_ref()).and_then(|e| Self::from_extension(&e))
    }

    /// Name used in log events and priority lookups for in-memory inputs.
    pub fn as_str(&self) -> &'static str {
        match self {
            InputKind::Text => "text",
            InputKind::Html => "html",
            InputKind::Csv => "csv",
            InputKind::Document => "document",
            InputKind::Spreadsheet => "spreadsheet",
            InputKind::Presentation => "presentation",
        }
    }

    /// Extensions accepted by the file operation for this kind.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            InputKind::Text => &["txt"],
            InputKind::Html => &["html", "htm"],
            InputKind::Csv => &["csv"],
            InputKind::Document => DOCUMENT_EXTENSIONS,
            InputKind::Spreadsheet => SPREADSHEET_EXTENSIONS,
            InputKind::Presentation => PRESENTATION_EXTENSIONS,
        }
    }

    /// Whether inputs of this kind are handed to backends as in-memory text.
    pub fn is_textual(&self) -> bool {
        matches!(self, InputKind::Text | InputKind::Html | InputKind::Csv)
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower-cased extension of `path`, if it has one.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// PDF magic bytes: %PDF
const PDF_MAGIC: &[u8] = b"%PDF";

/// Check whether bytes start with the PDF signature.
pub fn is_pdf_bytes(data: &[u8]) -> bool {
    data.starts_with(PDF_MAGIC)
}

/// PDF header version (e.g. "1.7") if the data carries a well-formed header.
pub fn pdf_version(data: &[u8]) -> Option<String> {
    let rest = data.strip_prefix(b"%PDF-")?;
    let version = rest.get(..3)?;
    let valid = version[0].is_ascii_digit() && version[1] == b'.' && version[2].is_ascii_digit();
    valid.then(|| String::from_utf8_lossy(version).into_owned())
}
