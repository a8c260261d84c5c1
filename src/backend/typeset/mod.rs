//! In-process PDF engine for text, HTML and CSV.
//!
//! Content is flattened into [`Block`]s, flowed onto pages by [`Layout`]
//! and serialised with lopdf using the standard Type1 fonts. No external
//! programs or font files are needed, so the engine is always available.
//!
//! Settings come from the `typeset` configuration section, overridden per
//! call by options with the same meaning:
//!
//! | option          | section key     | default         |
//! |-----------------|-----------------|-----------------|
//! | `format`        | `format`        | `A4`            |
//! | `orientation`   | `orientation`   | `P`             |
//! | `font_family`   | `font.family`   | `Helvetica`     |
//! | `font_size`     | `font.size`     | `12`            |
//! | `margin_left` … | `margins.left` … | 15/20/15/20 mm |
//! | `title`         | `title`         | `Generated PDF` |
//! | `author`        | `author`        | `topdf`         |
//! | `subject`       | `subject`       | none            |
//! | `keywords`      | `keywords`      | none            |
//! | `header`        | `header`        | none            |
//! | `footer`        | `footer`        | none            |
//! | `margin_header` | `margins.header` | 9 mm           |
//! | `margin_footer` | `margins.footer` | 9 mm           |
//!
//! Headers and footers are drawn centred on every page; `{PAGENO}` and
//! `{nbpg}` expand to the page number and page count.
//!
//! CSV tables treat the first row as a header unless `csv_header` (or
//! `csv_has_header`) is false.

mod html;
mod layout;
mod pdf;

pub use layout::{Block, FontFamily, Margins, Orientation, PageFormat, PageSetup};

use super::{Backend, BackendContext, BackendFactory, BackendHandle, PdfOutput, TextBackend};
use crate::config::{Options, Settings};
use crate::error::{Error, Result};
use crate::sink::OutputSink;
use crate::validate::split_csv_line;
use layout::Layout;
use pdf::{write_pdf, DocInfo};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Backend name.
pub const NAME: &str = "typeset";

const FORMATS: &[&str] = &["text", "html", "csv"];

/// Creates [`TypesetBackend`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypesetFactory;

impl BackendFactory for TypesetFactory {
    fn name(&self) -> &str {
        NAME
    }

    fn create(&self, ctx: &BackendContext) -> Result<BackendHandle> {
        Ok(BackendHandle::Text(Arc::new(TypesetBackend::new(
            ctx.section.clone(),
            ctx.sink.clone(),
        ))))
    }
}

/// The in-process engine.
#[derive(Debug, Clone)]
pub struct TypesetBackend {
    section: Value,
    sink: Arc<dyn OutputSink>,
}

impl TypesetBackend {
    /// Create an engine over a `typeset` configuration section.
    pub fn new(section: Value, sink: Arc<dyn OutputSink>) -> Self {
        Self { section, sink }
    }

    fn setup(&self, options: &Options) -> Result<PageSetup> {
        PageSetup::from_settings(&Settings::new(options, &self.section))
    }

    /// Lay out and serialise `blocks`.
    pub fn render(&self, blocks: &[Block], setup: &PageSetup) -> Result<Vec<u8>> {
        let started = Instant::now();
        let pages = Layout::run(setup, blocks);
        let pdf = write_pdf(&pages, setup, &DocInfo::from_setup(setup))
            .map_err(|e| Error::conversion(Some(NAME), format!("PDF serialisation failed: {e}")))?;
        log::debug!(
            "Typeset {} blocks onto {} pages ({} bytes) in {:.3}s",
            blocks.len(),
            pages.len(),
            pdf.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(pdf)
    }

    fn deliver(&self, pdf: Vec<u8>, output: Option<&Path>) -> Result<PdfOutput> {
        match output {
            Some(path) => {
                self.sink.write(path, &pdf)?;
                Ok(PdfOutput::File(path.to_path_buf()))
            }
            None => Ok(PdfOutput::Bytes(pdf)),
        }
    }
}

/// One block per source line; blank lines become vertical space.
fn text_blocks(content: &str) -> Vec<Block> {
    content
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                Block::Blank
            } else {
                Block::Line(line.to_string())
            }
        })
        .collect()
}

fn csv_blocks(content: &str, options: &Options) -> Vec<Block> {
    let delimiter = options.csv_delimiter();
    let rows: Vec<Vec<String>> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            split_csv_line(line, delimiter)
                .into_iter()
                .map(|cell| cell.trim().to_string())
                .collect()
        })
        .collect();
    vec![Block::Table {
        rows,
        header: options.csv_header(),
    }]
}

impl Backend for TypesetBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn supported_formats(&self) -> Vec<String> {
        FORMATS.iter().map(|f| f.to_string()).collect()
    }

    fn is_available(&self) -> bool {
        true
    }

    fn version(&self) -> Option<String> {
        Some(env!("CARGO_PKG_VERSION").to_string())
    }
}

impl TextBackend for TypesetBackend {
    fn convert_text(
        &self,
        content: &str,
        output: Option<&Path>,
        options: &Options,
    ) -> Result<PdfOutput> {
        let setup = self.setup(options)?;
        let pdf = self.render(&text_blocks(content), &setup)?;
        self.deliver(pdf, output)
    }

    fn convert_html(
        &self,
        content: &str,
        output: Option<&Path>,
        options: &Options,
    ) -> Result<PdfOutput> {
        let mut setup = self.setup(options)?;
        if options.get("title").is_none() {
            if let Some(title) = html::title(content) {
                setup.title = title;
            }
        }
        let pdf = self.render(&html::flatten(content), &setup)?;
        self.deliver(pdf, output)
    }

    fn convert_csv(
        &self,
        content: &str,
        output: Option<&Path>,
        options: &Options,
    ) -> Result<PdfOutput> {
        let setup = self.setup(options)?;
        let pdf = self.render(&csv_blocks(content, options), &setup)?;
        self.deliver(pdf, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use serde_json::json;

    fn backend(sink: Arc<MemorySink>) -> TypesetBackend {
        TypesetBackend::new(json!({ "format": "A4" }), sink)
    }

    #[test]
    fn test_text_to_bytes() {
        let backend = backend(Arc::new(MemorySink::new()));
        let output = backend
            .convert_text("Hello\n\nWorld", None, &Options::new())
            .unwrap();
        assert!(output.as_bytes().unwrap().starts_with(b"%PDF"));
    }

    #[test]
    fn test_html_to_sink() {
        let sink = Arc::new(MemorySink::new());
        let backend = backend(sink.clone());
        let path = Path::new("out/page.pdf");
        let output = backend
            .convert_html("<h1>Title</h1><p>Body</p>", Some(path), &Options::new())
            .unwrap();

        assert_eq!(output, PdfOutput::File(path.to_path_buf()));
        assert!(sink.get(path).unwrap().starts_with(b"%PDF"));
    }

    #[test]
    fn test_csv_blocks() {
        let blocks = csv_blocks("a;b\n\n\"c;d\";e\n", &Options::new().with_csv_delimiter(';'));
        assert_eq!(
            blocks,
            vec![Block::Table {
                rows: vec![
                    vec!["a".to_string(), "b".to_string()],
                    vec!["c;d".to_string(), "e".to_string()],
                ],
                header: true,
            }]
        );

        let blocks = csv_blocks("a,b", &Options::new().with("csv_header", false));
        assert!(matches!(&blocks[0], Block::Table { header: false, .. }));

        let blocks = csv_blocks("a,b", &Options::new().with("csv_has_header", false));
        assert!(matches!(&blocks[0], Block::Table { header: false, .. }));
    }

    #[test]
    fn test_running_header_on_every_page() {
        let backend = backend(Arc::new(MemorySink::new()));
        let text: Vec<String> = (0..150).map(|i| format!("entry {i}")).collect();
        let options = Options::new()
            .with("header", "Inventory")
            .with("footer", "{PAGENO}/{nbpg}");
        let output = backend
            .convert_text(&text.join("\n"), None, &options)
            .unwrap();

        let doc = lopdf::Document::load_mem(output.as_bytes().unwrap()).unwrap();
        let pages = doc.get_pages();
        assert!(pages.len() > 1);
        for (number, id) in &pages {
            let bytes = doc.get_page_content(*id).unwrap();
            let content = lopdf::content::Content::decode(&bytes).unwrap();
            let shown: Vec<&[u8]> = content
                .operations
                .iter()
                .filter(|op| op.operator == "Tj")
                .filter_map(|op| op.operands.first()?.as_str().ok())
                .collect();
            assert_eq!(shown.first(), Some(&&b"Inventory"[..]));
            let footer = format!("{number}/{}", pages.len());
            assert_eq!(shown.last(), Some(&footer.as_bytes()));
        }
    }

    #[test]
    fn test_bad_page_format_is_conversion_error() {
        let backend = backend(Arc::new(MemorySink::new()));
        let err = backend
            .convert_text("x", None, &Options::new().with("format", "Z9"))
            .unwrap_err();
        assert!(matches!(err, Error::Conversion { .. }));
        assert!(err.to_string().starts_with("[typeset]"));
    }

    #[test]
    fn test_failed_write_leaves_nothing() {
        let sink = Arc::new(MemorySink::new());
        sink.fail_writes(true);
        let backend = backend(sink.clone());
        let err = backend
            .convert_csv("a,b\n1,2", Some(Path::new("t.pdf")), &Options::new())
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(sink.paths().is_empty());
    }

    #[test]
    fn test_capabilities() {
        let backend = backend(Arc::new(MemorySink::new()));
        assert!(backend.is_available());
        assert!(backend.supports("CSV"));
        assert!(!backend.supports("docx"));
    }
}
