//! HTML engine driving the external `wkhtmltopdf` program.
//!
//! Text and CSV are turned into HTML first. Every conversion runs in a
//! private scratch directory that is removed afterwards; the resulting PDF
//! is handed to the output sink.

use super::discovery::{discover_wkhtmltopdf, EngineBinary};
use super::process::run;
use super::{Backend, BackendContext, BackendFactory, BackendHandle, PdfOutput, TextBackend};
use crate::config::{Options, Settings};
use crate::detect::is_pdf_bytes;
use crate::error::{Error, Result};
use crate::sink::OutputSink;
use crate::validate::split_csv_line;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

/// Backend name.
pub const NAME: &str = "wkhtmltopdf";

const FORMATS: &[&str] = &["text", "html", "csv"];
const DEFAULT_TIMEOUT_SECS: f64 = 60.0;

/// Creates [`WkhtmltopdfBackend`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct WkhtmltopdfFactory;

impl BackendFactory for WkhtmltopdfFactory {
    fn name(&self) -> &str {
        NAME
    }

    fn create(&self, ctx: &BackendContext) -> Result<BackendHandle> {
        Ok(BackendHandle::Text(Arc::new(WkhtmltopdfBackend::new(
            ctx.section.clone(),
            ctx.sink.clone(),
        ))))
    }
}

/// Subprocess-based HTML engine.
#[derive(Debug)]
pub struct WkhtmltopdfBackend {
    section: Value,
    sink: Arc<dyn OutputSink>,
    binary: EngineBinary,
}

impl WkhtmltopdfBackend {
    /// Create an engine over a `wkhtmltopdf` configuration section. The
    /// binary is taken from `bin` or discovered.
    pub fn new(section: Value, sink: Arc<dyn OutputSink>) -> Self {
        let configured = section.get("bin").and_then(Value::as_str).map(PathBuf::from);
        Self {
            section,
            sink,
            binary: EngineBinary::new(configured, discover_wkhtmltopdf),
        }
    }

    fn binary(&self) -> Result<PathBuf> {
        self.binary
            .path()
            .ok_or_else(|| Error::not_available(NAME, "wkhtmltopdf binary not found"))
    }

    fn render(&self, html: &str, output: Option<&Path>, options: &Options) -> Result<PdfOutput> {
        let bin = self.binary()?;
        let settings = Settings::new(options, &self.section);

        let scratch = tempfile::Builder::new().prefix("topdf-wk-").tempdir()?;
        let input = scratch.path().join("input.html");
        let target = scratch.path().join("output.pdf");
        fs::write(&input, html)?;

        let mut command = Command::new(bin);
        command.arg("--quiet");
        command.args(page_args(&settings));
        command.arg(&input).arg(&target);

        let timeout = settings
            .number("timeout", &["timeout"])
            .filter(|t| *t > 0.0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let result = run(&mut command, Duration::from_secs_f64(timeout)).map_err(|e| {
            Error::conversion_with(Some(NAME), format!("failed to run wkhtmltopdf: {e}"), e)
        })?;

        if !result.success() {
            return Err(Error::conversion(
                Some(NAME),
                format!("wkhtmltopdf exited with {}: {}", result.status, result.diagnostics()),
            ));
        }

        let pdf = fs::read(&target).map_err(|e| {
            Error::conversion_with(Some(NAME), "wkhtmltopdf produced no output file", e)
        })?;
        if !is_pdf_bytes(&pdf) {
            return Err(Error::conversion(Some(NAME), "wkhtmltopdf output is not a PDF"));
        }

        match output {
            Some(path) => {
                self.sink.write(path, &pdf)?;
                Ok(PdfOutput::File(path.to_path_buf()))
            }
            None => Ok(PdfOutput::Bytes(pdf)),
        }
    }
}

fn page_args(settings: &Settings<'_>) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(encoding) = settings.string("encoding", &["encoding"]) {
        args.extend(["--encoding".to_string(), encoding]);
    }
    if let Some(format) = settings.string("format", &["format"]) {
        args.extend(["--page-size".to_string(), format]);
    }
    if let Some(orientation) = settings.string("orientation", &["orientation"]) {
        let orientation = match orientation.trim().to_ascii_lowercase().as_str() {
            "l" | "landscape" => "Landscape",
            _ => "Portrait",
        };
        args.extend(["--orientation".to_string(), orientation.to_string()]);
    }
    for (side, flag) in [
        ("top", "--margin-top"),
        ("right", "--margin-right"),
        ("bottom", "--margin-bottom"),
        ("left", "--margin-left"),
    ] {
        if let Some(mm) = settings.number(&format!("margin_{side}"), &["margins", side]) {
            args.extend([flag.to_string(), format!("{mm}mm")]);
        }
    }
    if let Some(title) = settings.string("title", &["title"]) {
        args.extend(["--title".to_string(), title]);
    }
    for (part, text_flag, spacing_flag) in [
        ("header", "--header-center", "--header-spacing"),
        ("footer", "--footer-center", "--footer-spacing"),
    ] {
        let Some(text) = settings.string(part, &[part]).filter(|t| !t.trim().is_empty()) else {
            continue;
        };
        args.extend([text_flag.to_string(), running_text(&text)]);
        if let Some(mm) = settings.number(&format!("margin_{part}"), &["margins", part]) {
            args.extend([spacing_flag.to_string(), mm.to_string()]);
        }
    }
    args
}

/// Header or footer text with page placeholders in wkhtmltopdf's syntax.
fn running_text(text: &str) -> String {
    text.replace("{PAGENO}", "[page]").replace("{nbpg}", "[topage]")
}

/// Escape text for inclusion in HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn html_page(body: &str, options: &Options) -> String {
    let css = options
        .get("css")
        .and_then(Value::as_str)
        .unwrap_or_default();
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\
         <style>body{{font-family:sans-serif;font-size:12pt}}\
         table{{border-collapse:collapse;width:100%}}\
         th,td{{border:1px solid #444;padding:4px;text-align:left}}{css}</style>\
         </head><body>{body}</body></html>"
    )
}

/// Plain text as an HTML page, one paragraph per blank-line-separated run.
pub fn text_to_html(text: &str, options: &Options) -> String {
    let body: String = text
        .split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .map(|p| {
            let lines: Vec<String> = p.lines().map(escape_html).collect();
            format!("<p>{}</p>", lines.join("<br>"))
        })
        .collect();
    html_page(&body, options)
}

/// CSV as an HTML page holding one table. The first row is a header
/// unless `csv_header` is false.
pub fn csv_to_html(csv: &str, options: &Options) -> String {
    let delimiter = options.csv_delimiter();
    let header = options.csv_header();
    let mut body = String::from("<table>");
    for (i, line) in csv.lines().filter(|l| !l.trim().is_empty()).enumerate() {
        let cell = if header && i == 0 { "th" } else { "td" };
        body.push_str("<tr>");
        for value in split_csv_line(line, delimiter) {
            body.push_str(&format!("<{cell}>{}</{cell}>", escape_html(value.trim())));
        }
        body.push_str("</tr>");
    }
    body.push_str("</table>");
    html_page(&body, options)
}

impl Backend for WkhtmltopdfBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn supported_formats(&self) -> Vec<String> {
        FORMATS.iter().map(|f| f.to_string()).collect()
    }

    fn is_available(&self) -> bool {
        self.binary().is_ok()
    }

    fn unavailable_reason(&self) -> Option<String> {
        self.binary().err().map(|_| {
            "wkhtmltopdf binary not found; set wkhtmltopdf.bin or TOPDF_WKHTMLTOPDF_BIN".to_string()
        })
    }

    fn version(&self) -> Option<String> {
        self.binary.version()
    }
}

impl TextBackend for WkhtmltopdfBackend {
    fn convert_text(
        &self,
        content: &str,
        output: Option<&Path>,
        options: &Options,
    ) -> Result<PdfOutput> {
        self.render(&text_to_html(content, options), output, options)
    }

    fn convert_html(
        &self,
        content: &str,
        output: Option<&Path>,
        options: &Options,
    ) -> Result<PdfOutput> {
        self.render(content, output, options)
    }

    fn convert_csv(
        &self,
        content: &str,
        output: Option<&Path>,
        options: &Options,
    ) -> Result<PdfOutput> {
        self.render(&csv_to_html(content, options), output, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use serde_json::json;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn test_text_to_html() {
        let html = text_to_html("one\ntwo\n\n<three>", &Options::new());
        assert!(html.contains("<p>one<br>two</p><p>&lt;three&gt;</p>"));
    }

    #[test]
    fn test_csv_to_html() {
        let html = csv_to_html("Name,Age\n\nJohn,25", &Options::new().with("css", "td{color:red}"));
        assert!(html.contains("<tr><th>Name</th><th>Age</th></tr><tr><td>John</td><td>25</td></tr>"));
        assert!(html.contains("td{color:red}"));

        let html = csv_to_html("a,b", &Options::new().with("csv_has_header", false));
        assert!(html.contains("<tr><td>a</td><td>b</td></tr>"));
    }

    #[test]
    fn test_page_args() {
        let section = json!({ "format": "A4", "orientation": "P", "margins": { "top": 16 } });
        let options = Options::new().with("orientation", "landscape");
        let args = page_args(&Settings::new(&options, &section));
        assert_eq!(
            args,
            vec![
                "--page-size",
                "A4",
                "--orientation",
                "Landscape",
                "--margin-top",
                "16mm"
            ]
        );
    }

    #[test]
    fn test_header_and_footer_args() {
        let section = json!({ "margins": { "header": 4, "footer": 6.5 } });
        let options = Options::new()
            .with("header", "Draft")
            .with("footer", "Page {PAGENO} of {nbpg}");
        let args = page_args(&Settings::new(&options, &section));
        assert_eq!(
            args,
            vec![
                "--header-center",
                "Draft",
                "--header-spacing",
                "4",
                "--footer-center",
                "Page [page] of [topage]",
                "--footer-spacing",
                "6.5"
            ]
        );

        let options = Options::new().with("margin_header", 4);
        assert!(page_args(&Settings::new(&options, &json!({}))).is_empty());
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let backend = WkhtmltopdfBackend::new(
            json!({ "bin": "/nonexistent/wkhtmltopdf" }),
            Arc::new(MemorySink::new()),
        );
        // Only meaningful where wkhtmltopdf is not installed.
        if backend.binary.path().is_none() {
            assert!(!backend.is_available());
            assert!(backend.unavailable_reason().is_some());
            let err = backend.convert_text("x", None, &Options::new()).unwrap_err();
            assert!(matches!(err, Error::ConverterNotAvailable { .. }));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_fake_engine_round_trip() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("wkhtmltopdf");
        fs::write(
            &bin,
            "#!/bin/sh\n\
             if [ \"$1\" = \"--version\" ]; then echo 'wkhtmltopdf 0.12.6'; exit 0; fi\n\
             for last; do :; done\n\
             printf '%%PDF-1.4 fake' > \"$last\"\n",
        )
        .unwrap();
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();

        let sink = Arc::new(MemorySink::new());
        let backend = WkhtmltopdfBackend::new(json!({ "bin": bin, "timeout": 10 }), sink.clone());
        assert!(backend.is_available());
        assert_eq!(backend.version().as_deref(), Some("wkhtmltopdf 0.12.6"));

        let out = backend
            .convert_html("<p>hi</p>", None, &Options::new())
            .unwrap();
        assert_eq!(out.as_bytes(), Some(&b"%PDF-1.4 fake"[..]));

        let path = Path::new("reports/table.pdf");
        backend
            .convert_csv("a,b\n1,2", Some(path), &Options::new())
            .unwrap();
        assert_eq!(sink.get(path).unwrap(), b"%PDF-1.4 fake");
    }
}
