//! Office document engine driving LibreOffice in headless mode.
//!
//! `soffice --headless --convert-to pdf --outdir <scratch> <input>` writes
//! `<stem>.pdf` into a private scratch directory, from where the PDF is
//! handed to the output sink: at the requested output path, or under
//! `libreoffice.output_dir` (the system temp directory by default).
//!
//! Each run gets its own LibreOffice user profile inside the scratch
//! directory so concurrent conversions do not contend for the profile lock.

use super::discovery::{discover_libreoffice, EngineBinary};
use super::process::run;
use super::{Backend, BackendContext, BackendFactory, BackendHandle, FileBackend};
use crate::config::{Options, Settings};
use crate::detect::{
    extension_of, InputKind, DOCUMENT_EXTENSIONS, PRESENTATION_EXTENSIONS, SPREADSHEET_EXTENSIONS,
};
use crate::error::{Error, Result};
use crate::sink::{parent_dir, OutputSink};
use crate::validate::display_name;
use serde_json::Value;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

/// Backend name.
pub const NAME: &str = "libreoffice";

const DEFAULT_TIMEOUT_SECS: f64 = 120.0;

/// Creates [`OfficeBackend`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfficeFactory;

impl BackendFactory for OfficeFactory {
    fn name(&self) -> &str {
        NAME
    }

    fn create(&self, ctx: &BackendContext) -> Result<BackendHandle> {
        Ok(BackendHandle::File(Arc::new(OfficeBackend::new(
            ctx.section.clone(),
            ctx.sink.clone(),
        ))))
    }
}

/// LibreOffice-based file engine.
#[derive(Debug)]
pub struct OfficeBackend {
    section: Value,
    sink: Arc<dyn OutputSink>,
    binary: EngineBinary,
}

impl OfficeBackend {
    /// Create an engine over a `libreoffice` configuration section. The
    /// binary is taken from `bin` or discovered.
    pub fn new(section: Value, sink: Arc<dyn OutputSink>) -> Self {
        let configured = section.get("bin").and_then(Value::as_str).map(PathBuf::from);
        Self {
            section,
            sink,
            binary: EngineBinary::new(configured, discover_libreoffice),
        }
    }

    fn binary(&self) -> Result<PathBuf> {
        self.binary
            .path()
            .ok_or_else(|| Error::not_available(NAME, "LibreOffice binary not found"))
    }

    fn dir_setting(&self, options: &Options, key: &str) -> Option<PathBuf> {
        Settings::new(options, &self.section)
            .string(key, &[key])
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
    }

    fn check_kind(&self, input: &Path, accepted: &[&str], extra: &[&str]) -> Result<()> {
        let ext = extension_of(input).unwrap_or_default();
        if accepted.contains(&ext.as_str()) || extra.contains(&ext.as_str()) {
            Ok(())
        } else {
            Err(Error::unsupported(ext, self.supported_formats()))
        }
    }

    fn perform(&self, input: &Path, output: Option<&Path>, options: &Options) -> Result<PathBuf> {
        if !input.is_file() {
            return Err(Error::conversion(
                Some(NAME),
                format!("Input file not found: {}", display_name(input)),
            ));
        }
        let bin = self.binary()?;
        let settings = Settings::new(options, &self.section);

        let mut scratch = tempfile::Builder::new();
        scratch.prefix("topdf-lo-");
        let scratch = match self.dir_setting(options, "temp_dir") {
            Some(dir) => scratch.tempdir_in(dir)?,
            None => scratch.tempdir()?,
        };
        let profile = scratch.path().join("profile");

        let mut command = Command::new(bin);
        command
            .arg(format!("-env:UserInstallation={}", file_url(&profile)))
            .args(["--headless", "--norestore", "--convert-to", "pdf", "--outdir"])
            .arg(scratch.path())
            .arg(input);

        let timeout = settings
            .number("timeout", &["timeout"])
            .filter(|t| *t > 0.0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let result = run(&mut command, Duration::from_secs_f64(timeout)).map_err(|e| {
            Error::conversion_with(Some(NAME), format!("LibreOffice conversion failed: {e}"), e)
        })?;
        if !result.success() {
            return Err(Error::conversion(
                Some(NAME),
                format!(
                    "LibreOffice conversion failed with {}: {}",
                    result.status,
                    result.diagnostics()
                ),
            ));
        }

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let generated = scratch.path().join(format!("{stem}.pdf"));
        let pdf = fs::read(&generated).map_err(|e| {
            Error::conversion_with(
                Some(NAME),
                format!("Conversion completed but output file not found: {stem}.pdf"),
                e,
            )
        })?;

        let destination = match output {
            Some(path) => path.to_path_buf(),
            None => self
                .dir_setting(options, "output_dir")
                .unwrap_or_else(env::temp_dir)
                .join(format!("{stem}.pdf")),
        };
        let dir = parent_dir(&destination);
        if !self.sink.dir_exists(dir) {
            self.sink.prepare_dir(dir)?;
        }
        self.sink.write(&destination, &pdf)?;
        log::debug!(
            "LibreOffice converted {} in {:.3}s",
            display_name(input),
            result.elapsed.as_secs_f64()
        );
        Ok(destination)
    }
}

fn file_url(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    if raw.starts_with('/') {
        format!("file://{raw}")
    } else {
        format!("file:///{raw}")
    }
}

impl Backend for OfficeBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn supported_formats(&self) -> Vec<String> {
        DOCUMENT_EXTENSIONS
            .iter()
            .chain(SPREADSHEET_EXTENSIONS)
            .chain(&["csv"])
            .chain(PRESENTATION_EXTENSIONS)
            .map(|f| f.to_string())
            .collect()
    }

    fn is_available(&self) -> bool {
        self.binary().is_ok()
    }

    fn unavailable_reason(&self) -> Option<String> {
        self.binary().err().map(|_| {
            "LibreOffice binary not found; set libreoffice.bin or TOPDF_LIBREOFFICE_BIN".to_string()
        })
    }

    fn version(&self) -> Option<String> {
        self.binary.version()
    }
}

impl FileBackend for OfficeBackend {
    fn convert_document(
        &self,
        input: &Path,
        output: Option<&Path>,
        options: &Options,
    ) -> Result<PathBuf> {
        self.check_kind(input, DOCUMENT_EXTENSIONS, &[])?;
        self.perform(input, output, options)
    }

    fn convert_spreadsheet(
        &self,
        input: &Path,
        output: Option<&Path>,
        options: &Options,
    ) -> Result<PathBuf> {
        self.check_kind(input, SPREADSHEET_EXTENSIONS, &["csv"])?;
        self.perform(input, output, options)
    }

    fn convert_presentation(
        &self,
        input: &Path,
        output: Option<&Path>,
        options: &Options,
    ) -> Result<PathBuf> {
        self.check_kind(input, PRESENTATION_EXTENSIONS, &[])?;
        self.perform(input, output, options)
    }

    fn convert(&self, input: &Path, output: Option<&Path>, options: &Options) -> Result<PathBuf> {
        match InputKind::from_path(input) {
            Some(InputKind::Document) => self.convert_document(input, output, options),
            Some(InputKind::Spreadsheet) | Some(InputKind::Csv) => {
                self.convert_spreadsheet(input, output, options)
            }
            Some(InputKind::Presentation) => self.convert_presentation(input, output, options),
            _ => Err(Error::unsupported(
                extension_of(input).unwrap_or_default(),
                self.supported_formats(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use serde_json::json;

    fn backend_with(section: Value, sink: Arc<MemorySink>) -> OfficeBackend {
        OfficeBackend::new(section, sink)
    }

    #[test]
    fn test_supported_formats() {
        let backend = backend_with(json!({}), Arc::new(MemorySink::new()));
        let formats = backend.supported_formats();
        for ext in ["doc", "docx", "odt", "rtf", "xls", "xlsx", "ods", "csv", "ppt", "pptx", "odp"] {
            assert!(formats.contains(&ext.to_string()), "missing {ext}");
        }
        assert!(!backend.supports("txt"));
    }

    #[test]
    fn test_kind_checks_come_first() {
        let backend = backend_with(json!({}), Arc::new(MemorySink::new()));
        let err = backend
            .convert_document(Path::new("slides.pptx"), None, &Options::new())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { ref format, .. } if format == "pptx"));

        let err = backend
            .convert(Path::new("notes.txt"), None, &Options::new())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_missing_input() {
        let backend = backend_with(json!({}), Arc::new(MemorySink::new()));
        let err = backend
            .convert_document(Path::new("/nonexistent/report.docx"), None, &Options::new())
            .unwrap_err();
        assert!(err.to_string().contains("Input file not found: report.docx"));
    }

    #[test]
    fn test_file_url() {
        assert_eq!(file_url(Path::new("/tmp/p")), "file:///tmp/p");
    }

    #[cfg(unix)]
    #[test]
    fn test_fake_engine_writes_through_sink() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("soffice");
        // Writes <stem>.pdf into the --outdir argument.
        fs::write(
            &bin,
            "#!/bin/sh\n\
             if [ \"$1\" = \"--version\" ]; then echo 'LibreOffice 7.6.4.1'; exit 0; fi\n\
             while [ $# -gt 0 ]; do\n\
               case \"$1\" in --outdir) out=\"$2\"; shift;; esac\n\
               last=\"$1\"; shift\n\
             done\n\
             name=$(basename \"$last\"); printf '%%PDF-1.7 lo' > \"$out/${name%.*}.pdf\"\n",
        )
        .unwrap();
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();

        let input = dir.path().join("Quarterly.docx");
        fs::write(&input, "not really a docx").unwrap();

        let sink = Arc::new(MemorySink::new());
        let backend = backend_with(
            json!({ "bin": bin, "output_dir": "converted", "timeout": 10 }),
            sink.clone(),
        );
        assert!(backend.is_available());
        assert_eq!(backend.version().as_deref(), Some("LibreOffice 7.6.4.1"));

        let out = backend.convert(&input, None, &Options::new()).unwrap();
        assert_eq!(out, Path::new("converted/Quarterly.pdf"));
        assert_eq!(sink.get(&out).unwrap(), b"%PDF-1.7 lo");

        let explicit = Path::new("final/q.pdf");
        let out = backend
            .convert_document(&input, Some(explicit), &Options::new())
            .unwrap();
        assert_eq!(out, explicit);
        assert!(sink.get(explicit).is_some());
    }
}
