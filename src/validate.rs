//! Pre-flight input validation.
//!
//! All checks are deterministic for a given input and [`ValidationConfig`].
//! The only side effect is creating a missing output directory in
//! [`InputValidator::validate_output_path`].

use crate::config::{Options, ValidationConfig};
use crate::detect::extension_of;
use crate::error::{Error, Result};
use crate::sink::{parent_dir, OutputSink};
use std::fs;
use std::path::Path;

const MB: f64 = 1024.0 * 1024.0;
const KB: f64 = 1024.0;

/// Stateless input checks driven by `validation.*` configuration.
#[derive(Debug, Clone, Default)]
pub struct InputValidator {
    config: ValidationConfig,
}

impl InputValidator {
    /// Create a validator with the given limits.
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// The limits in effect.
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Reject empty (after trimming) or oversized text.
    pub fn validate_text(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(Error::validation("Text content cannot be empty"));
        }

        if text.len() > self.config.max_text_length {
            return Err(Error::validation(format!(
                "Text is too long: {:.2}KB exceeds the maximum allowed length of {:.2}KB",
                text.len() as f64 / KB,
                self.config.max_text_length as f64 / KB
            )));
        }

        Ok(())
    }

    /// Check that `path` is an existing, readable file within the size limit
    /// and with an allowed extension.
    pub fn validate_file(&self, path: &Path) -> Result<()> {
        let name = display_name(path);

        let metadata = fs::metadata(path)
            .map_err(|_| Error::validation(format!("File not found: {name}")))?;
        if !metadata.is_file() {
            return Err(Error::validation(format!("Not a regular file: {name}")));
        }
        if fs::File::open(path).is_err() {
            return Err(Error::validation(format!("File is not readable: {name}")));
        }

        if metadata.len() > self.config.max_file_size {
            return Err(Error::validation(format!(
                "File size ({:.2}MB) exceeds maximum allowed size ({:.2}MB)",
                metadata.len() as f64 / MB,
                self.config.max_file_size as f64 / MB
            )));
        }

        let ext = extension_of(path).unwrap_or_default();
        if !self.extension_allowed(&ext) {
            return Err(Error::validation(format!(
                "Unsupported file extension: '{ext}'. Allowed: {}",
                self.config.allowed_extensions.join(", ")
            )));
        }

        Ok(())
    }

    fn extension_allowed(&self, ext: &str) -> bool {
        !ext.is_empty()
            && self
                .config
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }

    /// Make sure a PDF can be written to `path`: the parent directory exists
    /// (it is created if missing) and is writable, and any existing file at
    /// `path` is writable.
    pub fn validate_output_path(&self, path: &Path, sink: &dyn OutputSink) -> Result<()> {
        let dir = parent_dir(path);

        if !sink.dir_exists(dir) {
            sink.prepare_dir(dir).map_err(|e| {
                Error::validation(format!(
                    "Cannot create output directory {}: {e}",
                    display_name(dir)
                ))
            })?;
        }

        if !sink.dir_writable(dir) {
            return Err(Error::validation(format!(
                "Output directory is not writable: {}",
                display_name(dir)
            )));
        }

        if sink.exists(path) && !sink.file_writable(path) {
            return Err(Error::validation(format!(
                "Output file exists and is not writable: {}",
                display_name(path)
            )));
        }

        Ok(())
    }

    /// Validate CSV text: it must pass [`Self::validate_text`], and every
    /// non-blank line must have as many columns as the first non-blank line.
    ///
    /// The delimiter comes from `options.csv_delimiter` (default `,`).
    /// Line numbers in errors are 1-based positions in the input.
    pub fn validate_csv(&self, content: &str, options: &Options) -> Result<()> {
        self.validate_text(content)?;

        let delimiter = options.csv_delimiter();
        let mut expected: Option<usize> = None;

        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let columns = split_csv_line(line, delimiter).len();
            match expected {
                None => expected = Some(columns),
                Some(want) if want != columns => {
                    return Err(Error::validation(format!(
                        "CSV line {} has {columns} columns, expected {want}",
                        index + 1
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

/// Split one CSV line into fields.
///
/// Fields may be wrapped in double quotes, in which case the delimiter is
/// literal inside them and `""` stands for one quote character.
pub fn split_csv_line(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else if c == '"' && field.trim().is_empty() {
            field.clear();
            in_quotes = true;
        } else if c == delimiter {
            fields.push(std::mem::take(&mut field));
        } else {
            field.push(c);
        }
    }
    fields.push(field.trim_end_matches('\r').to_string());
    fields
}

/// The last component of a path, for messages that must not leak full paths.
pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    fn validator() -> InputValidator {
        InputValidator::default()
    }

    #[test]
    fn test_validate_text() {
        let v = validator();
        assert!(v.validate_text("hello").is_ok());

        let err = v.validate_text("  \n\t ").unwrap_err();
        assert!(err.to_string().contains("empty"));

        let small = InputValidator::new(ValidationConfig {
            max_text_length: 4,
            ..Default::default()
        });
        assert!(small.validate_text("abcd").is_ok());
        let err = small.validate_text("abcde").unwrap_err();
        assert!(err.to_string().contains("too long"));
    }

    #[test]
    fn test_split_csv_line() {
        assert_eq!(split_csv_line("a,b,c", ','), vec!["a", "b", "c"]);
        assert_eq!(split_csv_line("a;\"b;c\";d", ';'), vec!["a", "b;c", "d"]);
        assert_eq!(
            split_csv_line("\"say \"\"hi\"\"\",x", ','),
            vec!["say \"hi\"", "x"]
        );
        assert_eq!(split_csv_line("a,,", ','), vec!["a", "", ""]);
        assert_eq!(split_csv_line("a,b\r", ','), vec!["a", "b"]);
    }

    #[test]
    fn test_validate_csv_consistent() {
        let v = validator();
        let options = Options::new();
        assert!(v.validate_csv("Name,Age\nJohn,25\nJane,30", &options).is_ok());
        assert!(v.validate_csv("Name,Age\n\nJohn,25\n   \n", &options).is_ok());
    }

    #[test]
    fn test_validate_csv_reports_line() {
        let v = validator();
        let err = v
            .validate_csv("Name,Age\nJohn,25,Extra\nJane,30", &Options::new())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("line 2"), "got: {err}");
    }

    #[test]
    fn test_validate_csv_custom_delimiter() {
        let v = validator();
        let options = Options::new().with_csv_delimiter(';');
        assert!(v.validate_csv("a;b\nc;d", &options).is_ok());
        // With ';' each line is a single column, so commas do not matter.
        assert!(v.validate_csv("a,b\nc", &options).is_ok());
        assert!(v.validate_csv("a;b\nc", &options).is_err());
    }

    #[test]
    fn test_validate_csv_empty() {
        let err = validator().validate_csv("\n \n", &Options::new()).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_validate_file() {
        let dir = tempfile::tempdir().unwrap();
        let v = InputValidator::new(ValidationConfig {
            max_file_size: 8,
            ..Default::default()
        });

        let missing = dir.path().join("missing.txt");
        let err = v.validate_file(&missing).unwrap_err();
        assert!(err.to_string().contains("File not found: missing.txt"));
        // Only the file name is reported.
        assert!(!err.to_string().contains(&*dir.path().to_string_lossy()));

        let ok = dir.path().join("Notes.TXT");
        fs::write(&ok, "short").unwrap();
        assert!(v.validate_file(&ok).is_ok());

        let big = dir.path().join("big.txt");
        fs::write(&big, "way more than eight bytes").unwrap();
        assert!(v.validate_file(&big).unwrap_err().to_string().contains("exceeds"));

        let odd = dir.path().join("data.xyz");
        fs::write(&odd, "x").unwrap();
        assert!(v.validate_file(&odd).unwrap_err().to_string().contains("xyz"));

        assert!(v.validate_file(dir.path()).is_err());
    }

    #[test]
    fn test_validate_output_path_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/out.pdf");
        validator()
            .validate_output_path(&target, &crate::sink::FsSink::new())
            .unwrap();
        assert!(dir.path().join("a/b").is_dir());
        assert!(!target.exists());
    }

    #[test]
    fn test_validate_output_path_rejections() {
        let sink = MemorySink::new();
        let v = validator();

        sink.mark_read_only("ro");
        let err = v
            .validate_output_path(Path::new("ro/sub/out.pdf"), &sink)
            .unwrap_err();
        assert!(err.to_string().contains("Cannot create output directory"));

        sink.prepare_dir(Path::new("locked")).unwrap();
        sink.mark_read_only("locked");
        let err = v
            .validate_output_path(Path::new("locked/out.pdf"), &sink)
            .unwrap_err();
        assert!(err.to_string().contains("not writable"));

        sink.insert("out/existing.pdf", b"%PDF".to_vec());
        sink.mark_read_only("out/existing.pdf");
        let err = v
            .validate_output_path(Path::new("out/existing.pdf"), &sink)
            .unwrap_err();
        assert!(err.to_string().contains("Output file exists"));
    }
}
