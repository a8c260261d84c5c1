//! Error types for topdf.

use std::io;
use thiserror::Error;

/// Result type alias for topdf operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed cause carried by [`Error::Conversion`].
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error types that can occur while routing a conversion.
#[derive(Error, Debug)]
pub enum Error {
    /// Input failed a pre-flight check. Raised before any backend is touched.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// No backend can handle the requested or detected format.
    #[error("Unsupported format: {format}. Supported formats: {}", .supported.join(", "))]
    UnsupportedFormat {
        /// The format that was attempted.
        format: String,
        /// Every format currently supported.
        supported: Vec<String>,
    },

    /// A named backend is known but its engine is not present or loadable.
    #[error(
        "Converter '{converter}' is not available: {reason}\n\
         Check Router::available_converters() for details."
    )]
    ConverterNotAvailable {
        /// Backend name.
        converter: String,
        /// Human-readable reason.
        reason: String,
    },

    /// A backend accepted the request but failed while rendering, or no
    /// backend could be resolved.
    #[error("{}{message}", .converter.as_deref().map(|c| format!("[{c}] ")).unwrap_or_default())]
    Conversion {
        /// Backend name, when known.
        converter: Option<String>,
        /// Description of the failure.
        message: String,
        /// Originating cause.
        #[source]
        source: Option<Cause>,
    },

    /// I/O error when reading inputs or writing outputs.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A backend crashed in a way it did not report as an error.
    #[error("Unexpected backend failure: {0}")]
    Fatal(String),

    /// Configuration could not be interpreted.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Copyable discriminant of [`Error`], used for logging and matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input rejected before conversion.
    Validation,
    /// No backend handles the format.
    UnsupportedFormat,
    /// The backend's engine is missing.
    ConverterNotAvailable,
    /// Rendering failed inside a backend.
    Conversion,
    /// Reading input or writing output failed.
    Io,
    /// A backend panicked or broke its contract.
    Fatal,
    /// Configuration could not be parsed.
    InvalidConfig,
}

impl Error {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Create a conversion error without a cause.
    pub fn conversion(converter: Option<&str>, message: impl Into<String>) -> Self {
        Error::Conversion {
            converter: converter.map(str::to_string),
            message: message.into(),
            source: None,
        }
    }

    /// Create a conversion error wrapping a cause.
    pub fn conversion_with(
        converter: Option<&str>,
        message: impl Into<String>,
        source: impl Into<Cause>,
    ) -> Self {
        Error::Conversion {
            converter: converter.map(str::to_string),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create an unsupported format error.
    pub fn unsupported(format: impl Into<String>, supported: Vec<String>) -> Self {
        Error::UnsupportedFormat {
            format: format.into(),
            supported,
        }
    }

    /// Create a converter-not-available error.
    pub fn not_available(converter: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::ConverterNotAvailable {
            converter: converter.into(),
            reason: reason.into(),
        }
    }

    /// Get the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            Error::ConverterNotAvailable { .. } => ErrorKind::ConverterNotAvailable,
            Error::Conversion { .. } => ErrorKind::Conversion,
            Error::Io(_) => ErrorKind::Io,
            Error::Fatal(_) => ErrorKind::Fatal,
            Error::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }

    /// Wrap anything outside the taxonomy as a conversion error tagged with
    /// the backend name.
    pub(crate) fn into_conversion(self, converter: Option<&str>) -> Self {
        match self {
            Error::Io(e) => Error::conversion_with(converter, format!("I/O failure: {e}"), e),
            Error::Conversion {
                converter: None,
                message,
                source,
            } => Error::Conversion {
                converter: converter.map(str::to_string),
                message,
                source,
            },
            other => other,
        }
    }
}
