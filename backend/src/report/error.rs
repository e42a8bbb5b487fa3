//! Template-specific error types
//!
//! Errors that can occur while loading, populating or saving a template workbook.

use thiserror::Error;

/// Errors that can occur while working with a template workbook
#[derive(Error, Debug)]
pub enum TemplateError {
    /// Template file could not be read from disk
    #[error("Failed to read template {path}: {source}")]
    Io {
        /// Path of the template that failed to load
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The template is not a readable ZIP package
    #[error("Invalid workbook package: {0}")]
    Package(#[from] zip::result::ZipError),

    /// A part of the workbook XML could not be parsed or written
    #[error("Malformed workbook XML in {part}: {message}")]
    Xml {
        /// Package part the error occurred in
        part: String,
        /// Parser or writer message
        message: String,
    },

    /// A part the workbook needs is missing from the package
    #[error("Workbook part missing: {0}")]
    MissingPart(String),

    /// A cell or range reference could not be parsed
    #[error("Invalid cell reference: {0}")]
    InvalidReference(String),

    /// The workbook contains no worksheets
    #[error("Workbook has no worksheets")]
    NoWorksheets,
}

impl TemplateError {
    pub(crate) fn xml(part: &str, message: impl std::fmt::Display) -> Self {
        TemplateError::Xml {
            part: part.to_string(),
            message: message.to_string(),
        }
    }
}
