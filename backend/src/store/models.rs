//! Store data models
//!
//! Defines the Instrumentation Files document and attachment file records.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An Instrumentation Files document
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct InstrumentationFile {
    /// Document identifier
    pub name: String,
    /// JSON-encoded list of instrument rows
    pub instrumentation_output_data: Option<String>,
    /// JSON-encoded list of valve rows
    pub valve_output_data: Option<String>,
    /// File URL of the attached drawing, if any
    pub instrumentation_dwg_file_path: Option<String>,
    /// When the document was created (Unix timestamp)
    pub created_at: i64,
    /// When the document was last updated (Unix timestamp)
    pub updated_at: i64,
}

impl InstrumentationFile {
    /// Create a new, empty document
    pub fn new(name: String) -> Self {
        let now = Utc::now().timestamp();
        Self {
            name,
            instrumentation_output_data: None,
            valve_output_data: None,
            instrumentation_dwg_file_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the instrument rows JSON
    pub fn with_instrumentation_data(mut self, json: impl Into<String>) -> Self {
        self.instrumentation_output_data = Some(json.into());
        self
    }

    /// Set the valve rows JSON
    pub fn with_valve_data(mut self, json: impl Into<String>) -> Self {
        self.valve_output_data = Some(json.into());
        self
    }

    /// Set the drawing attachment URL
    pub fn with_dwg_file(mut self, file_url: impl Into<String>) -> Self {
        self.instrumentation_dwg_file_path = Some(file_url.into());
        self
    }
}

/// An uploaded file registered with the site
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct FileRecord {
    /// Site-relative URL, `/files/...` or `/private/files/...`
    pub file_url: String,
    /// Original file name
    pub file_name: String,
    /// Whether the file lives under `private/files`
    pub is_private: bool,
    /// Size in bytes
    pub file_size: i64,
    /// When the file was registered (Unix timestamp)
    pub created_at: i64,
}

impl FileRecord {
    /// Create a new file record
    pub fn new(file_url: String, file_name: String, is_private: bool, file_size: i64) -> Self {
        Self {
            file_url,
            file_name,
            is_private,
            file_size,
            created_at: Utc::now().timestamp(),
        }
    }
}
