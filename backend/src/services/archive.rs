//! Archive packaging
//!
//! Builds the in-memory ZIP returned by the export endpoint.

use crate::error::AppError;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Download name of the export archive
pub const ARCHIVE_NAME: &str = "instrumentation_files.zip";

/// Incrementally assembled DEFLATE ZIP archive
pub struct ArchiveBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    entries: Vec<String>,
}

impl ArchiveBuilder {
    /// Start an empty archive
    pub fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            entries: Vec::new(),
        }
    }

    /// Add a file entry
    ///
    /// Entry names must be unique; a duplicate is rejected before anything
    /// is written, leaving the archive usable.
    pub fn add_file(&mut self, name: &str, content: &[u8]) -> Result<(), AppError> {
        if self.entries.iter().any(|entry| entry == name) {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Duplicate archive entry: {}",
                name
            )));
        }

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.writer.start_file(name, options)?;
        self.writer
            .write_all(content)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to write {}: {}", name, e)))?;
        self.entries.push(name.to_string());
        Ok(())
    }

    /// Names of the entries added so far
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Finish the archive and return its bytes
    pub fn finish(self) -> Result<Vec<u8>, AppError> {
        Ok(self.writer.finish()?.into_inner())
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}
