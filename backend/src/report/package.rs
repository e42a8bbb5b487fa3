//! Workbook package access
//!
//! An `.xlsx` file is a ZIP package of XML parts. The package is held fully in
//! memory so individual parts can be rewritten before saving.

use super::error::TemplateError;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// In-memory ZIP package, part order preserved
#[derive(Debug, Clone, Default)]
pub struct Package {
    parts: Vec<(String, Vec<u8>)>,
}

impl Package {
    /// Read every file entry of a ZIP package
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TemplateError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = Vec::with_capacity(archive.len());

        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut content = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut content)
                .map_err(|source| TemplateError::Io {
                    path: name.clone(),
                    source,
                })?;
            parts.push((name, content));
        }

        Ok(Self { parts })
    }

    /// Get a part by name
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(part, _)| part == name)
            .map(|(_, content)| content.as_slice())
    }

    /// Get a part by name, failing when it is absent
    pub fn require(&self, name: &str) -> Result<&[u8], TemplateError> {
        self.get(name)
            .ok_or_else(|| TemplateError::MissingPart(name.to_string()))
    }

    /// Replace the content of an existing part, or append a new one
    pub fn set(&mut self, name: &str, content: Vec<u8>) {
        match self.parts.iter_mut().find(|(part, _)| part == name) {
            Some((_, existing)) => *existing = content,
            None => self.parts.push((name.to_string(), content)),
        }
    }

    /// Remove a part, returning whether it existed
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.parts.len();
        self.parts.retain(|(part, _)| part != name);
        self.parts.len() != before
    }

    /// Names of all parts in package order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(name, _)| name.as_str())
    }

    /// Write the package as a DEFLATE-compressed ZIP
    pub fn to_bytes(&self) -> Result<Vec<u8>, TemplateError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, content) in &self.parts {
            writer.start_file(name.as_str(), options)?;
            writer
                .write_all(content)
                .map_err(|source| TemplateError::Io {
                    path: name.clone(),
                    source,
                })?;
        }

        Ok(writer.finish()?.into_inner())
    }
}

/// Directory portion of a part name, with trailing slash (`xl/` for `xl/workbook.xml`)
pub fn part_dir(name: &str) -> &str {
    match name.rfind('/') {
        Some(index) => &name[..=index],
        None => "",
    }
}

/// Relationships part that belongs to `name` (`xl/_rels/workbook.xml.rels`)
pub fn rels_path(name: &str) -> String {
    let dir = part_dir(name);
    let file = &name[dir.len()..];
    format!("{}_rels/{}.rels", dir, file)
}

/// Resolve a relationship target against the directory of its source part
///
/// Absolute targets (`/xl/worksheets/sheet1.xml`) are package-rooted;
/// relative ones are joined to `base_dir` with `.` and `..` segments folded.
pub fn resolve_target(base_dir: &str, target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("{}{}", base_dir, target),
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
