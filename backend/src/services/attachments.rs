//! Attachment file service
//!
//! Resolves site file URLs to paths on disk, reads attachment content and
//! stores uploads, with proper error handling and validation.

use crate::error::AppError;
use crate::store::{DocumentDb, FileRecord};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// URL prefix of files stored under `private/files`
pub const PRIVATE_PREFIX: &str = "/private/files/";
/// URL prefix of files stored under `public/files`
pub const PUBLIC_PREFIX: &str = "/files/";

/// Attachment file service
pub struct FileService;

impl FileService {
    /// Validate and canonicalize a path
    ///
    /// # Arguments
    /// * `path` - Path to validate
    ///
    /// # Returns
    /// * `Ok(PathBuf)` - Canonicalized absolute path
    /// * `Err(AppError)` - If path doesn't exist or cannot be accessed
    pub fn validate_and_canonicalize_path(path: &Path) -> Result<PathBuf, AppError> {
        if !path.exists() {
            return Err(AppError::FileNotFound(format!(
                "Path does not exist: {}",
                path.display()
            )));
        }

        path.canonicalize()
            .map_err(|e| AppError::InvalidPath(format!("{} - {}", path.display(), e)))
    }

    /// Map a file URL to its location under the site directory
    ///
    /// `/files/<name>` lives in `<site>/public/files`, `/private/files/<name>`
    /// in `<site>/private/files`. The relative part may not climb out of its
    /// directory.
    ///
    /// # Returns
    /// * `Ok(PathBuf)` - Path of the file (which may not exist yet)
    /// * `Err(AppError)` - If the URL has an unknown prefix or an unsafe path
    pub fn resolve_file_url(site_dir: &Path, file_url: &str) -> Result<PathBuf, AppError> {
        let (base, relative) = if let Some(rest) = file_url.strip_prefix(PRIVATE_PREFIX) {
            (site_dir.join("private").join("files"), rest)
        } else if let Some(rest) = file_url.strip_prefix(PUBLIC_PREFIX) {
            (site_dir.join("public").join("files"), rest)
        } else {
            return Err(AppError::InvalidPath(format!(
                "Unsupported file URL: {}",
                file_url
            )));
        };

        let relative = Path::new(relative);
        let safe = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if relative.as_os_str().is_empty() || !safe {
            return Err(AppError::InvalidPath(format!(
                "Unsafe file URL: {}",
                file_url
            )));
        }

        Ok(base.join(relative))
    }

    /// Base file name of a file URL, as used for archive entries
    pub fn file_name(file_url: &str) -> Option<String> {
        Path::new(file_url)
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
            .map(|name| name.to_string())
    }

    /// Read the content of a registered file
    ///
    /// # Arguments
    /// * `db` - Store holding the file records
    /// * `site_dir` - Site directory the file URL is relative to
    /// * `file_url` - URL of the file
    ///
    /// # Returns
    /// * `Ok(Vec<u8>)` - File content
    /// * `Err(AppError)` - If no record exists, the file is missing, or it escapes the site
    pub async fn get_content(
        db: &DocumentDb,
        site_dir: &Path,
        file_url: &str,
    ) -> Result<Vec<u8>, AppError> {
        let record = db
            .get_file(file_url)
            .await?
            .ok_or_else(|| AppError::FileNotFound(format!("No file record for {}", file_url)))?;

        let path = Self::resolve_file_url(site_dir, &record.file_url)?;
        let canonical = Self::validate_and_canonicalize_path(&path)?;
        let site = Self::validate_and_canonicalize_path(site_dir)?;
        if !canonical.starts_with(&site) {
            return Err(AppError::PermissionDenied(format!(
                "{} is outside the site directory",
                file_url
            )));
        }

        let content = fs::read(&canonical).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => AppError::FileNotFound(file_url.to_string()),
            _ => AppError::PermissionDenied(format!("Failed to read {}: {}", file_url, e)),
        })?;

        debug!(file_url = %file_url, bytes = content.len(), "Read attachment content");
        Ok(content)
    }

    /// Store an uploaded file and register it
    ///
    /// Only the final component of `file_name` is used. When a file of that
    /// name already exists a short random suffix is added before the extension.
    pub async fn save_upload(
        db: &DocumentDb,
        site_dir: &Path,
        file_name: &str,
        content: &[u8],
        is_private: bool,
    ) -> Result<FileRecord, AppError> {
        let name = Self::file_name(file_name)
            .filter(|name| name != "." && name != "..")
            .ok_or_else(|| AppError::InvalidRequest(format!("Invalid file name: {}", file_name)))?;

        let (dir, prefix) = if is_private {
            (site_dir.join("private").join("files"), PRIVATE_PREFIX)
        } else {
            (site_dir.join("public").join("files"), PUBLIC_PREFIX)
        };
        fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::PermissionDenied(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let mut stored_name = name.clone();
        while fs::try_exists(dir.join(&stored_name)).await.unwrap_or(false) {
            stored_name = with_suffix(&name, &uuid::Uuid::new_v4().simple().to_string()[..8]);
        }

        let path = dir.join(&stored_name);
        fs::write(&path, content).await.map_err(|e| {
            AppError::PermissionDenied(format!("Failed to write {}: {}", path.display(), e))
        })?;

        let record = FileRecord::new(
            format!("{}{}", prefix, stored_name),
            name,
            is_private,
            content.len() as i64,
        );
        db.add_file(&record).await?;

        debug!(file_url = %record.file_url, bytes = content.len(), "Stored upload");
        Ok(record)
    }
}

/// `plant.dwg` + `ab12` -> `plant-ab12.dwg`
fn with_suffix(name: &str, suffix: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => format!("{}-{}.{}", stem, suffix, extension),
        _ => format!("{}-{}", name, suffix),
    }
}
