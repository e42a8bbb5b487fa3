//! Document database operations
//!
//! Handles all database interactions for documents and file records.

use crate::error::AppError;
use crate::store::models::{FileRecord, InstrumentationFile};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};

const DOCUMENT_COLUMNS: &str = "name, instrumentation_output_data, valve_output_data, \
     instrumentation_dwg_file_path, created_at, updated_at";

/// Database connection pool for document operations
#[derive(Debug, Clone)]
pub struct DocumentDb {
    pool: SqlitePool,
}

impl DocumentDb {
    /// Initialize database connection pool
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    ///
    /// # Returns
    /// * `Ok(DocumentDb)` if successful
    /// * `Err(AppError)` if connection failed
    pub async fn new(db_path: &str) -> Result<Self, AppError> {
        // Ensure parent directory exists
        if let Some(parent) = PathBuf::from(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Internal(anyhow::anyhow!("Failed to create db directory: {}", e))
                })?;
            }
        }

        // SQLite connection string format: sqlite:path/to/db.db
        let connection_string = if db_path.starts_with("sqlite:") {
            db_path.to_string()
        } else {
            format!("sqlite:{}", db_path)
        };

        let options = SqliteConnectOptions::from_str(&connection_string)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid database path: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to connect to database: {}", e))
            })?;

        info!("Connected to SQLite database at: {}", db_path);

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations...");

        let migration_sql = include_str!("../../migrations/001_create_instrumentation_files.sql");

        for statement in split_statements(migration_sql) {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    AppError::Internal(anyhow::anyhow!(
                        "Migration failed: {} - Statement: {}",
                        e,
                        statement.chars().take(100).collect::<String>()
                    ))
                })?;
        }

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get all documents, most recently updated first
    pub async fn list_documents(&self) -> Result<Vec<InstrumentationFile>, AppError> {
        let query = format!(
            "SELECT {} FROM instrumentation_files ORDER BY updated_at DESC, name ASC",
            DOCUMENT_COLUMNS
        );
        let documents = sqlx::query_as::<_, InstrumentationFile>(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to fetch documents: {}", e)))?;

        Ok(documents)
    }

    /// Get a document by name
    pub async fn get_document(&self, name: &str) -> Result<Option<InstrumentationFile>, AppError> {
        let query = format!(
            "SELECT {} FROM instrumentation_files WHERE name = ?",
            DOCUMENT_COLUMNS
        );
        let document = sqlx::query_as::<_, InstrumentationFile>(&query)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to fetch document: {}", e)))?;

        Ok(document)
    }

    /// Insert a document, or replace the data fields of an existing one
    ///
    /// `created_at` of an existing document is kept.
    pub async fn upsert_document(&self, document: &InstrumentationFile) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO instrumentation_files (name, instrumentation_output_data, valve_output_data, \
             instrumentation_dwg_file_path, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(name) DO UPDATE SET \
             instrumentation_output_data = excluded.instrumentation_output_data, \
             valve_output_data = excluded.valve_output_data, \
             instrumentation_dwg_file_path = excluded.instrumentation_dwg_file_path, \
             updated_at = excluded.updated_at",
        )
        .bind(&document.name)
        .bind(&document.instrumentation_output_data)
        .bind(&document.valve_output_data)
        .bind(&document.instrumentation_dwg_file_path)
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to save document: {}", e)))?;

        debug!("Saved document: {}", document.name);
        Ok(())
    }

    /// Delete a document, returning whether it existed
    pub async fn delete_document(&self, name: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM instrumentation_files WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to delete document: {}", e))
            })?;

        debug!("Deleted document: {}", name);
        Ok(result.rows_affected() > 0)
    }

    /// Get a file record by its URL
    pub async fn get_file(&self, file_url: &str) -> Result<Option<FileRecord>, AppError> {
        let record = sqlx::query_as::<_, FileRecord>(
            "SELECT file_url, file_name, is_private, file_size, created_at FROM files WHERE file_url = ?",
        )
        .bind(file_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to fetch file record: {}", e)))?;

        Ok(record)
    }

    /// Register a file record, replacing any record with the same URL
    pub async fn add_file(&self, record: &FileRecord) -> Result<(), AppError> {
        sqlx::query(
            "INSERT OR REPLACE INTO files (file_url, file_name, is_private, file_size, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.file_url)
        .bind(&record.file_name)
        .bind(record.is_private)
        .bind(record.file_size)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to add file record: {}", e)))?;

        debug!("Registered file: {}", record.file_url);
        Ok(())
    }
}

/// Split a migration script into statements, dropping `--` comments
fn split_statements(sql: &str) -> Vec<String> {
    let mut cleaned_sql = String::new();
    for line in sql.lines() {
        let without_comments = match line.find("--") {
            Some(comment_pos) => &line[..comment_pos],
            None => line,
        };
        let trimmed = without_comments.trim();
        if trimmed.is_empty() {
            continue;
        }
        cleaned_sql.push_str(trimmed);
        cleaned_sql.push(' ');
    }

    cleaned_sql
        .split(';')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
