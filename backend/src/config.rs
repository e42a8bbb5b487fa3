//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use std::env;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Site layout (file storage and database)
    pub site: SiteConfig,
    /// Template workbook locations
    pub templates: TemplateConfig,
    /// Upload limits
    pub uploads: UploadConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// Site configuration
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Root directory holding `public/files` and `private/files`
    pub site_dir: PathBuf,
    /// Path of the SQLite database
    pub database_path: String,
}

/// Template configuration
#[derive(Debug, Clone)]
pub struct TemplateConfig {
    /// Directory containing the template workbooks
    pub template_dir: PathBuf,
    /// File name of the instrument schedule template
    pub instrument_schedule: String,
    /// File name of the valve list template
    pub valve_list: String,
}

/// Upload configuration
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Largest accepted attachment, in bytes
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let site_dir = env::var("SITE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./site"));
        let database_path = env::var("DATABASE_PATH").unwrap_or_else(|_| {
            site_dir
                .join("instrumentation.db")
                .to_string_lossy()
                .to_string()
        });
        let template_dir = env::var("TEMPLATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| site_dir.join("private").join("files"));

        Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            },
            site: SiteConfig {
                site_dir,
                database_path,
            },
            templates: TemplateConfig {
                template_dir,
                instrument_schedule: env::var("INSTRUMENT_TEMPLATE")
                    .unwrap_or_else(|_| "Instrument Schedule 1.xlsx".to_string()),
                valve_list: env::var("VALVE_TEMPLATE")
                    .unwrap_or_else(|_| "Valve List 1 1.xlsx".to_string()),
            },
            uploads: UploadConfig {
                max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                    .ok()
                    .and_then(|b| b.parse().ok())
                    .unwrap_or(50 * 1024 * 1024),
            },
        }
    }

    /// Configuration rooted at `site_dir`, everything else at defaults
    pub fn for_site<P: Into<PathBuf>>(site_dir: P) -> Self {
        let site_dir = site_dir.into();
        Self {
            server: ServerConfig {
                port: 8080,
                host: "127.0.0.1".to_string(),
            },
            site: SiteConfig {
                database_path: site_dir
                    .join("instrumentation.db")
                    .to_string_lossy()
                    .to_string(),
                site_dir: site_dir.clone(),
            },
            templates: TemplateConfig {
                template_dir: site_dir.join("private").join("files"),
                instrument_schedule: "Instrument Schedule 1.xlsx".to_string(),
                valve_list: "Valve List 1 1.xlsx".to_string(),
            },
            uploads: UploadConfig {
                max_upload_bytes: 50 * 1024 * 1024,
            },
        }
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Full path of the instrument schedule template
    pub fn instrument_template_path(&self) -> PathBuf {
        self.templates
            .template_dir
            .join(&self.templates.instrument_schedule)
    }

    /// Full path of the valve list template
    pub fn valve_template_path(&self) -> PathBuf {
        self.templates.template_dir.join(&self.templates.valve_list)
    }
}
