// Application state shared by all request handlers

use crate::config::Config;
use crate::error::AppError;
use crate::store::DocumentDb;
use std::sync::Arc;

/// Handle passed to every handler through axum's `State` extractor
pub type SharedState = Arc<AppState>;

/// Main application state
#[derive(Debug, Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Config,
    /// Document and file record store
    pub db: DocumentDb,
}

impl AppState {
    /// Create state from an already opened store
    pub fn new(config: Config, db: DocumentDb) -> Self {
        Self { config, db }
    }

    /// Open the configured database and build shared state
    pub async fn open(config: Config) -> Result<SharedState, AppError> {
        let db = DocumentDb::new(&config.site.database_path).await?;
        Ok(Arc::new(Self::new(config, db)))
    }
}
