//! Document store
//!
//! SQLite persistence for Instrumentation Files documents and the file
//! records that point at their attachments.

pub mod db;
pub mod models;

pub use db::DocumentDb;
pub use models::{FileRecord, InstrumentationFile};
