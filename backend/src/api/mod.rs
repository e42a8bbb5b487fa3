//! API module
//!
//! Contains HTTP request handlers for export, document and upload endpoints

pub mod documents;
pub mod export;
pub mod files;
