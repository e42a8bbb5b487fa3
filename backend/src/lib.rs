//! Instrumentation Export Library
//!
//! This library exposes modules for testing and external use.
//! The main binary is in `src/main.rs`.

pub mod api;
pub mod config;
pub mod error;
pub mod report;
pub mod services;
/// Application state management
///
/// Shared configuration and the document store handed to every handler.
pub mod state;
pub mod store;
