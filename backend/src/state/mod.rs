// State management module
// Holds the shared handler state: configuration and the document store

pub mod app_state;

pub use app_state::{AppState, SharedState};
