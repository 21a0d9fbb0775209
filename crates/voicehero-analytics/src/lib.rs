//! Ingest API for widget analytics events

pub mod handlers;
pub mod services;
pub mod types;

// Re-export main types
pub use handlers::{configure_routes, AnalyticsApiDoc, AppState};
pub use services::*;
pub use types::*;
