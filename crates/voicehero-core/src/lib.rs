//! Core utilities and types shared across all VoiceHero crates

pub mod error;
pub mod events;
pub mod error_builder;
pub mod problemdetails;
pub use problemdetails::ProblemDetails;
pub mod types;

pub use error::*;
pub use events::*;
pub use error_builder::*;
pub use types::*;

// Re-export external dependencies
pub use chrono;
pub use serde;
pub use serde_json;
pub use thiserror;
