use thiserror::Error;

#[derive(Error, Debug)]
pub enum WidgetError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Storage unavailable: {0}")]
    Storage(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Automated traffic detected, widget disabled")]
    Bot,
}
