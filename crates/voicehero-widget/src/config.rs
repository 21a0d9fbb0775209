//! Widget configuration

use crate::bot::BotFilterConfig;
use crate::error::WidgetError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Queue sizing and flush cadence of the delivery controller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct DeliveryConfig {
    /// Interval between batch flushes while in batched mode
    pub flush_interval_secs: u64,
    /// Maximum number of queued events; the oldest are dropped beyond this
    pub max_queue: usize,
    /// Queue length at which a batch is flushed without waiting for the interval
    pub eager_flush_threshold: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: 10,
            max_queue: 100,
            eager_flush_threshold: 50,
        }
    }
}

impl DeliveryConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }
}

fn default_request_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    /// Base URL of the VoiceHero API, e.g. `https://app.voicehero.dev`
    pub api_base: String,
    pub project_id: String,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub bot_filter: BotFilterConfig,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl WidgetConfig {
    pub fn new(api_base: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            project_id: project_id.into(),
            delivery: DeliveryConfig::default(),
            bot_filter: BotFilterConfig::default(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, WidgetError> {
        let config: WidgetConfig =
            serde_json::from_str(raw).map_err(|e| WidgetError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), WidgetError> {
        url::Url::parse(&self.api_base)
            .map_err(|e| WidgetError::Config(format!("invalid api_base {}: {}", self.api_base, e)))?;
        if self.project_id.trim().is_empty() {
            return Err(WidgetError::Config("project_id must not be empty".to_string()));
        }
        if self.delivery.max_queue == 0 {
            return Err(WidgetError::Config("delivery.max_queue must be positive".to_string()));
        }
        Ok(())
    }

    /// Absolute URL for an API path such as `/api/analytics`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_base.trim_end_matches('/'), path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
