//! Delivery of event payloads to the analytics ingest endpoint.

use crate::config::WidgetConfig;
use crate::error::WidgetError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use voicehero_core::AnalyticsEvent;

pub const ANALYTICS_PATH: &str = "/api/analytics";

/// Body of `POST /api/analytics`: `{ "event": ... }` or `{ "events": [...] }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    Single { event: AnalyticsEvent },
    Batch { events: Vec<AnalyticsEvent> },
}

impl EventPayload {
    pub fn single(event: AnalyticsEvent) -> Self {
        Self::Single { event }
    }

    pub fn batch(events: Vec<AnalyticsEvent>) -> Self {
        Self::Batch { events }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single { .. } => 1,
            Self::Batch { events } => events.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_events(self) -> Vec<AnalyticsEvent> {
        match self {
            Self::Single { event } => vec![event],
            Self::Batch { events } => events,
        }
    }
}

#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Deliver a payload; any non-2xx answer is an error.
    async fn send(&self, payload: &EventPayload) -> Result<(), WidgetError>;

    /// Best-effort delivery that must return immediately and never fail.
    /// Used while the page is being torn down.
    fn beacon(&self, payload: EventPayload);
}

#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, config: &WidgetConfig) -> Self {
        Self {
            client,
            endpoint: config.endpoint(ANALYTICS_PATH),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EventTransport for HttpTransport {
    async fn send(&self, payload: &EventPayload) -> Result<(), WidgetError> {
        let response = self.client.post(&self.endpoint).json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WidgetError::Status {
                status: status.as_u16(),
                url: self.endpoint.clone(),
            });
        }

        debug!("Delivered {} analytics event(s)", payload.len());
        Ok(())
    }

    fn beacon(&self, payload: EventPayload) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No async runtime available, dropping beacon with {} event(s)", payload.len());
                return;
            }
        };

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        handle.spawn(async move {
            match client.post(&endpoint).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("Beacon delivered {} event(s)", payload.len());
                }
                Ok(response) => {
                    debug!("Beacon rejected with status {}", response.status());
                }
                Err(e) => {
                    debug!("Beacon failed: {}", e);
                }
            }
        });
    }
}
