use serde::Deserialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Event exactly as posted by the widget. Every field is optional here so
/// that validation can name the one that is missing.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct IncomingEvent {
    pub session_id: Option<String>,
    pub event_type: Option<String>,
    /// Epoch milliseconds
    pub timestamp: Option<i64>,
    pub project_id: Option<String>,
    pub segment_type: Option<String>,
    pub segment_id: Option<String>,
    pub audio_version: Option<String>,
    pub script_version: Option<String>,
    pub audio_url: Option<String>,
    #[schema(value_type = Object)]
    pub metadata: Option<Map<String, Value>>,
    #[schema(value_type = Object)]
    pub user_context: Option<Map<String, Value>>,
}

/// Body of `POST /api/analytics`: one event or a batch
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum IngestRequest {
    Batch { events: Vec<IncomingEvent> },
    Single { event: IncomingEvent },
}

impl IngestRequest {
    pub fn into_events(self) -> Vec<IncomingEvent> {
        match self {
            Self::Batch { events } => events,
            Self::Single { event } => vec![event],
        }
    }
}
