use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;
use voicehero_core::UtcDateTime;

#[derive(Debug, Serialize, ToSchema)]
pub struct IngestResponse {
    pub success: bool,
    pub stored: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EventTypeCount {
    pub event_type: String,
    pub count: i64,
    pub percentage: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectSummaryResponse {
    pub project_id: String,
    pub total_events: i64,
    pub unique_sessions: u64,
    pub event_types: Vec<EventTypeCount>,
    /// Mean `completionRate` of `audio.abandoned` events, if any carried one
    pub average_abandonment_completion: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionEvent {
    pub id: i64,
    pub event_type: String,
    /// Client timestamp, epoch milliseconds
    pub timestamp: i64,
    pub segment_type: String,
    pub segment_id: String,
    pub audio_version: String,
    pub script_version: String,
    pub completion_rate: Option<f64>,
    #[schema(value_type = Object)]
    pub metadata: Value,
    #[schema(value_type = String, format = DateTime)]
    pub received_at: UtcDateTime,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionEventsResponse {
    pub session_id: String,
    pub events: Vec<SessionEvent>,
    pub total_events: usize,
}
