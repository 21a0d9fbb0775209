use chrono::Duration;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use voicehero_core::{millis_to_datetime, AnalyticsEvent, EventType, UtcDateTime};
use voicehero_entities::analytics_events;

use crate::types::{
    EventTypeCount, IncomingEvent, ProjectSummaryResponse, SessionEvent, SessionEventsResponse,
};

/// Largest batch accepted in one request, matching the widget's queue cap
pub const MAX_BATCH_SIZE: usize = 100;

/// 2024-01-01T00:00:00Z, the earliest timestamp accepted
pub const MIN_EVENT_TIMESTAMP_MS: i64 = 1_704_067_200_000;

/// How far into the future a client clock may be
pub const MAX_FUTURE_SKEW_DAYS: i64 = 365;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("Invalid {field} (event {index}): {message}")]
    Validation {
        index: usize,
        field: &'static str,
        message: String,
    },
    #[error("Batch too large: {0} events (max {max})", max = MAX_BATCH_SIZE)]
    BatchTooLarge(usize),
    #[error("Empty batch")]
    EmptyBatch,
}

impl AnalyticsError {
    fn missing(index: usize, field: &'static str) -> Self {
        Self::Validation {
            index,
            field,
            message: format!("{} is required", field),
        }
    }
}

/// Request facts recorded next to each stored event
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

pub struct AnalyticsEventsService {
    db: Arc<DatabaseConnection>,
}

impl AnalyticsEventsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Validate a whole request. The first invalid event rejects all of them.
    pub fn validate_batch(
        events: Vec<IncomingEvent>,
        now: UtcDateTime,
    ) -> Result<Vec<AnalyticsEvent>, AnalyticsError> {
        if events.is_empty() {
            return Err(AnalyticsError::EmptyBatch);
        }
        if events.len() > MAX_BATCH_SIZE {
            return Err(AnalyticsError::BatchTooLarge(events.len()));
        }

        events
            .into_iter()
            .enumerate()
            .map(|(index, event)| Self::validate_event(index, event, now))
            .collect()
    }

    pub fn validate_event(
        index: usize,
        event: IncomingEvent,
        now: UtcDateTime,
    ) -> Result<AnalyticsEvent, AnalyticsError> {
        let required = |value: Option<String>, field: &'static str| {
            value
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AnalyticsError::missing(index, field))
        };

        let session_id = required(event.session_id, "sessionId")?;
        let event_type = required(event.event_type, "eventType")?;
        let event_type: EventType =
            event_type
                .parse()
                .map_err(|e: voicehero_core::UnknownEventType| AnalyticsError::Validation {
                    index,
                    field: "eventType",
                    message: e.to_string(),
                })?;

        let timestamp = event
            .timestamp
            .ok_or_else(|| AnalyticsError::missing(index, "timestamp"))?;
        let max_timestamp = (now + Duration::days(MAX_FUTURE_SKEW_DAYS)).timestamp_millis();
        if !(MIN_EVENT_TIMESTAMP_MS..=max_timestamp).contains(&timestamp) {
            return Err(AnalyticsError::Validation {
                index,
                field: "timestamp",
                message: format!("{} is outside the accepted range", timestamp),
            });
        }

        Ok(AnalyticsEvent {
            session_id,
            event_type,
            timestamp,
            project_id: required(event.project_id, "projectId")?,
            segment_type: required(event.segment_type, "segmentType")?,
            segment_id: required(event.segment_id, "segmentId")?,
            audio_version: required(event.audio_version, "audioVersion")?,
            script_version: required(event.script_version, "scriptVersion")?,
            audio_url: event.audio_url.filter(|url| !url.is_empty()),
            metadata: event.metadata.unwrap_or_default(),
            user_context: event.user_context.unwrap_or_default(),
        })
    }

    /// Persist validated events, returning how many rows were written
    pub async fn record_events(
        &self,
        events: Vec<AnalyticsEvent>,
        request: &RequestInfo,
    ) -> Result<usize, AnalyticsError> {
        if events.is_empty() {
            return Ok(0);
        }

        let received_at = chrono::Utc::now();
        let count = events.len();
        let models: Vec<analytics_events::ActiveModel> = events
            .into_iter()
            .filter_map(|event| {
                // Range was checked during validation
                let event_timestamp = millis_to_datetime(event.timestamp)?;
                let completion_rate = event.metadata.get("completionRate").and_then(Value::as_f64);
                Some(analytics_events::ActiveModel {
                    session_id: Set(event.session_id),
                    event_type: Set(event.event_type.as_str().to_string()),
                    event_timestamp: Set(event_timestamp),
                    project_id: Set(event.project_id),
                    segment_type: Set(event.segment_type),
                    segment_id: Set(event.segment_id),
                    audio_version: Set(event.audio_version),
                    script_version: Set(event.script_version),
                    audio_url: Set(event.audio_url),
                    completion_rate: Set(completion_rate),
                    metadata: Set(Value::Object(event.metadata)),
                    user_context: Set(Value::Object(event.user_context)),
                    ip_address: Set(request.ip_address.clone()),
                    server_user_agent: Set(request.user_agent.clone()),
                    received_at: Set(received_at),
                    ..Default::default()
                })
            })
            .collect();

        let stored = models.len();
        if stored < count {
            debug!("Skipped {} events with unrepresentable timestamps", count - stored);
        }
        if stored == 0 {
            return Ok(0);
        }

        analytics_events::Entity::insert_many(models)
            .exec(self.db.as_ref())
            .await?;

        info!("Stored {} analytics events", stored);
        Ok(stored)
    }

    /// Event type breakdown for a project
    pub async fn project_summary(
        &self,
        project_id: &str,
    ) -> Result<ProjectSummaryResponse, AnalyticsError> {
        #[derive(FromQueryResult)]
        struct TypeCountRow {
            event_type: String,
            count: i64,
        }

        let rows = analytics_events::Entity::find()
            .select_only()
            .column(analytics_events::Column::EventType)
            .column_as(Expr::col(analytics_events::Column::Id).count(), "count")
            .filter(analytics_events::Column::ProjectId.eq(project_id))
            .group_by(analytics_events::Column::EventType)
            .into_model::<TypeCountRow>()
            .all(self.db.as_ref())
            .await?;

        let total_events: i64 = rows.iter().map(|row| row.count).sum();
        let mut event_types: Vec<EventTypeCount> = rows
            .into_iter()
            .map(|row| EventTypeCount {
                percentage: if total_events > 0 {
                    row.count as f64 / total_events as f64 * 100.0
                } else {
                    0.0
                },
                event_type: row.event_type,
                count: row.count,
            })
            .collect();
        event_types.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.event_type.cmp(&b.event_type))
        });

        let unique_sessions = analytics_events::Entity::find()
            .filter(analytics_events::Column::ProjectId.eq(project_id))
            .select_only()
            .column(analytics_events::Column::SessionId)
            .distinct()
            .count(self.db.as_ref())
            .await?;

        let rates: Vec<f64> = analytics_events::Entity::find()
            .filter(analytics_events::Column::ProjectId.eq(project_id))
            .filter(analytics_events::Column::EventType.eq(EventType::AudioAbandoned.as_str()))
            .select_only()
            .column(analytics_events::Column::CompletionRate)
            .into_tuple::<Option<f64>>()
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .flatten()
            .collect();

        let average_abandonment_completion = if rates.is_empty() {
            None
        } else {
            let mean = rates.iter().sum::<f64>() / rates.len() as f64;
            Some((mean * 100.0).round() / 100.0)
        };

        Ok(ProjectSummaryResponse {
            project_id: project_id.to_string(),
            total_events,
            unique_sessions,
            event_types,
            average_abandonment_completion,
        })
    }

    /// Events of one session in client timestamp order, `None` when the session is unknown
    pub async fn session_events(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionEventsResponse>, AnalyticsError> {
        let rows = analytics_events::Entity::find()
            .filter(analytics_events::Column::SessionId.eq(session_id))
            .order_by_asc(analytics_events::Column::EventTimestamp)
            .order_by_asc(analytics_events::Column::Id)
            .all(self.db.as_ref())
            .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let events: Vec<SessionEvent> = rows
            .into_iter()
            .map(|row| SessionEvent {
                id: row.id,
                event_type: row.event_type,
                timestamp: row.event_timestamp.timestamp_millis(),
                segment_type: row.segment_type,
                segment_id: row.segment_id,
                audio_version: row.audio_version,
                script_version: row.script_version,
                completion_rate: row.completion_rate,
                metadata: row.metadata,
                received_at: row.received_at,
            })
            .collect();

        Ok(Some(SessionEventsResponse {
            session_id: session_id.to_string(),
            total_events: events.len(),
            events,
        }))
    }
}
