use crate::services::{AnalyticsError, AnalyticsEventsService, RequestInfo, MAX_BATCH_SIZE};
use crate::types::{
    EventTypeCount, IncomingEvent, IngestRequest, IngestResponse, ProjectSummaryResponse,
    SessionEvent, SessionEventsResponse,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header::HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, warn};
use voicehero_core::error_builder::{bad_request, internal_server_error, not_found, ErrorBuilder};
use voicehero_core::problemdetails::Problem;
use voicehero_widget::BotFilter;

pub struct AppState {
    pub analytics_service: Arc<AnalyticsEventsService>,
    pub bot_filter: BotFilter,
}

impl AppState {
    pub fn new(analytics_service: Arc<AnalyticsEventsService>, bot_filter: BotFilter) -> Self {
        Self {
            analytics_service,
            bot_filter,
        }
    }

    /// Lenient user agent check plus woothee's crawler category
    fn is_bot_request(&self, user_agent: Option<&str>) -> bool {
        let Some(user_agent) = user_agent else {
            return true;
        };
        if self.bot_filter.is_bot_user_agent(user_agent) {
            return true;
        }
        woothee::parser::Parser::new()
            .parse(user_agent)
            .map(|ua| ua.category == "crawler")
            .unwrap_or(false)
    }
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|ip| ip.trim().to_string())
        })
}

fn analytics_problem(err: AnalyticsError) -> Problem {
    match err {
        AnalyticsError::Validation {
            index,
            field,
            message,
        } => bad_request()
            .title("Invalid analytics event")
            .detail(message)
            .value("field", field)
            .value("index", index)
            .build(),
        AnalyticsError::BatchTooLarge(len) => bad_request()
            .title("Batch too large")
            .detail(format!(
                "{} events received, at most {} are accepted per request",
                len, MAX_BATCH_SIZE
            ))
            .value("field", "events")
            .build(),
        AnalyticsError::EmptyBatch => bad_request()
            .title("Empty batch")
            .detail("At least one event is required")
            .value("field", "events")
            .build(),
        AnalyticsError::Database(e) => {
            error!("Failed to store analytics events: {}", e);
            internal_server_error()
                .title("Failed to store analytics events")
                .build()
        }
    }
}

/// Ingest one event or a batch from the widget
#[utoipa::path(
    post,
    path = "/analytics",
    request_body = IngestRequest,
    responses(
        (status = 200, description = "Events stored", body = IngestResponse),
        (status = 202, description = "Bot traffic acknowledged but not stored", body = IngestResponse),
        (status = 400, description = "Malformed body or invalid event"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Analytics"
)]
pub async fn ingest_events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<impl IntoResponse, Problem> {
    let Json(payload) = payload.map_err(|rejection| {
        debug!("Rejected analytics body: {}", rejection.body_text());
        bad_request()
            .title("Malformed analytics payload")
            .detail(rejection.body_text())
            .build()
    })?;

    let user_agent = headers
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());

    if state.is_bot_request(user_agent.as_deref()) {
        debug!("Dropping analytics from bot user agent {:?}", user_agent);
        return Ok((
            StatusCode::ACCEPTED,
            Json(IngestResponse {
                success: true,
                stored: 0,
            }),
        ));
    }

    let events = AnalyticsEventsService::validate_batch(payload.into_events(), chrono::Utc::now())
        .map_err(|e| {
            warn!("Rejected analytics request: {}", e);
            analytics_problem(e)
        })?;

    let request = RequestInfo {
        ip_address: client_ip(&headers),
        user_agent,
    };
    let stored = state
        .analytics_service
        .record_events(events, &request)
        .await
        .map_err(analytics_problem)?;

    Ok((
        StatusCode::OK,
        Json(IngestResponse {
            success: true,
            stored,
        }),
    ))
}

/// Event type breakdown for a project
#[utoipa::path(
    get,
    path = "/analytics/projects/{project_id}/summary",
    params(
        ("project_id" = String, Path, description = "Project ID")
    ),
    responses(
        (status = 200, description = "Successfully retrieved project summary", body = ProjectSummaryResponse),
        (status = 500, description = "Internal server error")
    ),
    tag = "Analytics"
)]
pub async fn get_project_summary(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectSummaryResponse>, Problem> {
    let summary = state
        .analytics_service
        .project_summary(&project_id)
        .await
        .map_err(|e| {
            error!("Failed to get project summary: {}", e);
            ErrorBuilder::new(StatusCode::INTERNAL_SERVER_ERROR)
                .title("Failed to get project summary")
                .detail(format!("Error: {}", e))
                .build()
        })?;

    Ok(Json(summary))
}

/// Get events for a specific session
#[utoipa::path(
    get,
    path = "/analytics/sessions/{session_id}/events",
    params(
        ("session_id" = String, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Successfully retrieved session events", body = SessionEventsResponse),
        (status = 404, description = "Session not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Analytics"
)]
pub async fn get_session_events(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionEventsResponse>, Problem> {
    let events_response = state
        .analytics_service
        .session_events(&session_id)
        .await
        .map_err(|e| {
            error!("Failed to get session events: {}", e);
            ErrorBuilder::new(StatusCode::INTERNAL_SERVER_ERROR)
                .title("Failed to get session events")
                .detail(format!("Error: {}", e))
                .build()
        })?;

    match events_response {
        Some(events) => Ok(Json(events)),
        None => Err(not_found()
            .title("Session not found")
            .detail(format!("No events found for session: {}", session_id))
            .build()),
    }
}

pub fn configure_routes() -> Router<Arc<AppState>> {
    // The widget posts from whatever site embeds it
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/analytics", post(ingest_events))
        .route("/analytics/projects/{project_id}/summary", get(get_project_summary))
        .route("/analytics/sessions/{session_id}/events", get(get_session_events))
        .layer(cors)
}

#[derive(utoipa::OpenApi)]
#[openapi(
    paths(ingest_events, get_project_summary, get_session_events),
    components(
        schemas(
            IncomingEvent,
            IngestRequest,
            IngestResponse,
            EventTypeCount,
            ProjectSummaryResponse,
            SessionEvent,
            SessionEventsResponse,
            voicehero_core::ProblemDetails,
        )
    ),
    tags(
        (name = "Analytics", description = "Widget analytics ingest and reporting")
    )
)]
pub struct AnalyticsApiDoc;
